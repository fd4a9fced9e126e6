use std::cell::RefCell;
use std::rc::Rc;

use initializer::{
    BlockInstance, Fields, InitError, Initializer, Registry, initialize, initialize_all,
};
use markup::{Document, NodeId, Parser};
use serde_json::{Value, json};

fn parse(source: &str) -> Document {
    Parser::new(source.to_string(), 0)
        .parse()
        .expect("parse failed")
}

fn marker(document: &Document, name: &str) -> NodeId {
    document
        .elements_with_class("xblock")
        .into_iter()
        .find(|&m| document.attr(m, "data-name") == Some(name))
        .expect("no such block")
}

fn names(instances: &[BlockInstance]) -> Vec<&str> {
    instances
        .iter()
        .map(|i| i.name.as_deref().unwrap_or(""))
        .collect()
}

type Trace = Rc<RefCell<Vec<String>>>;

/// A registry with runtime `R` v1, and plain initializers `initA`, `initB`,
/// `initC` that append the block name to `trace` when called.
fn tracing_registry(trace: &Trace) -> Registry {
    let mut registry = Registry::new();
    registry.register_basic_runtime("R", "1");
    for name in ["initA", "initB", "initC"] {
        let trace = trace.clone();
        registry.register_initializer(
            name,
            Initializer::plain(move |args| {
                let block = args.document.attr(args.element, "data-name").unwrap_or("");
                trace.borrow_mut().push(block.to_string());
                Ok(None)
            }),
        );
    }
    registry
}

const EXAMPLE: &str = r#"
<div id="c">
  <div class="xblock" data-request-token="tok1" data-runtime-class="R" data-runtime-version="1"
       data-init="initA" data-name="A" data-block-type="vertical">
    <div class="xblock" data-request-token="tok1" data-runtime-class="R" data-runtime-version="1"
         data-init="initB" data-name="B" data-block-type="html"></div>
  </div>
</div>"#;

#[test]
fn nested_example_initializes_children_first() {
    let mut doc = parse(EXAMPLE);
    let trace: Trace = Rc::default();
    let registry = tracing_registry(&trace);

    let root = doc.root();
    let (instances, warnings) = initialize_all(&mut doc, root, None, &registry).unwrap();

    assert!(warnings.is_empty());
    assert_eq!(names(&instances), vec!["A"]);
    assert_eq!(names(&instances[0].children), vec!["B"]);
    assert_eq!(*trace.borrow(), vec!["B", "A"]);
}

#[test]
fn parent_sees_initialized_children() {
    let mut doc = parse(EXAMPLE);
    let observed = Rc::new(RefCell::new(None));

    let mut registry = Registry::new();
    registry.register_basic_runtime("R", "1");
    registry.register_initializer("initB", Initializer::plain(|_| Ok(None)));
    let seen = observed.clone();
    registry.register_initializer(
        "initA",
        Initializer::plain(move |args| {
            let child = &args.children[0];
            *seen.borrow_mut() = Some((
                child.name.clone(),
                args.document.is_initialized(child.element),
                args.document.has_class(child.element, "xblock-initialized"),
            ));
            Ok(None)
        }),
    );

    let root = doc.root();
    initialize_all(&mut doc, root, None, &registry).unwrap();
    assert_eq!(*observed.borrow(), Some((Some("B".to_string()), true, true)));
}

#[test]
fn child_events_fire_before_parent_initializer_runs() {
    let mut doc = parse(EXAMPLE);
    let events: Trace = Rc::default();

    let log = events.clone();
    let root = doc.root();
    doc.on(root, "xblock-initialized", move |_| log.borrow_mut().push("event".into()));

    let mut registry = Registry::new();
    registry.register_basic_runtime("R", "1");
    registry.register_initializer("initB", Initializer::plain(|_| Ok(None)));
    let log = events.clone();
    registry.register_initializer(
        "initA",
        Initializer::plain(move |_| {
            log.borrow_mut().push("initA".into());
            Ok(None)
        }),
    );

    initialize_all(&mut doc, root, None, &registry).unwrap();
    assert_eq!(*events.borrow(), vec!["event", "initA", "event"]);
}

const SIBLINGS: &str = r#"
<div class="container" data-request-token="T">
  <div class="xblock" data-request-token="T" data-runtime-class="R" data-runtime-version="1"
       data-init="initA" data-name="same-pass"></div>
  <div class="xblock" data-request-token="U" data-runtime-class="R" data-runtime-version="1"
       data-init="initB" data-name="other-pass"></div>
</div>"#;

fn container(document: &Document) -> NodeId {
    document.elements_with_class("container")[0]
}

#[test]
fn token_scopes_initialization() {
    let mut doc = parse(SIBLINGS);
    let trace: Trace = Rc::default();
    let registry = tracing_registry(&trace);

    let c = container(&doc);
    let (instances, _) = initialize_all(&mut doc, c, Some("T"), &registry).unwrap();
    assert_eq!(names(&instances), vec!["same-pass"]);
    assert!(!doc.is_initialized(marker(&doc, "other-pass")));
}

#[test]
fn container_token_is_inherited() {
    let trace: Trace = Rc::default();
    let registry = tracing_registry(&trace);

    let mut implicit = parse(SIBLINGS);
    let c = container(&implicit);
    let (implicit, _) = initialize_all(&mut implicit, c, None, &registry).unwrap();

    let mut explicit = parse(SIBLINGS);
    let c = container(&explicit);
    let (explicit, _) = initialize_all(&mut explicit, c, Some("T"), &registry).unwrap();

    assert_eq!(names(&implicit), names(&explicit));
    assert_eq!(*trace.borrow(), vec!["same-pass", "same-pass"]);
}

#[test]
fn match_all_without_tokens() {
    let mut doc = parse(
        r#"<div>
             <div class="xblock" data-request-token="T" data-runtime-class="R" data-runtime-version="1" data-init="initA" data-name="a"></div>
             <div class="xblock" data-request-token="U" data-runtime-class="R" data-runtime-version="1" data-init="initB" data-name="b"></div>
             <div class="xblock" data-runtime-class="R" data-runtime-version="1" data-init="initC" data-name="c"></div>
           </div>"#,
    );
    let trace: Trace = Rc::default();
    let registry = tracing_registry(&trace);

    let root = doc.root();
    let (instances, _) = initialize_all(&mut doc, root, None, &registry).unwrap();
    assert_eq!(names(&instances), vec!["a", "b", "c"]);
}

#[test]
fn nested_block_of_a_later_pass_is_left_alone() {
    let mut doc = parse(
        r#"<div class="xblock" data-request-token="T" data-runtime-class="R" data-runtime-version="1" data-init="initA" data-name="outer">
             <div class="xblock" data-request-token="later" data-runtime-class="R" data-runtime-version="1" data-init="initB" data-name="inner"></div>
           </div>"#,
    );
    let trace: Trace = Rc::default();
    let registry = tracing_registry(&trace);

    let outer = marker(&doc, "outer");
    let (instance, _) = initialize(&mut doc, outer, None, &registry).unwrap();
    assert!(instance.children.is_empty());
    assert_eq!(*trace.borrow(), vec!["outer"]);
}

#[test]
fn block_inside_a_block_of_another_pass_is_initialized_by_its_own_pass() {
    let mut doc = parse(
        r#"<div class="container" data-request-token="T">
             <div class="xblock" data-request-token="U" data-runtime-class="R" data-runtime-version="1" data-init="initB" data-name="foreign">
               <div class="xblock" data-request-token="T" data-runtime-class="R" data-runtime-version="1" data-init="initA" data-name="mine"></div>
             </div>
           </div>"#,
    );
    let trace: Trace = Rc::default();
    let registry = tracing_registry(&trace);

    let c = container(&doc);
    let (instances, _) = initialize_all(&mut doc, c, None, &registry).unwrap();
    assert_eq!(names(&instances), vec!["mine"]);
    assert!(doc.is_initialized(marker(&doc, "mine")));
    assert!(!doc.is_initialized(marker(&doc, "foreign")));

    let foreign = marker(&doc, "foreign");
    let (instance, _) = initialize(&mut doc, foreign, None, &registry).unwrap();
    assert!(instance.children.is_empty());
    assert_eq!(*trace.borrow(), vec!["mine", "foreign"]);
}

const WITH_ARGS: &str = r#"
<div class="xblock" data-runtime-class="R" data-runtime-version="1" data-init="init" data-name="p" data-block-type="problem">
  <script type="json/xblock-args" class="xblock_json_init_args">{"attempts": 3, "title": "Q1"}</script>
</div>"#;

#[test]
fn data_initializer_receives_parsed_args() {
    let mut doc = parse(WITH_ARGS);
    let received = Rc::new(RefCell::new(None));

    let mut registry = Registry::new();
    registry.register_basic_runtime("R", "1");
    let sink = received.clone();
    registry.register_initializer(
        "init",
        Initializer::with_data(move |_, data| {
            *sink.borrow_mut() = Some(data);
            Ok(None)
        }),
    );

    let p = marker(&doc, "p");
    initialize(&mut doc, p, None, &registry).unwrap();
    assert_eq!(
        *received.borrow(),
        Some(json!({"attempts": 3, "title": "Q1"}))
    );
}

#[test]
fn plain_initializer_ignores_args_element() {
    let mut doc = parse(WITH_ARGS);
    let calls = Rc::new(RefCell::new(0));

    let mut registry = Registry::new();
    registry.register_basic_runtime("R", "1");
    let counter = calls.clone();
    registry.register_initializer(
        "init",
        Initializer::plain(move |_| {
            *counter.borrow_mut() += 1;
            Ok(None)
        }),
    );

    let p = marker(&doc, "p");
    let (_, warnings) = initialize(&mut doc, p, None, &registry).unwrap();
    assert_eq!(*calls.borrow(), 1);
    assert!(warnings.is_empty());
}

#[test]
fn missing_args_element_warns_and_passes_empty_object() {
    let mut doc = parse(
        r#"<div class="xblock" data-runtime-class="R" data-runtime-version="1" data-init="init" data-name="p"></div>"#,
    );
    let received = Rc::new(RefCell::new(None));

    let mut registry = Registry::new();
    registry.register_basic_runtime("R", "1");
    let sink = received.clone();
    registry.register_initializer(
        "init",
        Initializer::with_data(move |_, data| {
            *sink.borrow_mut() = Some(data);
            Ok(None)
        }),
    );

    let p = marker(&doc, "p");
    let (instance, warnings) = initialize(&mut doc, p, None, &registry).unwrap();
    assert_eq!(*received.borrow(), Some(json!({})));
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].is_warning);
    assert!(warnings[0].to_string().contains("expects data parameters"));
    assert!(instance.runtime.is_some());
}

#[test]
fn malformed_args_abort() {
    let mut doc = parse(
        r#"<div class="xblock" data-runtime-class="R" data-runtime-version="1" data-init="init" data-name="p">
             <script class="xblock_json_init_args">{not json</script>
           </div>"#,
    );
    let mut registry = Registry::new();
    registry.register_basic_runtime("R", "1");
    registry.register_initializer("init", Initializer::with_data(|_, _| Ok(None)));

    let p = marker(&doc, "p");
    let err = initialize(&mut doc, p, None, &registry).unwrap_err();
    assert!(matches!(err.error, InitError::MalformedPayload { .. }));
    assert!(!err.is_warning);
    assert!(!doc.is_initialized(p));
}

#[test]
fn missing_init_name_degrades_without_stopping_siblings() {
    let mut doc = parse(
        r#"<div class="xblock" data-runtime-class="R" data-runtime-version="1" data-init="initA" data-name="parent">
             <div class="xblock" data-runtime-class="R" data-runtime-version="1" data-name="broken" data-block-type="html"></div>
             <div class="xblock" data-runtime-class="R" data-runtime-version="1" data-init="initB" data-name="fine"></div>
           </div>"#,
    );
    let trace: Trace = Rc::default();
    let registry = tracing_registry(&trace);

    let root = doc.root();
    let (instances, warnings) = initialize_all(&mut doc, root, None, &registry).unwrap();

    let parent = &instances[0];
    assert!(parent.runtime.is_some());
    let broken = &parent.children[0];
    assert!(broken.runtime.is_none());
    assert!(broken.fields.is_empty());
    assert_eq!(broken.block_type.as_deref(), Some("html"));
    assert!(doc.is_initialized(broken.element));
    assert_eq!(*trace.borrow(), vec!["fine", "parent"]);

    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].span.clone().map(|s| s.start),
        Some(doc.span(broken.element).start)
    );
}

#[test]
fn unknown_runtime_aborts_whole_tree() {
    let mut doc = parse(
        r#"<div class="xblock" data-runtime-class="R" data-runtime-version="1" data-init="initA" data-name="parent">
             <div class="xblock" data-runtime-class="R" data-runtime-version="1" data-init="initB" data-name="first"></div>
             <div class="xblock" data-runtime-class="R" data-runtime-version="2" data-init="initB" data-name="second"></div>
           </div>"#,
    );
    let trace: Trace = Rc::default();
    let registry = tracing_registry(&trace);

    let root = doc.root();
    let err = initialize_all(&mut doc, root, None, &registry).unwrap_err();
    assert_eq!(err.to_string(), "unknown runtime: R v2");
    assert_eq!(err.span, Some(doc.span(marker(&doc, "second"))));

    // No rollback: the first child stays initialized, the parent never runs.
    assert!(doc.is_initialized(marker(&doc, "first")));
    assert!(!doc.is_initialized(marker(&doc, "parent")));
    assert_eq!(*trace.borrow(), vec!["first"]);
}

#[test]
fn unknown_initializer_aborts() {
    let mut doc = parse(
        r#"<div class="xblock" data-runtime-class="R" data-runtime-version="1" data-init="nope" data-name="x"></div>"#,
    );
    let trace: Trace = Rc::default();
    let registry = tracing_registry(&trace);

    let root = doc.root();
    let err = initialize_all(&mut doc, root, None, &registry).unwrap_err();
    assert!(matches!(err.error, InitError::UnknownInitializer(ref name) if name == "nope"));
}

#[test]
fn initializer_failure_aborts() {
    let mut doc = parse(
        r#"<div class="xblock" data-runtime-class="R" data-runtime-version="1" data-init="boom" data-name="x"></div>"#,
    );
    let mut registry = Registry::new();
    registry.register_basic_runtime("R", "1");
    registry.register_initializer(
        "boom",
        Initializer::plain(|_| Err("element has no content".into())),
    );

    let root = doc.root();
    let err = initialize_all(&mut doc, root, None, &registry).unwrap_err();
    assert_eq!(err.to_string(), "initializer boom failed: element has no content");
}

#[test]
fn idempotency_stamp_and_single_event() {
    let mut doc = parse(EXAMPLE);
    let fired: Trace = Rc::default();
    let a = marker(&doc, "A");

    let log = fired.clone();
    doc.on(a, "xblock-initialized", move |e| {
        log.borrow_mut().push(e.target.to_string())
    });

    let trace: Trace = Rc::default();
    let registry = tracing_registry(&trace);
    initialize(&mut doc, a, None, &registry).unwrap();

    assert!(doc.is_initialized(a));
    assert!(doc.has_class(a, "xblock-initialized"));
    assert!(doc.has_class(a, "xblock"));
    // One event for A itself and one bubbled up from B.
    assert_eq!(fired.borrow().len(), 2);
    assert_eq!(fired.borrow()[1], a.to_string());
}

#[test]
fn instance_copies_marker_identity() {
    let mut doc = parse(EXAMPLE);
    let trace: Trace = Rc::default();
    let registry = tracing_registry(&trace);

    let a = marker(&doc, "A");
    let (instance, _) = initialize(&mut doc, a, None, &registry).unwrap();
    assert_eq!(instance.name.as_deref(), Some("A"));
    assert_eq!(instance.block_type.as_deref(), Some("vertical"));
    assert_eq!(instance.element, a);

    let runtime = instance.runtime.as_ref().unwrap();
    assert_eq!((runtime.class_name(), runtime.version()), ("R", "1"));
}

#[test]
fn returned_fields_become_the_instance() {
    let mut doc = parse(EXAMPLE);
    let mut registry = Registry::new();
    registry.register_basic_runtime("R", "1");
    registry.register_initializer(
        "initB",
        Initializer::plain(|_| {
            let mut fields = Fields::new();
            fields.insert("kind".into(), Value::from("leaf"));
            Ok(Some(fields))
        }),
    );
    registry.register_initializer(
        "initA",
        Initializer::plain(|args| {
            let mut fields = Fields::new();
            let kids: Vec<Value> = args
                .children
                .iter()
                .filter_map(|c| c.get("kind").cloned())
                .collect();
            fields.insert("child_kinds".into(), Value::Array(kids));
            Ok(Some(fields))
        }),
    );

    let root = doc.root();
    let (instances, _) = initialize_all(&mut doc, root, None, &registry).unwrap();
    assert_eq!(instances[0].get("child_kinds"), Some(&json!(["leaf"])));
    assert_eq!(instances[0].children[0].get("kind"), Some(&json!("leaf")));

    let order: Vec<_> = instances[0]
        .post_order()
        .into_iter()
        .map(|i| i.name.clone().unwrap_or_default())
        .collect();
    assert_eq!(order, vec!["B", "A"]);
}
