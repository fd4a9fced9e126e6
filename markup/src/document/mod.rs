mod serialize;

use std::fmt;
use std::ops::Range;

/// Elements that never have content or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose content is raw text rather than markup.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

pub(crate) fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

pub(crate) fn is_raw_text_element(tag: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&tag)
}

/// Handle to a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single attribute. Valueless attributes (`<input disabled>`) have `value: None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Lowercased tag name.
    pub tag: String,
    /// Attributes in source order.
    pub attributes: Vec<Attribute>,
    /// Per-element data flag, set once an initializer has processed the element.
    pub initialized: bool,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Element {
            tag: tag.into().to_ascii_lowercase(),
            attributes: Vec::new(),
            initialized: false,
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Attribute value by (case-insensitive) name. Valueless attributes read as `""`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_deref().unwrap_or(""))
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_ascii_lowercase();
        let value = Some(value.into());
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute { name, value }),
        }
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_ascii_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// Append `class` to the class list unless it is already present.
    pub fn add_class(&mut self, class: &str) {
        if self.has_class(class) {
            return;
        }
        let joined = match self.attr("class") {
            Some(existing) if !existing.trim().is_empty() => {
                format!("{} {}", existing.trim_end(), class)
            }
            _ => class.to_string(),
        };
        self.set_attr("class", joined);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// The synthetic document root. Always `NodeId` 0.
    Root,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Byte span in source for error reporting. Empty for built nodes.
    pub span: Range<usize>,
}

/// An event dispatched on an element. `current_target` is the element whose
/// listener is running while the event bubbles towards the root.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub target: NodeId,
    pub current_target: NodeId,
}

struct Listener {
    node: NodeId,
    event: String,
    callback: Box<dyn FnMut(&Event)>,
}

/// An arena-backed document tree.
pub struct Document {
    nodes: Vec<Node>,
    listeners: Vec<Listener>,
    /// The source file ID (for error reporting with codespan-reporting).
    pub source_id: usize,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.nodes)
            .field("listeners", &self.listeners.len())
            .field("source_id", &self.source_id)
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Document {
            nodes: vec![Node {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
                span: 0..0,
            }],
            listeners: Vec::new(),
            source_id: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    pub fn append_element(&mut self, parent: NodeId, element: Element) -> NodeId {
        self.push_node(parent, NodeKind::Element(element), 0..0)
    }

    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        self.push_node(parent, NodeKind::Text(text.into()), 0..0)
    }

    pub(crate) fn push_node(&mut self, parent: NodeId, kind: NodeKind, span: Range<usize>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
            span,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub(crate) fn set_span_end(&mut self, id: NodeId, end: usize) {
        self.nodes[id.0].span.end = end;
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attr(name))
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id).is_some_and(|e| e.has_class(class))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn span(&self, id: NodeId) -> Range<usize> {
        self.nodes[id.0].span.clone()
    }

    /// All nodes below `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    pub fn elements_with_class(&self, class: &str) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|&id| self.has_class(id, class))
            .collect()
    }

    /// Concatenated text of every text node below `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut text = String::new();
        if let NodeKind::Text(s) = &self.nodes[id.0].kind {
            text.push_str(s);
        }
        for node in self.descendants(id) {
            if let NodeKind::Text(s) = &self.nodes[node.0].kind {
                text.push_str(s);
            }
        }
        text
    }

    /// Serialized markup of `id` including its own tag.
    pub fn outer_markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        serialize::write_node(self, id, &mut out);
        out
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if let Some(element) = self.element_mut(id) {
            element.add_class(class);
        }
    }

    pub fn set_initialized(&mut self, id: NodeId) {
        if let Some(element) = self.element_mut(id) {
            element.initialized = true;
        }
    }

    pub fn is_initialized(&self, id: NodeId) -> bool {
        self.element(id).is_some_and(|e| e.initialized)
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Register a listener for `event` dispatched on `node` or any of its descendants.
    pub fn on(&mut self, node: NodeId, event: impl Into<String>, callback: impl FnMut(&Event) + 'static) {
        self.listeners.push(Listener {
            node,
            event: event.into(),
            callback: Box::new(callback),
        });
    }

    /// Dispatch `event` on `target`, bubbling up to the root.
    /// Returns the number of listeners invoked.
    pub fn trigger(&mut self, target: NodeId, event: &str) -> usize {
        let mut path = vec![target];
        let mut current = target;
        while let Some(parent) = self.parent(current) {
            path.push(parent);
            current = parent;
        }

        let mut invoked = 0;
        for current_target in path {
            let dispatched = Event {
                name: event.to_string(),
                target,
                current_target,
            };
            for listener in self
                .listeners
                .iter_mut()
                .filter(|l| l.node == current_target && l.event == event)
            {
                (listener.callback)(&dispatched);
                invoked += 1;
            }
        }
        log::debug!("dispatched {} on {} to {} listener(s)", event, target, invoked);
        invoked
    }
}
