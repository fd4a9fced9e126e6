use crate::document::{Document, NodeId, NodeKind, is_raw_text_element, is_void_element};

enum Step<'a> {
    Enter(NodeId),
    Close(&'a str),
}

pub(super) fn write_node(document: &Document, id: NodeId, out: &mut String) {
    let mut stack = vec![Step::Enter(id)];
    while let Some(step) = stack.pop() {
        let id = match step {
            Step::Enter(id) => id,
            Step::Close(tag) => {
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
                continue;
            }
        };
        match &document.node(id).kind {
            NodeKind::Root => {}
            NodeKind::Text(text) => {
                let raw = document
                    .parent(id)
                    .and_then(|p| document.element(p))
                    .is_some_and(|e| is_raw_text_element(&e.tag));
                if raw {
                    out.push_str(text);
                } else {
                    out.push_str(&html_escape::encode_text(text));
                }
                continue;
            }
            NodeKind::Element(element) => {
                out.push('<');
                out.push_str(&element.tag);
                for attribute in &element.attributes {
                    out.push(' ');
                    out.push_str(&attribute.name);
                    if let Some(value) = &attribute.value {
                        out.push_str("=\"");
                        out.push_str(&html_escape::encode_double_quoted_attribute(value));
                        out.push('"');
                    }
                }
                out.push('>');

                if is_void_element(&element.tag) {
                    continue;
                }
                stack.push(Step::Close(&element.tag));
            }
        }
        stack.extend(document.children(id).iter().rev().map(|&child| Step::Enter(child)));
    }
}
