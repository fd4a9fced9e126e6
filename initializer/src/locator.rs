use markup::{Document, NodeId};

use crate::marker::{is_block, request_token};

/// Explicit non-empty token, else the container's own token, else none (match-all).
pub fn effective_token(document: &Document, container: NodeId, token: Option<&str>) -> Option<String> {
    token
        .filter(|t| !t.is_empty())
        .or_else(|| request_token(document, container))
        .map(str::to_string)
}

/// Find the block markers directly nested in `container` that belong to the
/// rendering pass identified by `token`.
///
/// Non-block elements are transparent, and so are blocks of another pass.
/// The subtree of a matching block is never searched. Results are in
/// document order.
pub fn locate(document: &Document, container: NodeId, token: Option<&str>) -> Vec<NodeId> {
    let token = effective_token(document, container, token);
    let mut found = Vec::new();
    let mut stack: Vec<NodeId> = document.children(container).iter().rev().copied().collect();
    while let Some(node) = stack.pop() {
        if document.element(node).is_none() {
            continue;
        }
        if is_block(document, node) && belongs_to_pass(document, node, token.as_deref()) {
            found.push(node);
        } else {
            stack.extend(document.children(node).iter().rev().copied());
        }
    }
    found
}

fn belongs_to_pass(document: &Document, marker: NodeId, token: Option<&str>) -> bool {
    match token {
        Some(token) => request_token(document, marker) == Some(token),
        None => true,
    }
}
