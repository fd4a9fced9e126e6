//! Names and attribute reads for block markers in rendered markup.

use markup::{Document, NodeId};

/// Class carried by every block marker.
pub const BLOCK_CLASS: &str = "xblock";
/// Class added to a marker once it has been initialized.
pub const INITIALIZED_CLASS: &str = "xblock-initialized";
/// Event dispatched on a marker once it has been initialized.
pub const INITIALIZED_EVENT: &str = "xblock-initialized";
/// Class of the element holding a block's JSON init args.
pub const INIT_ARGS_CLASS: &str = "xblock_json_init_args";

pub const REQUEST_TOKEN_ATTR: &str = "data-request-token";
pub const RUNTIME_CLASS_ATTR: &str = "data-runtime-class";
pub const RUNTIME_VERSION_ATTR: &str = "data-runtime-version";
pub const INIT_ATTR: &str = "data-init";
pub const NAME_ATTR: &str = "data-name";
pub const BLOCK_TYPE_ATTR: &str = "data-block-type";

/// Attributes read from a block marker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerConfig {
    pub runtime_class: Option<String>,
    pub runtime_version: Option<String>,
    pub init_fn: Option<String>,
    pub name: Option<String>,
    pub block_type: Option<String>,
}

/// The three names needed to bind a block to its runtime and initializer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Binding<'a> {
    pub runtime_class: &'a str,
    pub runtime_version: &'a str,
    pub init_fn: &'a str,
}

impl MarkerConfig {
    pub fn read(document: &Document, marker: NodeId) -> Self {
        let get = |name: &str| document.attr(marker, name).map(str::to_string);
        MarkerConfig {
            runtime_class: get(RUNTIME_CLASS_ATTR),
            runtime_version: get(RUNTIME_VERSION_ATTR),
            init_fn: get(INIT_ATTR),
            name: get(NAME_ATTR),
            block_type: get(BLOCK_TYPE_ATTR),
        }
    }

    /// `None` when any of runtime class, version or init name is absent.
    pub fn binding(&self) -> Option<Binding<'_>> {
        Some(Binding {
            runtime_class: self.runtime_class.as_deref()?,
            runtime_version: self.runtime_version.as_deref()?,
            init_fn: self.init_fn.as_deref()?,
        })
    }
}

pub fn is_block(document: &Document, node: NodeId) -> bool {
    document.has_class(node, BLOCK_CLASS)
}

/// The marker's own correlation token. Empty values count as absent.
pub fn request_token(document: &Document, node: NodeId) -> Option<&str> {
    document
        .attr(node, REQUEST_TOKEN_ATTR)
        .filter(|token| !token.is_empty())
}

/// First init-args element belonging to `marker`, skipping nested blocks' subtrees.
pub fn init_args_element(document: &Document, marker: NodeId) -> Option<NodeId> {
    let mut stack: Vec<NodeId> = document.children(marker).iter().rev().copied().collect();
    while let Some(node) = stack.pop() {
        if document.element(node).is_none() || is_block(document, node) {
            continue;
        }
        if document.has_class(node, INIT_ARGS_CLASS) {
            return Some(node);
        }
        stack.extend(document.children(node).iter().rev().copied());
    }
    None
}
