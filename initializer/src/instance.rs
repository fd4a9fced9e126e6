use std::fmt;
use std::rc::Rc;

use markup::NodeId;
use serde_json::{Map, Value};

use crate::runtime::Runtime;

/// Fields an initializer returns for its block.
pub type Fields = Map<String, Value>;

/// A live, initialized block.
#[derive(Clone)]
pub struct BlockInstance {
    /// What the initializer returned, or an empty map.
    pub fields: Fields,
    /// Unset when the marker lacked its runtime/version/init attributes.
    pub runtime: Option<Rc<dyn Runtime>>,
    /// The marker this instance was created from.
    pub element: NodeId,
    pub name: Option<String>,
    pub block_type: Option<String>,
    /// Instances of the directly nested blocks, in document order.
    pub children: Vec<BlockInstance>,
}

impl BlockInstance {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// This instance and all descendants in the order they were initialized.
    pub fn post_order(&self) -> Vec<&BlockInstance> {
        let mut out = Vec::new();
        self.collect_post_order(&mut out);
        out
    }

    fn collect_post_order<'a>(&'a self, out: &mut Vec<&'a BlockInstance>) {
        for child in &self.children {
            child.collect_post_order(out);
        }
        out.push(self);
    }

    /// A JSON view of the instance tree, for display.
    pub fn to_json(&self) -> Value {
        let mut view = Map::new();
        view.insert("name".into(), self.name.clone().map_or(Value::Null, Value::String));
        view.insert(
            "type".into(),
            self.block_type.clone().map_or(Value::Null, Value::String),
        );
        view.insert(
            "runtime".into(),
            self.runtime
                .as_ref()
                .map_or(Value::Null, |r| Value::String(r.to_string())),
        );
        view.insert("element".into(), Value::from(self.element.index()));
        view.insert("fields".into(), Value::Object(self.fields.clone()));
        view.insert(
            "children".into(),
            Value::Array(self.children.iter().map(BlockInstance::to_json).collect()),
        );
        Value::Object(view)
    }
}

impl fmt::Debug for BlockInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockInstance")
            .field("name", &self.name)
            .field("block_type", &self.block_type)
            .field("element", &self.element)
            .field("runtime", &self.runtime)
            .field("fields", &self.fields)
            .field("children", &self.children)
            .finish()
    }
}

impl fmt::Display for BlockInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.name.as_deref().unwrap_or("<unnamed>"),
            self.block_type.as_deref().unwrap_or("<untyped>")
        )
    }
}
