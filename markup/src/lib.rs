pub mod document;
pub mod parser;

pub use document::{Attribute, Document, Element, Event, Node, NodeId, NodeKind};
pub use parser::{ParseError, Parser};
