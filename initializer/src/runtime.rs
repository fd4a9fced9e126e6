use std::any::Any;
use std::fmt;

/// Host-side object handed to an initializer so the block can talk back to the page.
///
/// Implementations are registered per (class name, version) in a
/// [`Registry`](crate::Registry) and constructed once per initialized block.
pub trait Runtime: fmt::Debug {
    fn class_name(&self) -> &str;

    fn version(&self) -> &str;

    /// Access to the concrete runtime type.
    fn as_any(&self) -> &dyn Any;
}

/// A runtime that carries nothing beyond its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicRuntime {
    pub class_name: String,
    pub version: String,
}

impl BasicRuntime {
    pub fn new(class_name: impl Into<String>, version: impl Into<String>) -> Self {
        BasicRuntime {
            class_name: class_name.into(),
            version: version.into(),
        }
    }
}

impl Runtime for BasicRuntime {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Display for dyn Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.v{}", self.class_name(), self.version())
    }
}
