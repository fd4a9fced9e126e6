use std::collections::HashMap;
use std::error::Error;
use std::rc::Rc;

use markup::{Document, NodeId};
use serde_json::Value;

use crate::error::InitError;
use crate::instance::{BlockInstance, Fields};
use crate::runtime::{BasicRuntime, Runtime};

/// What an initializer hands back: its fields (or nothing), or a failure.
pub type InitResult = Result<Option<Fields>, Box<dyn Error>>;

type RuntimeConstructor = Box<dyn Fn() -> Rc<dyn Runtime>>;

/// Arguments passed to every initializer.
pub struct InitArgs<'a> {
    pub runtime: &'a Rc<dyn Runtime>,
    pub document: &'a Document,
    pub element: NodeId,
    /// Already-initialized nested blocks, in document order.
    pub children: &'a [BlockInstance],
}

/// A named initialization routine. The variant declares whether the routine
/// takes the block's JSON init args.
pub enum Initializer {
    Plain(Box<dyn Fn(InitArgs<'_>) -> InitResult>),
    WithData(Box<dyn Fn(InitArgs<'_>, Value) -> InitResult>),
}

impl Initializer {
    pub fn plain(f: impl Fn(InitArgs<'_>) -> InitResult + 'static) -> Self {
        Initializer::Plain(Box::new(f))
    }

    pub fn with_data(f: impl Fn(InitArgs<'_>, Value) -> InitResult + 'static) -> Self {
        Initializer::WithData(Box::new(f))
    }

    pub fn expects_data(&self) -> bool {
        matches!(self, Initializer::WithData(_))
    }
}

/// Runtime constructors keyed by (class name, version) and initializers keyed
/// by name. Populated up front; only read during initialization.
#[derive(Default)]
pub struct Registry {
    runtimes: HashMap<(String, String), RuntimeConstructor>,
    initializers: HashMap<String, Initializer>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_runtime(
        &mut self,
        class_name: impl Into<String>,
        version: impl Into<String>,
        constructor: impl Fn() -> Rc<dyn Runtime> + 'static,
    ) -> &mut Self {
        self.runtimes
            .insert((class_name.into(), version.into()), Box::new(constructor));
        self
    }

    /// Register a [`BasicRuntime`] for (class name, version).
    pub fn register_basic_runtime(
        &mut self,
        class_name: impl Into<String>,
        version: impl Into<String>,
    ) -> &mut Self {
        let class_name = class_name.into();
        let version = version.into();
        let runtime = BasicRuntime::new(class_name.clone(), version.clone());
        self.register_runtime(class_name, version, move || -> Rc<dyn Runtime> {
            Rc::new(runtime.clone())
        })
    }

    pub fn register_initializer(
        &mut self,
        name: impl Into<String>,
        initializer: Initializer,
    ) -> &mut Self {
        self.initializers.insert(name.into(), initializer);
        self
    }

    pub fn has_runtime(&self, class_name: &str, version: &str) -> bool {
        self.runtimes
            .contains_key(&(class_name.to_string(), version.to_string()))
    }

    pub fn construct_runtime(
        &self,
        class_name: &str,
        version: &str,
    ) -> Result<Rc<dyn Runtime>, InitError> {
        self.runtimes
            .get(&(class_name.to_string(), version.to_string()))
            .map(|constructor| constructor())
            .ok_or_else(|| InitError::UnknownRuntime {
                class: class_name.to_string(),
                version: version.to_string(),
            })
    }

    pub fn initializer(&self, name: &str) -> Result<&Initializer, InitError> {
        self.initializers
            .get(name)
            .ok_or_else(|| InitError::UnknownInitializer(name.to_string()))
    }

    /// Registered runtimes as `Class.vN`, sorted.
    pub fn runtime_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .runtimes
            .keys()
            .map(|(class, version)| format!("{}.v{}", class, version))
            .collect();
        names.sort();
        names
    }

    /// Registered initializer names, sorted.
    pub fn initializer_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.initializers.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}
