use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use initializer::marker::{BLOCK_CLASS, MarkerConfig, NAME_ATTR, init_args_element};
use initializer::registry::InitResult;
use initializer::{Fields, InitArgs, Initializer, Registry};
use markup::Document;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read registry file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse registry file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

/// Declarative registry: which runtimes exist and how each named initializer behaves.
///
/// ```toml
/// [[runtime]]
/// class = "BlockRuntime"
/// versions = ["1"]
///
/// [[initializer]]
/// name = "ProblemBlock"
/// data = true
/// fields = { kind = "problem" }
/// ```
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    #[serde(default)]
    pub runtime: Vec<RuntimeEntry>,

    #[serde(default)]
    pub initializer: Vec<InitializerEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeEntry {
    pub class: String,

    #[serde(default = "default_versions")]
    pub versions: Vec<String>,
}

fn default_versions() -> Vec<String> {
    vec!["1".to_string()]
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitializerEntry {
    pub name: String,

    /// Takes the block's JSON init args as a third argument.
    #[serde(default)]
    pub data: bool,

    /// Static fields placed on every instance this initializer returns.
    #[serde(default)]
    pub fields: Fields,

    /// Return nothing instead of a field map.
    #[serde(default)]
    pub returns_nothing: bool,

    /// Fail with this message instead of returning.
    #[serde(default)]
    pub fail: Option<String>,
}

impl RegistryConfig {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_path = config_path.as_ref();
        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
            config_path: config_path.to_path_buf(),
            source,
        })
    }

    pub fn build(&self) -> Registry {
        let mut registry = Registry::new();
        for runtime in &self.runtime {
            for version in &runtime.versions {
                registry.register_basic_runtime(runtime.class.clone(), version.clone());
            }
        }
        for entry in &self.initializer {
            registry.register_initializer(entry.name.clone(), scripted(entry.clone()));
        }
        log::debug!(
            "registry: runtimes [{}], initializers [{}]",
            registry.runtime_names().join(", "),
            registry.initializer_names().join(", ")
        );
        registry
    }
}

/// A registry that accepts every runtime and initializer named in `document`.
/// Initializers take data when their block carries an init-args element.
pub fn stub_registry(document: &Document) -> Registry {
    let mut registry = Registry::new();
    for marker in document.elements_with_class(BLOCK_CLASS) {
        let config = MarkerConfig::read(document, marker);
        let Some(binding) = config.binding() else {
            continue;
        };
        if !registry.has_runtime(binding.runtime_class, binding.runtime_version) {
            registry.register_basic_runtime(binding.runtime_class, binding.runtime_version);
        }
        if registry.initializer(binding.init_fn).is_err() {
            let entry = InitializerEntry {
                name: binding.init_fn.to_string(),
                data: init_args_element(document, marker).is_some(),
                ..InitializerEntry::default()
            };
            registry.register_initializer(binding.init_fn, scripted(entry));
        }
    }
    registry
}

/// Build an initializer that returns the entry's fields plus the names of
/// the block's children (and its init args, when it takes data).
fn scripted(entry: InitializerEntry) -> Initializer {
    let takes_data = entry.data;
    let respond = move |children: Vec<Value>, data: Option<Value>| -> InitResult {
        if let Some(message) = &entry.fail {
            return Err(message.clone().into());
        }
        if entry.returns_nothing {
            return Ok(None);
        }
        let mut fields = entry.fields.clone();
        fields.insert("children".into(), Value::Array(children));
        if let Some(data) = data {
            fields.insert("data".into(), data);
        }
        Ok(Some(fields))
    };

    if takes_data {
        Initializer::with_data(move |args, data| respond(child_names(&args), Some(data)))
    } else {
        Initializer::plain(move |args| respond(child_names(&args), None))
    }
}

fn child_names(args: &InitArgs<'_>) -> Vec<Value> {
    args.children
        .iter()
        .map(|child| {
            args.document
                .attr(child.element, NAME_ATTR)
                .map_or(Value::Null, |n| Value::String(n.to_string()))
        })
        .collect()
}
