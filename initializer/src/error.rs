use std::ops::Range;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("unknown runtime: {class} v{version}")]
    UnknownRuntime { class: String, version: String },

    #[error("unknown initializer: {0}")]
    UnknownInitializer(String),

    #[error("malformed init args: {source}")]
    MalformedPayload {
        #[source]
        source: serde_json::Error,
    },

    #[error("initializer {name} failed: {source}")]
    InitializerFailed {
        name: String,
        #[source]
        source: Box<dyn std::error::Error>,
    },

    #[error("{0}")]
    Custom(String),
}

/// An initialization error or warning enriched with source location information.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct DiagnosticError {
    pub error: InitError,
    pub span: Option<Range<usize>>,
    pub source_id: usize,
    pub is_warning: bool,
}

impl DiagnosticError {
    /// Create a warning diagnostic with a source span.
    pub fn warning(message: String, span: Range<usize>, source_id: usize) -> Self {
        DiagnosticError {
            error: InitError::Custom(message),
            span: Some(span),
            source_id,
            is_warning: true,
        }
    }

    /// Attach a source span to a fatal error.
    pub fn at(error: InitError, span: Range<usize>, source_id: usize) -> Self {
        DiagnosticError {
            error,
            span: Some(span),
            source_id,
            is_warning: false,
        }
    }
}

impl From<InitError> for DiagnosticError {
    fn from(error: InitError) -> Self {
        DiagnosticError {
            error,
            span: None,
            source_id: 0,
            is_warning: false,
        }
    }
}
