use std::ops::Range;

use markup::{Document, NodeId};
use serde_json::Value;

use crate::error::{DiagnosticError, InitError};
use crate::instance::{BlockInstance, Fields};
use crate::locator::{effective_token, locate};
use crate::marker::{
    INIT_ARGS_CLASS, INITIALIZED_CLASS, INITIALIZED_EVENT, MarkerConfig, init_args_element,
};
use crate::registry::{InitArgs, Initializer, Registry};

/// Initialize one block and every nested block of the same rendering pass.
///
/// Returns the block's instance together with the non-fatal warnings raised
/// along the way.
pub fn initialize(
    document: &mut Document,
    marker: NodeId,
    token: Option<&str>,
    registry: &Registry,
) -> Result<(BlockInstance, Vec<DiagnosticError>), DiagnosticError> {
    let mut diagnostics = Vec::new();
    let instance = initialize_block(document, marker, token, registry, &mut diagnostics)?;
    Ok((instance, diagnostics))
}

/// Initialize every block directly nested in `container` that belongs to the
/// rendering pass identified by `token` (or by `container`'s own token).
pub fn initialize_all(
    document: &mut Document,
    container: NodeId,
    token: Option<&str>,
    registry: &Registry,
) -> Result<(Vec<BlockInstance>, Vec<DiagnosticError>), DiagnosticError> {
    let mut diagnostics = Vec::new();
    let instances = initialize_blocks(document, container, token, registry, &mut diagnostics)?;
    Ok((instances, diagnostics))
}

/// Initialize a block after all of its nested blocks.
pub fn initialize_block(
    document: &mut Document,
    marker: NodeId,
    token: Option<&str>,
    registry: &Registry,
    diagnostics: &mut Vec<DiagnosticError>,
) -> Result<BlockInstance, DiagnosticError> {
    let token = effective_token(document, marker, token);
    let children = initialize_blocks(document, marker, token.as_deref(), registry, diagnostics)?;

    let config = MarkerConfig::read(document, marker);
    let span = document.span(marker);
    let source_id = document.source_id;

    let (fields, runtime) = match config.binding() {
        Some(binding) => {
            let runtime = registry
                .construct_runtime(binding.runtime_class, binding.runtime_version)
                .map_err(|e| DiagnosticError::at(e, span.clone(), source_id))?;
            let initializer = registry
                .initializer(binding.init_fn)
                .map_err(|e| DiagnosticError::at(e, span.clone(), source_id))?;

            let args = InitArgs {
                runtime: &runtime,
                document,
                element: marker,
                children: &children,
            };
            log::debug!("initializing {} with {}", marker, binding.init_fn);
            let returned = match initializer {
                Initializer::WithData(init) => {
                    let data = read_init_args(document, marker, &span, diagnostics)?;
                    init(args, data)
                }
                Initializer::Plain(init) => init(args),
            }
            .map_err(|source| {
                DiagnosticError::at(
                    InitError::InitializerFailed {
                        name: binding.init_fn.to_string(),
                        source,
                    },
                    span.clone(),
                    source_id,
                )
            })?;

            (returned.unwrap_or_default(), Some(runtime))
        }
        None => {
            let message = format!(
                "Block {} is missing data-runtime-class, data-runtime-version or data-init, and can't be initialized",
                document.outer_markup(marker)
            );
            log::warn!("{}", message);
            diagnostics.push(DiagnosticError::warning(message, span, source_id));
            (Fields::new(), None)
        }
    };

    let instance = BlockInstance {
        fields,
        runtime,
        element: marker,
        name: config.name,
        block_type: config.block_type,
        children,
    };

    document.trigger(marker, INITIALIZED_EVENT);
    document.set_initialized(marker);
    document.add_class(marker, INITIALIZED_CLASS);

    Ok(instance)
}

/// Initialize the blocks located under `container`, in document order.
pub fn initialize_blocks(
    document: &mut Document,
    container: NodeId,
    token: Option<&str>,
    registry: &Registry,
    diagnostics: &mut Vec<DiagnosticError>,
) -> Result<Vec<BlockInstance>, DiagnosticError> {
    let token = effective_token(document, container, token);
    locate(document, container, token.as_deref())
        .into_iter()
        .map(|marker| initialize_block(document, marker, token.as_deref(), registry, diagnostics))
        .collect()
}

/// Parse the block's JSON init args. A block without an init-args element
/// gets an empty object and a warning.
fn read_init_args(
    document: &Document,
    marker: NodeId,
    marker_span: &Range<usize>,
    diagnostics: &mut Vec<DiagnosticError>,
) -> Result<Value, DiagnosticError> {
    let Some(args) = init_args_element(document, marker) else {
        log::warn!("Warning: block {} expects data parameters", marker);
        diagnostics.push(DiagnosticError::warning(
            format!("block expects data parameters but has no `{}` element", INIT_ARGS_CLASS),
            marker_span.clone(),
            document.source_id,
        ));
        return Ok(Value::Object(Fields::new()));
    };

    serde_json::from_str(&document.text_content(args)).map_err(|source| {
        DiagnosticError::at(
            InitError::MalformedPayload { source },
            document.span(args),
            document.source_id,
        )
    })
}
