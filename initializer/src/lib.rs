pub mod error;
pub mod initialize;
pub mod instance;
pub mod locator;
pub mod marker;
pub mod registry;
pub mod runtime;

pub use error::{DiagnosticError, InitError};
pub use initialize::{initialize, initialize_all};
pub use instance::{BlockInstance, Fields};
pub use locator::locate;
pub use registry::{InitArgs, Initializer, Registry};
pub use runtime::{BasicRuntime, Runtime};
