use std::any::Any;

use thiserror::Error;

pub use crate::codec::CodecError;
pub use crate::registry::RegistryError;
pub use crate::types::ParseError;

pub type Result<T, E = JsonRpcError> = std::result::Result<T, E>;

/// Errors raised by the protocol engine itself, as opposed to the failures of the service methods
/// it invokes.
#[derive(Debug, Error)]
pub enum JsonRpcError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Error serializing {type_name} to JSON")]
    SerResponse {
        source: serde_json::Error,
        type_name: &'static str,
    },
}

/// Best-effort extraction of the message from a panic payload caught with `catch_unwind`.
pub(crate) fn panic_err_to_string(err: Box<dyn Any + Send + 'static>) -> String {
    if let Some(message) = err.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = err.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}
