use std::fmt;

use bridge_wire::{ConfigError, WireError};
use thiserror::Error;

use crate::callbacks::CallbackId;
use crate::proxy::MethodKind;

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid module config: {0}")]
    Config(#[from] ConfigError),

    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    #[error("invalid bridge configuration: {0}")]
    InvalidConfig(&'static str),

    /// A failure continuation was supplied without a success continuation, or
    /// a plain argument follows a continuation.
    #[error("cannot have a non-callback argument after a callback argument")]
    InvalidCallbackArity,

    /// A handle was called with the convention its method was not declared with.
    #[error("{declared:?}-style method called as {called:?}")]
    CallStyle {
        declared: MethodKind,
        called: MethodKind,
    },

    /// The host replied to an id that was never issued or was already consumed.
    #[error("callback with id {id}: {origin} not found")]
    UnknownCallback { id: CallbackId, origin: CallSite },

    /// Dispatched code failed or panicked. Reported, never propagated.
    #[error("dispatch fault in {context}: {message}")]
    DispatchFault { context: String, message: String },
}

/// Best-effort description of the call that issued a callback id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallSite {
    pub module: Option<String>,
    pub method: Option<String>,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.module, &self.method) {
            (None, None) => f.write_str("<unknown call>"),
            (module, method) => write!(
                f,
                "{}.{}()",
                module.as_deref().unwrap_or("?"),
                method.as_deref().unwrap_or("?")
            ),
        }
    }
}
