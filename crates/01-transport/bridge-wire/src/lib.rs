//! Wire formats exchanged between the scripting side of the bridge and its host.
//!
//! * [`ModuleConfig`] – module/method declarations, decoded from either the
//!   ordered array form or the legacy name-keyed form.
//! * [`CallQueue`] – the batched outgoing calls, three parallel columns.
//! * [`Target`] – numeric-or-named module/method references on incoming calls.

pub mod config;
mod error;
pub mod queue;
mod target;

pub use config::{MethodId, MethodType, ModuleConfig, ModuleId, ModuleSpec, MAX_TABLE_LEN};
pub use error::{ConfigError, WireError, WireResult};
pub use queue::{CallQueue, QueueColumns, QueuedCall};
pub use target::Target;

/// Serializable argument and result values.
pub use serde_json::Value;
