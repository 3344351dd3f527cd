//! Batched call bridge runtime.
//!
//! The scripting side calls remote (host) modules through [`MethodHandle`]s.
//! Calls are buffered in a [`CallQueue`] and handed to the host either when it
//! asks ([`Bridge::flushed_queue`] and the dispatcher entry points) or pushed
//! through an [`ImmediateFlush`] sink once the flush interval has passed.
//! Replies come back by callback id and are matched to their continuations
//! exactly once.
//!
//! ```no_run
//! use bridge_runtime::{Arg, Bridge, ModuleConfig};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let remote = ModuleConfig::from_value(&json!([["Alerts", ["show"]]]))?;
//! let bridge = Bridge::builder(remote).build()?;
//!
//! let show = bridge.handle("Alerts", "show").expect("declared above");
//! show.invoke(&bridge, vec![json!("hi").into(), Arg::callback(|reply| println!("{reply:?}"))])?;
//!
//! let batch = bridge.flushed_queue();
//! # let _ = batch;
//! # Ok(())
//! # }
//! ```

mod bridge;
pub mod callbacks;
pub mod clock;
pub mod collab;
pub mod config;
pub mod debug_ring;
mod dispatch;
mod error;
pub mod flush;
pub mod proxy;
pub mod registry;

pub use bridge::{Bridge, BridgeBuilder, SPY_TARGET};
pub use bridge_wire::{
    CallQueue, ConfigError, MethodId, MethodType, ModuleConfig, ModuleId, ModuleSpec, Target,
    Value, WireError,
};
pub use callbacks::{Callback, CallbackId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collab::{
    FatalErrorReporter, ImmediateFlush, ImmediateQueue, ImmediateRunner, LocalModule,
    LocalModuleMap, LogReporter, ModuleLoader, NoImmediates, NoopProfiler, Profiler,
};
pub use config::{BatchedBridgeConfig, BridgeConfig};
pub use error::{BridgeError, BridgeResult, CallSite};
pub use proxy::{Arg, Deferred, MethodHandle, MethodKind, RemoteError};
pub use registry::{LookupTables, ModuleDescriptor, Registry, RemoteModule};
