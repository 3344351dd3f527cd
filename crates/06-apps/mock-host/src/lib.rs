//! In-process mock of a native host for the batched call bridge.
//!
//! [`MockHost`] advertises its [`NativeModule`]s to a bridge, executes the
//! batches the bridge hands over, and feeds callback replies and timer events
//! back through the dispatcher. Time only moves through [`MockHost::advance`].

mod host;
pub mod native;
pub mod script;

pub use host::{ConfigForm, HostStats, MockHost, MockHostBuilder};
pub use native::{Alerts, NativeModule, Replies, Reply, Settings, Timing, Vibration};
pub use script::{ScriptTimers, TIMERS_MODULE};
