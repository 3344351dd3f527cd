//! Bridge configuration.

use std::time::Duration;

use bridge_wire::ModuleConfig;
use serde::{Deserialize, Serialize};

use crate::debug_ring::MAX_WINDOW_BITS;
use crate::error::{BridgeError, BridgeResult};

/// Minimum time between two push flushes.
pub const MIN_TIME_BETWEEN_FLUSHES_MS: u64 = 5;
/// Default diagnostic window: `1 << 5` recent calls.
pub const DEFAULT_DEBUG_WINDOW_BITS: u32 = 5;

/// Tunables of a bridge instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Minimum interval between push flushes, in milliseconds.
    pub flush_interval_ms: u64,
    /// The diagnostic ring keeps `1 << debug_window_bits` entries.
    pub debug_window_bits: u32,
    /// Log every call crossing the bridge under the `bridge::spy` target.
    pub spy: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: MIN_TIME_BETWEEN_FLUSHES_MS,
            debug_window_bits: DEFAULT_DEBUG_WINDOW_BITS,
            spy: false,
        }
    }
}

impl BridgeConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.debug_window_bits > MAX_WINDOW_BITS {
            return Err(BridgeError::InvalidConfig(
                "debug_window_bits exceeds the supported window",
            ));
        }
        Ok(())
    }
}

/// Configuration object a host injects at startup.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchedBridgeConfig {
    /// Modules the host exposes to the scripting side.
    pub remote_module_config: ModuleConfig,
    /// Modules the scripting side exposes to the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_modules_config: Option<ModuleConfig>,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl BatchedBridgeConfig {
    pub fn from_json_str(json: &str) -> BridgeResult<Self> {
        serde_json::from_str(json).map_err(|err| BridgeError::Wire(err.into()))
    }
}
