//! Scripting-side timers backed by the host's `Timing` module.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use bridge_runtime::{Bridge, LocalModule, Value};
use parking_lot::Mutex;
use serde_json::json;

/// Local module name the host fires timers into.
pub const TIMERS_MODULE: &str = "JSTimersExecution";

type TimerFn = Box<dyn FnMut() + Send>;

struct Entry {
    callback: TimerFn,
    repeats: bool,
}

/// `setTimeout`/`setInterval` for code running on the scripting side.
#[derive(Default)]
pub struct ScriptTimers {
    next_id: Mutex<u64>,
    entries: Mutex<HashMap<u64, Entry>>,
    /// Timer whose callback is running, and whether that callback cleared it.
    firing: Mutex<Option<(u64, bool)>>,
}

impl ScriptTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_timeout<F>(&self, bridge: &Bridge, delay: Duration, f: F) -> Result<u64>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut f = Some(f);
        self.schedule(bridge, delay, false, move || {
            if let Some(f) = f.take() {
                f();
            }
        })
    }

    pub fn set_interval<F>(&self, bridge: &Bridge, period: Duration, f: F) -> Result<u64>
    where
        F: FnMut() + Send + 'static,
    {
        self.schedule(bridge, period, true, f)
    }

    /// Cancels a timer. Ids that already fired or were never issued are
    /// ignored.
    pub fn clear(&self, bridge: &Bridge, id: u64) -> Result<()> {
        let live = self.entries.lock().remove(&id).is_some() || self.clear_firing(id);
        if !live {
            return Ok(());
        }
        let delete = bridge
            .handle("Timing", "deleteTimer")
            .ok_or_else(|| anyhow!("host does not expose Timing.deleteTimer"))?;
        delete.call(bridge, vec![json!(id)], None, None)?;
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.entries.lock().len()
    }

    fn clear_firing(&self, id: u64) -> bool {
        match &mut *self.firing.lock() {
            Some((firing, cleared)) if *firing == id => {
                *cleared = true;
                true
            }
            _ => false,
        }
    }

    fn schedule<F>(&self, bridge: &Bridge, delay: Duration, repeats: bool, f: F) -> Result<u64>
    where
        F: FnMut() + Send + 'static,
    {
        let create = bridge
            .handle("Timing", "createTimer")
            .ok_or_else(|| anyhow!("host does not expose Timing.createTimer"))?;
        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            *next
        };
        self.entries.lock().insert(
            id,
            Entry {
                callback: Box::new(f),
                repeats,
            },
        );
        create
            .call(
                bridge,
                vec![json!(id), json!(delay.as_millis() as u64), json!(repeats)],
                None,
                None,
            )
            .context("scheduling timer")?;
        Ok(id)
    }

    fn fire(&self, ids: &[u64]) {
        for id in ids {
            // Taken out so the callback can schedule or clear timers.
            let Some(mut entry) = self.entries.lock().remove(id) else {
                log::debug!("timer {id} fired after being cleared");
                continue;
            };
            *self.firing.lock() = Some((*id, false));
            (entry.callback)();
            let cleared = matches!(self.firing.lock().take(), Some((_, true)));
            if entry.repeats && !cleared {
                self.entries.lock().insert(*id, entry);
            }
        }
    }
}

impl LocalModule for ScriptTimers {
    fn invoke(&self, method: &str, args: Vec<Value>) -> Result<()> {
        match method {
            "callTimers" => {
                let ids = args
                    .first()
                    .and_then(Value::as_array)
                    .ok_or_else(|| anyhow!("callTimers expects an array of timer ids"))?
                    .iter()
                    .map(|id| id.as_u64().ok_or_else(|| anyhow!("bad timer id {id}")))
                    .collect::<Result<Vec<_>>>()?;
                self.fire(&ids);
                Ok(())
            }
            other => bail!("{TIMERS_MODULE} has no method {other}"),
        }
    }
}
