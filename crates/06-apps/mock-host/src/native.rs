//! Native modules served by the mock host.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use bridge_runtime::{CallbackId, Clock, MethodType, ModuleSpec, Target};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

/// Something the host sends back into the bridge on a later turn.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Callback {
        id: CallbackId,
        args: Vec<Value>,
    },
    Call {
        module: Target,
        method: Target,
        args: Vec<Value>,
    },
}

/// FIFO of replies produced while executing a batch.
#[derive(Debug, Default)]
pub struct Replies {
    queue: VecDeque<Reply>,
}

impl Replies {
    pub fn callback(&mut self, id: CallbackId, args: Vec<Value>) {
        self.queue.push_back(Reply::Callback { id, args });
    }

    pub fn call(&mut self, module: impl Into<Target>, method: impl Into<Target>, args: Vec<Value>) {
        self.queue.push_back(Reply::Call {
            module: module.into(),
            method: method.into(),
            args,
        });
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn pop(&mut self) -> Option<Reply> {
        self.queue.pop_front()
    }
}

/// Host-side implementation of a remote module.
pub trait NativeModule: Send + Sync {
    /// Declaration advertised to the scripting side.
    fn spec(&self) -> ModuleSpec;

    fn call(&self, method: &str, params: Vec<Value>, replies: &mut Replies) -> Result<()>;
}

fn callback_id(params: &[Value], index: usize) -> Result<CallbackId> {
    params
        .get(index)
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("expected a callback id at position {index}"))
}

fn string_arg(params: &[Value], index: usize) -> Result<&str> {
    params
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("expected a string at position {index}"))
}

/// `Alerts.show(message, [onDismiss])`: records the message and presses `button`.
#[derive(Default)]
pub struct Alerts {
    button: u64,
    shown: Mutex<Vec<String>>,
}

impl Alerts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Button index reported back to every alert's continuation.
    pub fn pressing(button: u64) -> Self {
        Self {
            button,
            ..Self::default()
        }
    }

    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().clone()
    }
}

impl NativeModule for Alerts {
    fn spec(&self) -> ModuleSpec {
        ModuleSpec::new("Alerts").with_method("show", MethodType::Remote)
    }

    fn call(&self, method: &str, params: Vec<Value>, replies: &mut Replies) -> Result<()> {
        match method {
            "show" => {
                self.shown.lock().push(string_arg(&params, 0)?.to_owned());
                // The success continuation always comes last.
                if params.len() > 1 {
                    let id = callback_id(&params, params.len() - 1)?;
                    replies.callback(id, vec![json!(self.button)]);
                }
                Ok(())
            }
            other => bail!("Alerts has no method {other}"),
        }
    }
}

/// Fire-and-forget module without continuations.
#[derive(Default)]
pub struct Vibration {
    patterns: Mutex<Vec<Value>>,
    cancelled: Mutex<usize>,
}

impl Vibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn patterns(&self) -> Vec<Value> {
        self.patterns.lock().clone()
    }

    pub fn cancelled(&self) -> usize {
        *self.cancelled.lock()
    }
}

impl NativeModule for Vibration {
    fn spec(&self) -> ModuleSpec {
        ModuleSpec::new("Vibration")
            .with_method("vibrate", MethodType::Remote)
            .with_method("cancel", MethodType::Remote)
    }

    fn call(&self, method: &str, params: Vec<Value>, _replies: &mut Replies) -> Result<()> {
        match method {
            "vibrate" => {
                let pattern = params.into_iter().next().unwrap_or(Value::Null);
                self.patterns.lock().push(pattern);
            }
            "cancel" => *self.cancelled.lock() += 1,
            other => bail!("Vibration has no method {other}"),
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
struct Timer {
    due: Duration,
    interval: Duration,
    repeats: bool,
}

/// `Timing.createTimer(id, delayMs, repeats)` / `Timing.deleteTimer(id)`.
///
/// Timers only fire when the host advances its clock; see
/// [`crate::MockHost::advance`].
pub struct Timing {
    clock: Arc<dyn Clock>,
    timers: Mutex<BTreeMap<u64, Timer>>,
}

impl Timing {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            timers: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn active(&self) -> usize {
        self.timers.lock().len()
    }

    /// Ids of timers due at the current clock reading, in id order.
    /// One-shot timers are removed; repeating ones are rescheduled.
    pub fn take_due(&self) -> Vec<u64> {
        let now = self.clock.now();
        let mut timers = self.timers.lock();
        let due: Vec<u64> = timers
            .iter()
            .filter(|(_, timer)| timer.due <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &due {
            match timers.get_mut(id) {
                Some(timer) if timer.repeats => timer.due = now + timer.interval,
                _ => {
                    timers.remove(id);
                }
            }
        }
        due
    }
}

impl NativeModule for Timing {
    fn spec(&self) -> ModuleSpec {
        ModuleSpec::new("Timing")
            .with_method("createTimer", MethodType::Remote)
            .with_method("deleteTimer", MethodType::Remote)
    }

    fn call(&self, method: &str, params: Vec<Value>, _replies: &mut Replies) -> Result<()> {
        let id = params
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("Timing.{method} needs a timer id"))?;
        match method {
            "createTimer" => {
                let delay_ms = params.get(1).and_then(Value::as_u64).unwrap_or(0);
                let repeats = params.get(2).and_then(Value::as_bool).unwrap_or(false);
                let interval = Duration::from_millis(delay_ms);
                self.timers.lock().insert(
                    id,
                    Timer {
                        due: self.clock.now() + interval,
                        interval,
                        repeats,
                    },
                );
            }
            "deleteTimer" => {
                self.timers.lock().remove(&id);
            }
            other => bail!("Timing has no method {other}"),
        }
        Ok(())
    }
}

/// Key-value store with constants and a promise-style getter.
pub struct Settings {
    constants: Map<String, Value>,
    values: Mutex<Map<String, Value>>,
}

impl Settings {
    pub fn new(constants: Map<String, Value>) -> Self {
        Self {
            constants,
            values: Mutex::new(Map::new()),
        }
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }
}

impl NativeModule for Settings {
    fn spec(&self) -> ModuleSpec {
        ModuleSpec::new("Settings")
            .with_constants(self.constants.clone())
            .with_method("setValues", MethodType::Remote)
            .with_method("getValue", MethodType::RemoteAsync)
    }

    fn call(&self, method: &str, params: Vec<Value>, replies: &mut Replies) -> Result<()> {
        match method {
            "setValues" => match params.into_iter().next() {
                Some(Value::Object(values)) => self.values.lock().extend(values),
                _ => bail!("Settings.setValues expects an object"),
            },
            "getValue" => {
                let key = string_arg(&params, 0)?;
                let (resolve, reject) = (callback_id(&params, 1)?, callback_id(&params, 2)?);
                match self.value(key) {
                    Some(value) => replies.callback(resolve, vec![value]),
                    None => replies.callback(
                        reject,
                        vec![json!({"message": format!("no value for {key}"), "key": key})],
                    ),
                }
            }
            other => bail!("Settings has no method {other}"),
        }
        Ok(())
    }
}
