//! Callback correlation table.
//!
//! Every continuation attached to an outgoing call gets a numeric id drawn from
//! one monotonically increasing counter. The host replies with that id and the
//! table hands the continuation back exactly once; its sibling from the same
//! call is discarded at the same moment.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::error::{BridgeError, BridgeResult};

pub type CallbackId = u64;

/// Position of a continuation within its call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotKind {
    Failure,
    Success,
}

type CallbackFn = Box<dyn FnOnce(Vec<Value>) -> anyhow::Result<()> + Send>;

/// Continuation invoked with the arguments of the host's reply.
pub struct Callback(CallbackFn);

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Vec<Value>) + Send + 'static,
    {
        Self(Box::new(move |args| {
            f(args);
            Ok(())
        }))
    }

    /// Wraps a continuation whose errors are reported as dispatch faults.
    pub fn fallible<F>(f: F) -> Self
    where
        F: FnOnce(Vec<Value>) -> anyhow::Result<()> + Send + 'static,
    {
        Self(Box::new(f))
    }

    pub(crate) fn call(self, args: Vec<Value>) -> anyhow::Result<()> {
        (self.0)(args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(..)")
    }
}

/// Ids reserved for one call, in the order they are appended to its params.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Reservation {
    pub fail: Option<CallbackId>,
    pub succ: Option<CallbackId>,
}

impl Reservation {
    pub fn ids(&self) -> impl Iterator<Item = CallbackId> {
        self.fail.into_iter().chain(self.succ)
    }

    /// Inclusive id range covered by this reservation.
    pub fn span(&self) -> Option<(CallbackId, CallbackId)> {
        let first = self.fail.or(self.succ)?;
        let last = self.succ.or(self.fail)?;
        Some((first, last))
    }
}

struct Slot {
    kind: SlotKind,
    sibling: Option<CallbackId>,
    callback: Callback,
}

#[derive(Default)]
pub struct CallbackTable {
    next_id: CallbackId,
    slots: HashMap<CallbackId, Slot>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the continuations of one call.
    ///
    /// Consumes one id per continuation. A failure continuation without a
    /// success continuation is rejected before any id is consumed.
    pub fn reserve(
        &mut self,
        on_fail: Option<Callback>,
        on_succ: Option<Callback>,
    ) -> BridgeResult<Reservation> {
        match (on_fail, on_succ) {
            (None, None) => Ok(Reservation::default()),
            (Some(_), None) => Err(BridgeError::InvalidCallbackArity),
            (None, Some(succ)) => {
                let id = self.allocate();
                self.slots.insert(
                    id,
                    Slot {
                        kind: SlotKind::Success,
                        sibling: None,
                        callback: succ,
                    },
                );
                Ok(Reservation {
                    fail: None,
                    succ: Some(id),
                })
            }
            (Some(fail), Some(succ)) => {
                let fail_id = self.allocate();
                let succ_id = self.allocate();
                self.slots.insert(
                    fail_id,
                    Slot {
                        kind: SlotKind::Failure,
                        sibling: Some(succ_id),
                        callback: fail,
                    },
                );
                self.slots.insert(
                    succ_id,
                    Slot {
                        kind: SlotKind::Success,
                        sibling: Some(fail_id),
                        callback: succ,
                    },
                );
                Ok(Reservation {
                    fail: Some(fail_id),
                    succ: Some(succ_id),
                })
            }
        }
    }

    /// Removes the continuation for `id` together with its sibling.
    ///
    /// Returns `None` for ids that were never issued or were already consumed.
    pub fn take(&mut self, id: CallbackId) -> Option<(SlotKind, Callback)> {
        let slot = self.slots.remove(&id)?;
        if let Some(sibling) = slot.sibling {
            self.slots.remove(&sibling);
        }
        Some((slot.kind, slot.callback))
    }

    /// Number of continuations still waiting for a reply.
    pub fn pending(&self) -> usize {
        self.slots.len()
    }

    pub fn is_pending(&self, id: CallbackId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Id the next reservation will start at.
    pub fn next_id(&self) -> CallbackId {
        self.next_id
    }

    fn allocate(&mut self) -> CallbackId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
