//! Bounded record of which call issued which callback ids.
//!
//! Entries are keyed by `callback_id >> 1` and masked into a fixed number of
//! slots, so newer calls overwrite older ones. Lookups check that the stored
//! entry actually covers the requested id; an overwritten entry reads as absent.

use bridge_wire::{MethodId, ModuleId};

use crate::callbacks::CallbackId;

/// Largest accepted window, in bits.
pub const MAX_WINDOW_BITS: u32 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallOrigin {
    pub module_id: ModuleId,
    pub method_id: MethodId,
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    first: CallbackId,
    last: CallbackId,
    origin: CallOrigin,
}

#[derive(Clone, Debug)]
pub struct DiagnosticRing {
    slots: Vec<Option<Entry>>,
    mask: u64,
}

impl DiagnosticRing {
    /// Creates a ring with `1 << bits` slots. `bits` is clamped to
    /// [`MAX_WINDOW_BITS`].
    pub fn new(bits: u32) -> Self {
        let capacity = 1usize << bits.min(MAX_WINDOW_BITS);
        Self {
            slots: vec![None; capacity],
            mask: capacity as u64 - 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Records the call that reserved ids `first..=last`.
    pub fn record(&mut self, first: CallbackId, last: CallbackId, origin: CallOrigin) {
        let entry = Entry {
            first,
            last,
            origin,
        };
        for key in (first >> 1)..=(last >> 1) {
            self.slots[(key & self.mask) as usize] = Some(entry);
        }
    }

    pub fn lookup(&self, id: CallbackId) -> Option<CallOrigin> {
        let entry = self.slots[((id >> 1) & self.mask) as usize]?;
        (entry.first <= id && id <= entry.last).then_some(entry.origin)
    }
}
