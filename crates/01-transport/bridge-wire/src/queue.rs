//! Outgoing call queue and its wire shape.
//!
//! On the wire a queue is exactly three equal-length arrays: module ids, method
//! ids, and one params array per call. [`CallQueue`] keeps the columns private
//! so every mutation goes through [`CallQueue::push`] and the lengths never
//! drift apart.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{MethodId, ModuleId};
use crate::error::{WireError, WireResult};

/// Column form of a [`CallQueue`] as it appears on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueColumns(pub Vec<ModuleId>, pub Vec<MethodId>, pub Vec<Vec<Value>>);

/// Batch of calls waiting to be handed to the host.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "QueueColumns", into = "QueueColumns")]
pub struct CallQueue {
    module_ids: Vec<ModuleId>,
    method_ids: Vec<MethodId>,
    params: Vec<Vec<Value>>,
}

/// Borrowed view of one queued call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QueuedCall<'a> {
    pub module_id: ModuleId,
    pub method_id: MethodId,
    pub params: &'a [Value],
}

impl CallQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, module_id: ModuleId, method_id: MethodId, params: Vec<Value>) {
        self.module_ids.push(module_id);
        self.method_ids.push(method_id);
        self.params.push(params);
    }

    pub fn len(&self) -> usize {
        self.module_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.module_ids.is_empty()
    }

    pub fn module_ids(&self) -> &[ModuleId] {
        &self.module_ids
    }

    pub fn method_ids(&self) -> &[MethodId] {
        &self.method_ids
    }

    pub fn params(&self) -> &[Vec<Value>] {
        &self.params
    }

    pub fn iter(&self) -> impl Iterator<Item = QueuedCall<'_>> {
        self.module_ids
            .iter()
            .zip(&self.method_ids)
            .zip(&self.params)
            .map(|((module_id, method_id), params)| QueuedCall {
                module_id: *module_id,
                method_id: *method_id,
                params,
            })
    }

    /// Consumes the queue, yielding `(module_id, method_id, params)` in call order.
    pub fn into_calls(self) -> impl Iterator<Item = (ModuleId, MethodId, Vec<Value>)> {
        self.module_ids
            .into_iter()
            .zip(self.method_ids)
            .zip(self.params)
            .map(|((module_id, method_id), params)| (module_id, method_id, params))
    }

    /// Appends every call of `other` after the calls already queued.
    pub fn append(&mut self, other: CallQueue) {
        for (module_id, method_id, params) in other.into_calls() {
            self.push(module_id, method_id, params);
        }
    }

    pub fn to_json(&self) -> WireResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> WireResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl TryFrom<QueueColumns> for CallQueue {
    type Error = WireError;

    fn try_from(QueueColumns(module_ids, method_ids, params): QueueColumns) -> WireResult<Self> {
        if module_ids.len() != method_ids.len() || module_ids.len() != params.len() {
            return Err(WireError::QueueShape {
                modules: module_ids.len(),
                methods: method_ids.len(),
                params: params.len(),
            });
        }
        Ok(Self {
            module_ids,
            method_ids,
            params,
        })
    }
}

impl From<CallQueue> for QueueColumns {
    fn from(queue: CallQueue) -> Self {
        QueueColumns(queue.module_ids, queue.method_ids, queue.params)
    }
}
