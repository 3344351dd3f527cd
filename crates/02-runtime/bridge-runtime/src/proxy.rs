//! Method handles generated for remote modules.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bridge_wire::{MethodId, MethodType, ModuleId};
use futures::channel::oneshot;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::bridge::Bridge;
use crate::callbacks::Callback;
use crate::error::{BridgeError, BridgeResult};

/// Calling convention of a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// Trailing arguments may be failure/success continuations.
    Sync,
    /// Returns a [`Deferred`] settled by a resolve/reject pair.
    Promise,
}

impl From<MethodType> for MethodKind {
    fn from(kind: MethodType) -> Self {
        match kind {
            MethodType::Remote => MethodKind::Sync,
            MethodType::RemoteAsync => MethodKind::Promise,
        }
    }
}

impl From<MethodKind> for MethodType {
    fn from(kind: MethodKind) -> Self {
        match kind {
            MethodKind::Sync => MethodType::Remote,
            MethodKind::Promise => MethodType::RemoteAsync,
        }
    }
}

/// Sync-style argument: a plain value or a continuation.
#[derive(Debug)]
pub enum Arg {
    Value(Value),
    Callback(Callback),
}

impl Arg {
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(Vec<Value>) + Send + 'static,
    {
        Arg::Callback(Callback::new(f))
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<Callback> for Arg {
    fn from(callback: Callback) -> Self {
        Arg::Callback(callback)
    }
}

/// Splits sync-style arguments into params and trailing continuations.
///
/// The last argument, if a continuation, is the success continuation; the one
/// before it, if also a continuation, is the failure continuation. Any other
/// continuation in the list is an arity error.
pub fn split_continuations(
    mut args: Vec<Arg>,
) -> BridgeResult<(Vec<Value>, Option<Callback>, Option<Callback>)> {
    let on_succ = pop_callback(&mut args);
    let on_fail = if on_succ.is_some() {
        pop_callback(&mut args)
    } else {
        None
    };
    let params = args
        .into_iter()
        .map(|arg| match arg {
            Arg::Value(value) => Ok(value),
            Arg::Callback(_) => Err(BridgeError::InvalidCallbackArity),
        })
        .collect::<BridgeResult<Vec<_>>>()?;
    Ok((params, on_fail, on_succ))
}

fn pop_callback(args: &mut Vec<Arg>) -> Option<Callback> {
    if !matches!(args.last(), Some(Arg::Callback(_))) {
        return None;
    }
    match args.pop() {
        Some(Arg::Callback(callback)) => Some(callback),
        _ => None,
    }
}

/// Callable bound to one remote method. Holds no bridge state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MethodHandle {
    module_id: ModuleId,
    method_id: MethodId,
    kind: MethodKind,
}

impl MethodHandle {
    pub fn new(module_id: ModuleId, method_id: MethodId, kind: MethodKind) -> Self {
        Self {
            module_id,
            method_id,
            kind,
        }
    }

    pub fn module_id(&self) -> ModuleId {
        self.module_id
    }

    pub fn method_id(&self) -> MethodId {
        self.method_id
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    fn expect_kind(&self, called: MethodKind) -> BridgeResult<()> {
        if self.kind == called {
            Ok(())
        } else {
            Err(BridgeError::CallStyle {
                declared: self.kind,
                called,
            })
        }
    }

    /// Sync-style call; trailing continuations are split off `args`.
    pub fn invoke(&self, bridge: &Bridge, args: Vec<Arg>) -> BridgeResult<()> {
        self.expect_kind(MethodKind::Sync)?;
        let (params, on_fail, on_succ) = split_continuations(args)?;
        self.call(bridge, params, on_fail, on_succ)
    }

    /// Sync-style call with the continuations already split off.
    pub fn call(
        &self,
        bridge: &Bridge,
        params: Vec<Value>,
        on_fail: Option<Callback>,
        on_succ: Option<Callback>,
    ) -> BridgeResult<()> {
        self.expect_kind(MethodKind::Sync)?;
        bridge.enqueue(self.module_id, self.method_id, params, on_fail, on_succ)
    }

    /// Promise-style call.
    ///
    /// The resolve continuation takes the first callback id and the reject
    /// continuation the second; hosts answer promise methods in that order.
    pub fn call_async(&self, bridge: &Bridge, params: Vec<Value>) -> BridgeResult<Deferred> {
        self.expect_kind(MethodKind::Promise)?;
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let resolve = {
            let tx = Arc::clone(&tx);
            Callback::new(move |args| settle(&tx, Ok(first_arg(args))))
        };
        let reject = Callback::new(move |args| {
            settle(&tx, Err(RemoteError::from_error_data(first_arg(args))))
        });

        bridge.enqueue(
            self.module_id,
            self.method_id,
            params,
            Some(resolve),
            Some(reject),
        )?;
        Ok(Deferred { rx })
    }
}

type Outcome = Result<Value, RemoteError>;

fn settle(tx: &Mutex<Option<oneshot::Sender<Outcome>>>, outcome: Outcome) {
    if let Some(tx) = tx.lock().take() {
        // The receiver may already be gone; nobody is waiting then.
        let _ = tx.send(outcome);
    }
}

fn first_arg(args: Vec<Value>) -> Value {
    args.into_iter().next().unwrap_or(Value::Null)
}

/// Error object a host sent to reject a promise-style call.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
    /// Every field of the error object other than `message`.
    pub extra: Map<String, Value>,
}

impl RemoteError {
    pub fn from_error_data(data: Value) -> Self {
        match data {
            Value::Object(mut fields) => {
                let message = match fields.remove("message") {
                    Some(Value::String(message)) => message,
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                Self {
                    message,
                    extra: fields,
                }
            }
            Value::String(message) => Self {
                message,
                extra: Map::new(),
            },
            other => Self {
                message: other.to_string(),
                extra: Map::new(),
            },
        }
    }

    fn abandoned() -> Self {
        Self {
            message: "call was dropped before the host replied".to_owned(),
            extra: Map::new(),
        }
    }
}

/// Pending result of a promise-style call.
#[derive(Debug)]
pub struct Deferred {
    rx: oneshot::Receiver<Outcome>,
}

impl Deferred {
    /// Returns the outcome if the host has replied, without blocking.
    pub fn try_take(&mut self) -> Option<Outcome> {
        match self.rx.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::Canceled) => Some(Err(RemoteError::abandoned())),
        }
    }
}

impl Future for Deferred {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(RemoteError::abandoned())),
            Poll::Pending => Poll::Pending,
        }
    }
}
