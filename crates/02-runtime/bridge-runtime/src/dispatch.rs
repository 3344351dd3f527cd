//! Host-facing entry points.
//!
//! Every piece of host-invoked code (local modules, continuations, immediates)
//! runs through [`guard`]. Errors and panics stop there: they are reported to the
//! fatal-error collaborator as [`BridgeError::DispatchFault`] and the turn goes on
//! to flush the queue as usual.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use anyhow::{anyhow, Context as _, Result};
use bridge_wire::{CallQueue, Target};
use serde_json::Value;

use crate::bridge::{fmt_args, Bridge, SPY_TARGET};
use crate::callbacks::CallbackId;
use crate::collab::{FatalErrorReporter, SpanGuard};
use crate::error::{BridgeError, BridgeResult, CallSite};

fn guard<C, F>(reporter: &dyn FatalErrorReporter, context: C, f: F)
where
    C: FnOnce() -> String,
    F: FnOnce() -> Result<()>,
{
    let message = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => return,
        Ok(Err(err)) => format!("{err:#}"),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };
    reporter.report_fatal(&BridgeError::DispatchFault {
        context: context(),
        message,
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

impl Bridge {
    /// Runs an incoming call and returns whatever it (or its immediates) queued.
    ///
    /// Module and method may be given as ids from the local module config or as
    /// names; names bypass the tables and go straight to the module loader.
    pub fn call_function_return_flushed_queue(
        &self,
        module: impl Into<Target>,
        method: impl Into<Target>,
        args: Vec<Value>,
    ) -> Option<CallQueue> {
        let (module, method) = (module.into(), method.into());
        self.begin_turn();
        guard(
            &*self.inner.reporter,
            || format!("call to {module}.{method}"),
            || self.call_function(&module, &method, args),
        );
        self.flushed_queue()
    }

    /// Delivers a host reply to the continuation registered under `id`.
    ///
    /// A missing id is a hard error. It goes to the fatal reporter and back to
    /// the caller, and the queue is left untouched so the next turn still
    /// flushes everything pending.
    pub fn invoke_callback_and_return_flushed_queue(
        &self,
        id: CallbackId,
        args: Vec<Value>,
    ) -> BridgeResult<Option<CallQueue>> {
        let inner = &*self.inner;
        self.begin_turn();

        let taken = {
            let mut state = inner.state.lock();
            state
                .callbacks
                .take(id)
                .ok_or_else(|| state.ring.lookup(id))
        };
        let (kind, callback) = match taken {
            Ok(slot) => slot,
            Err(origin) => {
                let origin = origin
                    .map(|origin| inner.registry.call_site(origin))
                    .unwrap_or_else(CallSite::default);
                let err = BridgeError::UnknownCallback { id, origin };
                inner.reporter.report_fatal(&err);
                return Err(err);
            }
        };

        if inner.config.spy {
            log::debug!(target: SPY_TARGET, "callback {id} ({kind:?}) with {}", fmt_args(&args));
        }
        guard(
            &*inner.reporter,
            || format!("callback {id}"),
            || {
                let _span = SpanGuard::begin(&*inner.profiler, format_args!("callback {id}"));
                callback.call(args)
            },
        );
        Ok(self.flushed_queue())
    }

    fn call_function(&self, module: &Target, method: &Target, args: Vec<Value>) -> Result<()> {
        let inner = &*self.inner;
        let (module, method) = inner.registry.local().resolve(module, method)?;
        if inner.config.spy {
            log::debug!(target: SPY_TARGET, "incoming {module}.{method}({})", fmt_args(&args));
        }

        let _span = SpanGuard::begin(&*inner.profiler, format_args!("{module}.{method}()"));
        let target = inner
            .loader
            .resolve(&module)
            .ok_or_else(|| anyhow!("module {module} is not registered"))?;
        target
            .invoke(&method, args)
            .with_context(|| format!("{module}.{method}() failed"))
    }

    /// Drains immediates scheduled by earlier turns.
    pub(crate) fn call_immediates(&self) {
        let inner = &*self.inner;
        guard(
            &*inner.reporter,
            || "immediates".to_owned(),
            || {
                let _span = SpanGuard::begin(&*inner.profiler, format_args!("immediates"));
                inner.immediates.run_due_immediates()
            },
        );
    }

    fn begin_turn(&self) {
        let now = self.inner.clock.now();
        self.inner.state.lock().flush.restart(now);
        self.call_immediates();
    }
}
