//! The bridge instance: call encoder, queue, and flush entry point.
//!
//! All mutable state sits behind one mutex. The lock is only held while the
//! queue, callback table, or diagnostic ring change; user code (continuations,
//! local modules, immediates, push sinks) always runs with the lock released.

use std::mem;
use std::sync::Arc;

use bridge_wire::{CallQueue, MethodId, ModuleConfig, ModuleId};
use parking_lot::Mutex;
use serde_json::Value;

use crate::callbacks::{Callback, CallbackId, CallbackTable};
use crate::clock::{Clock, SystemClock};
use crate::collab::{
    FatalErrorReporter, ImmediateFlush, ImmediateRunner, LocalModuleMap, LogReporter,
    ModuleLoader, NoImmediates, NoopProfiler, Profiler,
};
use crate::config::{BatchedBridgeConfig, BridgeConfig};
use crate::debug_ring::{CallOrigin, DiagnosticRing};
use crate::error::BridgeResult;
use crate::flush::FlushScheduler;
use crate::proxy::MethodHandle;
use crate::registry::{Registry, RemoteModule};

/// Log target for per-call traffic when spy mode is on.
pub const SPY_TARGET: &str = "bridge::spy";

pub(crate) struct State {
    pub(crate) queue: CallQueue,
    pub(crate) callbacks: CallbackTable,
    pub(crate) ring: DiagnosticRing,
    pub(crate) flush: FlushScheduler,
}

pub(crate) struct Inner {
    pub(crate) registry: Registry,
    pub(crate) config: BridgeConfig,
    pub(crate) loader: Arc<dyn ModuleLoader>,
    pub(crate) immediates: Arc<dyn ImmediateRunner>,
    pub(crate) reporter: Arc<dyn FatalErrorReporter>,
    pub(crate) profiler: Arc<dyn Profiler>,
    pub(crate) push: Option<Arc<dyn ImmediateFlush>>,
    pub(crate) clock: Arc<dyn Clock>,
    /// Held across every queue handoff, from taking the queue until the host
    /// has it, so batches reach the host in the order they were cut.
    /// Always acquired before `state`.
    pub(crate) handoff: Mutex<()>,
    pub(crate) state: Mutex<State>,
}

/// Handle to a bridge instance. Clones share the same instance.
#[derive(Clone)]
pub struct Bridge {
    pub(crate) inner: Arc<Inner>,
}

impl Bridge {
    pub fn builder(remote: ModuleConfig) -> BridgeBuilder {
        BridgeBuilder::new(remote)
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn remote_module(&self, name: &str) -> Option<&RemoteModule> {
        self.inner.registry.module(name)
    }

    /// Looks up the handle of `module.method` by name.
    pub fn handle(&self, module: &str, method: &str) -> Option<MethodHandle> {
        self.remote_module(module)?.method(method)
    }

    /// Appends a call to the outgoing queue.
    ///
    /// Continuations get callback ids appended to `params`, failure id first.
    /// When a push sink is installed and the flush interval has elapsed, the
    /// whole queue is handed to the host before this returns. The push sink
    /// must not re-enter the bridge.
    pub fn enqueue(
        &self,
        module_id: ModuleId,
        method_id: MethodId,
        mut params: Vec<Value>,
        on_fail: Option<Callback>,
        on_succ: Option<Callback>,
    ) -> BridgeResult<()> {
        let inner = &*self.inner;
        let _handoff = inner.handoff.lock();
        let due = {
            let mut state = inner.state.lock();
            let reservation = state.callbacks.reserve(on_fail, on_succ)?;
            if let Some((first, last)) = reservation.span() {
                state.ring.record(
                    first,
                    last,
                    CallOrigin {
                        module_id,
                        method_id,
                    },
                );
            }
            params.extend(reservation.ids().map(Value::from));

            if inner.config.spy {
                let site = inner.registry.call_site(CallOrigin {
                    module_id,
                    method_id,
                });
                log::debug!(target: SPY_TARGET, "outgoing {site} with {}", fmt_args(&params));
            }

            state.queue.push(module_id, method_id, params);
            if state.flush.should_push(inner.clock.now()) {
                Some(mem::take(&mut state.queue))
            } else {
                None
            }
        };

        if let (Some(queue), Some(push)) = (due, &inner.push) {
            log::trace!("pushing {} queued calls to the host", queue.len());
            push.flush_queue_immediate(queue);
        }
        Ok(())
    }

    /// Hands the pending queue to the host, or `None` when nothing is pending.
    ///
    /// Deferred immediates run first so calls they make ride along.
    pub fn flushed_queue(&self) -> Option<CallQueue> {
        self.call_immediates();
        let _handoff = self.inner.handoff.lock();
        let queue = mem::take(&mut self.inner.state.lock().queue);
        (!queue.is_empty()).then_some(queue)
    }

    /// Calls queued and not yet handed off.
    pub fn pending_calls(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Continuations still waiting for a reply.
    pub fn pending_callbacks(&self) -> usize {
        self.inner.state.lock().callbacks.pending()
    }

    pub fn is_callback_pending(&self, id: CallbackId) -> bool {
        self.inner.state.lock().callbacks.is_pending(id)
    }

    pub fn next_callback_id(&self) -> CallbackId {
        self.inner.state.lock().callbacks.next_id()
    }
}

pub(crate) fn fmt_args(args: &[Value]) -> String {
    Value::Array(args.to_vec()).to_string()
}

/// Assembles a [`Bridge`] from module configs and collaborators.
///
/// Every collaborator is optional: the defaults resolve no local modules, run
/// no immediates, report faults through `log`, skip profiling, never push, and
/// read the system clock.
pub struct BridgeBuilder {
    remote: ModuleConfig,
    local: Option<ModuleConfig>,
    config: BridgeConfig,
    loader: Option<Arc<dyn ModuleLoader>>,
    immediates: Option<Arc<dyn ImmediateRunner>>,
    reporter: Option<Arc<dyn FatalErrorReporter>>,
    profiler: Option<Arc<dyn Profiler>>,
    push: Option<Arc<dyn ImmediateFlush>>,
    clock: Option<Arc<dyn Clock>>,
}

impl BridgeBuilder {
    pub fn new(remote: ModuleConfig) -> Self {
        Self {
            remote,
            local: None,
            config: BridgeConfig::default(),
            loader: None,
            immediates: None,
            reporter: None,
            profiler: None,
            push: None,
            clock: None,
        }
    }

    /// Starts from the configuration object a host injects at startup.
    pub fn from_config(config: BatchedBridgeConfig) -> Self {
        let mut builder = Self::new(config.remote_module_config).config(config.bridge);
        builder.local = config.local_modules_config;
        builder
    }

    pub fn local_modules(mut self, local: ModuleConfig) -> Self {
        self.local = Some(local);
        self
    }

    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn immediates(mut self, immediates: Arc<dyn ImmediateRunner>) -> Self {
        self.immediates = Some(immediates);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn FatalErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn profiler(mut self, profiler: Arc<dyn Profiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    /// Installs the host's immediate-delivery primitive, enabling push flushes.
    pub fn push_flush(mut self, push: Arc<dyn ImmediateFlush>) -> Self {
        self.push = Some(push);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> BridgeResult<Bridge> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let registry = Registry::build(&self.remote, self.local.as_ref());
        let state = State {
            queue: CallQueue::new(),
            callbacks: CallbackTable::new(),
            ring: DiagnosticRing::new(self.config.debug_window_bits),
            flush: FlushScheduler::new(
                self.config.flush_interval(),
                clock.now(),
                self.push.is_some(),
            ),
        };

        log::debug!(
            "bridge built with {} remote and {} local modules",
            registry.remote().len(),
            registry.local().len()
        );

        Ok(Bridge {
            inner: Arc::new(Inner {
                registry,
                config: self.config,
                loader: self
                    .loader
                    .unwrap_or_else(|| Arc::new(LocalModuleMap::new())),
                immediates: self.immediates.unwrap_or_else(|| Arc::new(NoImmediates)),
                reporter: self.reporter.unwrap_or_else(|| Arc::new(LogReporter)),
                profiler: self.profiler.unwrap_or_else(|| Arc::new(NoopProfiler)),
                push: self.push,
                clock,
                handoff: Mutex::new(()),
                state: Mutex::new(state),
            }),
        })
    }
}
