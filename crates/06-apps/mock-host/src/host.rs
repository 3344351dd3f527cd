//! In-process host driving a [`Bridge`] the way a native runtime would.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bridge_runtime::{
    BatchedBridgeConfig, Bridge, BridgeBuilder, BridgeConfig, CallQueue, ImmediateFlush,
    ImmediateQueue, LocalModule, LocalModuleMap, ManualClock, MethodType, ModuleConfig,
    ModuleSpec, Target,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::native::{Alerts, NativeModule, Replies, Reply, Settings, Timing, Vibration};
use crate::script::{ScriptTimers, TIMERS_MODULE};

/// Shape the host uses when it advertises its modules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConfigForm {
    #[default]
    Array,
    Legacy,
}

/// Queues pushed by the bridge between host turns.
#[derive(Default)]
struct Inbox {
    queues: Mutex<Vec<CallQueue>>,
}

impl ImmediateFlush for Inbox {
    fn flush_queue_immediate(&self, queue: CallQueue) {
        log::trace!("host received a pushed batch of {}", queue.len());
        self.queues.lock().push(queue);
    }
}

/// Counters describing what the host has seen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HostStats {
    /// Batches executed, pulled and pushed.
    pub batches: usize,
    pub pushed_batches: usize,
    /// Calls executed across all batches.
    pub calls: usize,
    /// Native calls that returned an error.
    pub failed_calls: usize,
}

pub struct MockHostBuilder {
    form: ConfigForm,
    config: BridgeConfig,
    push: bool,
    modules: Vec<Arc<dyn NativeModule>>,
    local: Vec<(ModuleSpec, Arc<dyn LocalModule>)>,
}

impl MockHostBuilder {
    pub fn config_form(mut self, form: ConfigForm) -> Self {
        self.form = form;
        self
    }

    pub fn bridge_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Disables the push path so batches only leave on host turns.
    pub fn pull_only(mut self) -> Self {
        self.push = false;
        self
    }

    pub fn module(mut self, module: Arc<dyn NativeModule>) -> Self {
        self.modules.push(module);
        self
    }

    /// Registers a scripting-side module the host may call into.
    pub fn local_module(
        mut self,
        name: &str,
        methods: &[&str],
        module: Arc<dyn LocalModule>,
    ) -> Self {
        let spec = methods
            .iter()
            .fold(ModuleSpec::new(name), |spec, method| {
                spec.with_method(*method, MethodType::Remote)
            });
        self.local.push((spec, module));
        self
    }

    pub fn build(self) -> Result<MockHost> {
        let clock = Arc::new(ManualClock::new());
        let timing = Arc::new(Timing::new(clock.clone()));
        let script_timers = Arc::new(ScriptTimers::new());

        let mut modules = self.modules;
        modules.push(timing.clone());
        let mut remote = ModuleConfig::new();
        for module in &modules {
            remote.push(module.spec());
        }

        let mut local = ModuleConfig::new();
        let mut loader = LocalModuleMap::new();
        let timers_id = local.push(
            ModuleSpec::new(TIMERS_MODULE).with_method("callTimers", MethodType::Remote),
        );
        loader.insert(TIMERS_MODULE, script_timers.clone());
        for (spec, module) in self.local {
            loader.insert(spec.name.clone(), module);
            local.push(spec);
        }

        let remote_value = match self.form {
            ConfigForm::Array => remote.to_value(),
            ConfigForm::Legacy => remote.to_legacy_value(),
        };
        let injected = json!({
            "remoteModuleConfig": remote_value,
            "localModulesConfig": local.to_value(),
            "bridge": serde_json::to_value(&self.config)?,
        });
        let config = BatchedBridgeConfig::from_json_str(&injected.to_string())
            .context("host config did not round-trip")?;

        let inbox = Arc::new(Inbox::default());
        let immediates = Arc::new(ImmediateQueue::new());
        let mut builder = BridgeBuilder::from_config(config)
            .clock(clock.clone())
            .loader(Arc::new(loader))
            .immediates(immediates.clone());
        if self.push {
            builder = builder.push_flush(inbox.clone());
        }

        Ok(MockHost {
            bridge: builder.build()?,
            clock,
            inbox,
            immediates,
            script_timers,
            timing,
            timers_id,
            modules,
            replies: Replies::default(),
            stats: HostStats::default(),
        })
    }
}

/// Executes flushed batches against [`NativeModule`]s and feeds replies back.
pub struct MockHost {
    bridge: Bridge,
    clock: Arc<ManualClock>,
    inbox: Arc<Inbox>,
    immediates: Arc<ImmediateQueue>,
    script_timers: Arc<ScriptTimers>,
    timing: Arc<Timing>,
    timers_id: u32,
    modules: Vec<Arc<dyn NativeModule>>,
    replies: Replies,
    stats: HostStats,
}

/// Upper bound on host turns per [`MockHost::pump`].
const MAX_TURNS: usize = 10_000;

impl MockHost {
    pub fn builder() -> MockHostBuilder {
        MockHostBuilder {
            form: ConfigForm::default(),
            config: BridgeConfig::default(),
            push: true,
            modules: Vec::new(),
            local: Vec::new(),
        }
    }

    /// Host with `Alerts`, `Vibration`, `Settings` and `Timing`.
    pub fn with_stock_modules() -> MockHostBuilder {
        let mut constants = Map::new();
        constants.insert("theme".to_owned(), json!("light"));
        Self::builder()
            .module(Arc::new(Alerts::new()))
            .module(Arc::new(Vibration::new()))
            .module(Arc::new(Settings::new(constants)))
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Deferred work drained at the end of every bridge turn.
    pub fn immediates(&self) -> Arc<ImmediateQueue> {
        Arc::clone(&self.immediates)
    }

    pub fn timers(&self) -> &ScriptTimers {
        &self.script_timers
    }

    pub fn stats(&self) -> HostStats {
        self.stats
    }

    /// Queues a call into the scripting side for the next [`pump`](Self::pump).
    pub fn call_script(
        &mut self,
        module: impl Into<Target>,
        method: impl Into<Target>,
        args: Vec<Value>,
    ) {
        self.replies.call(module, method, args);
    }

    /// Runs host turns until the bridge is quiet.
    ///
    /// Each turn executes every batch the bridge produced and then delivers
    /// the replies those batches generated. Returns the number of calls
    /// executed.
    pub fn pump(&mut self) -> Result<usize> {
        let before = self.stats.calls;
        for _ in 0..MAX_TURNS {
            let mut progressed = false;
            for queue in self.take_outgoing() {
                progressed = true;
                self.execute(queue);
            }
            while let Some(reply) = self.replies.pop() {
                progressed = true;
                if let Some(queue) = self.deliver(reply)? {
                    self.execute(queue);
                }
            }
            if !progressed {
                return Ok(self.stats.calls - before);
            }
        }
        bail!("bridge still busy after {MAX_TURNS} host turns")
    }

    /// Moves the clock, fires due timers into the scripting side, and pumps.
    pub fn advance(&mut self, by: Duration) -> Result<usize> {
        self.clock.advance(by);
        let due = self.timing.take_due();
        if !due.is_empty() {
            self.replies
                .call(self.timers_id, 0u32, vec![json!(due)]);
        }
        self.pump()
    }

    fn take_outgoing(&mut self) -> Vec<CallQueue> {
        let mut queues = std::mem::take(&mut *self.inbox.queues.lock());
        self.stats.pushed_batches += queues.len();
        queues.extend(self.bridge.flushed_queue());
        queues
    }

    fn deliver(&mut self, reply: Reply) -> Result<Option<CallQueue>> {
        match reply {
            Reply::Callback { id, args } => Ok(self
                .bridge
                .invoke_callback_and_return_flushed_queue(id, args)?),
            Reply::Call {
                module,
                method,
                args,
            } => Ok(self
                .bridge
                .call_function_return_flushed_queue(module, method, args)),
        }
    }

    fn execute(&mut self, queue: CallQueue) {
        self.stats.batches += 1;
        for (module_id, method_id, params) in queue.into_calls() {
            self.stats.calls += 1;
            let Some(module) = self.modules.get(module_id as usize) else {
                log::warn!("batch addressed unknown module {module_id}");
                self.stats.failed_calls += 1;
                continue;
            };
            let spec = module.spec();
            let Some(method) = spec.method_name(method_id) else {
                log::warn!("{} has no method id {method_id}", spec.name);
                self.stats.failed_calls += 1;
                continue;
            };
            if let Err(err) = module.call(method, params, &mut self.replies) {
                log::warn!("{}.{method}() failed: {err:#}", spec.name);
                self.stats.failed_calls += 1;
            }
        }
    }
}
