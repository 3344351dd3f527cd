//! Collaborators the bridge consumes from its environment.
//!
//! Each seam is a small trait so hosts can plug in their own timer loop, crash
//! reporter, profiler, and module system. Stock implementations cover the
//! common case and tests.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use bridge_wire::CallQueue;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::BridgeError;

/// Scripting-side module that the host can call into.
pub trait LocalModule: Send + Sync {
    fn invoke(&self, method: &str, args: Vec<Value>) -> Result<()>;
}

/// Locates the target of an incoming call by module name.
pub trait ModuleLoader: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<dyn LocalModule>>;
}

/// Runs deferred work scheduled for "as soon as the current turn ends".
pub trait ImmediateRunner: Send + Sync {
    fn run_due_immediates(&self) -> Result<()>;
}

/// Receives faults caught at the dispatch boundary.
pub trait FatalErrorReporter: Send + Sync {
    fn report_fatal(&self, err: &BridgeError);
}

/// Brackets dispatcher work for an external profiler.
pub trait Profiler: Send + Sync {
    fn begin_span(&self, label: fmt::Arguments<'_>);
    fn end_span(&self);
}

/// Host primitive that accepts a queue without waiting to be asked.
pub trait ImmediateFlush: Send + Sync {
    fn flush_queue_immediate(&self, queue: CallQueue);
}

/// Name-keyed table of local modules.
#[derive(Clone, Default)]
pub struct LocalModuleMap {
    modules: HashMap<String, Arc<dyn LocalModule>>,
}

impl LocalModuleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, module: Arc<dyn LocalModule>) {
        self.modules.insert(name.into(), module);
    }

    pub fn with(mut self, name: impl Into<String>, module: Arc<dyn LocalModule>) -> Self {
        self.insert(name, module);
        self
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleLoader for LocalModuleMap {
    fn resolve(&self, name: &str) -> Option<Arc<dyn LocalModule>> {
        self.modules.get(name).cloned()
    }
}

type Immediate = Box<dyn FnOnce() -> Result<()> + Send>;

/// FIFO of closures drained at the end of every dispatcher turn.
///
/// Closures scheduled while draining run in the same drain. A failing closure
/// does not stop the ones after it; the first error is returned once the queue
/// is empty.
#[derive(Default)]
pub struct ImmediateQueue {
    pending: Mutex<VecDeque<Immediate>>,
}

impl ImmediateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&self, f: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.pending.lock().push_back(Box::new(f));
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl ImmediateRunner for ImmediateQueue {
    fn run_due_immediates(&self) -> Result<()> {
        let mut first_err = None;
        loop {
            // The lock is released before the closure runs so it may schedule more.
            let Some(next) = self.pending.lock().pop_front() else {
                break;
            };
            if let Err(err) = next() {
                log::warn!("immediate failed: {err:#}");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Runner for environments without deferred work.
pub struct NoImmediates;

impl ImmediateRunner for NoImmediates {
    fn run_due_immediates(&self) -> Result<()> {
        Ok(())
    }
}

/// Reports faults through the `log` facade.
pub struct LogReporter;

impl FatalErrorReporter for LogReporter {
    fn report_fatal(&self, err: &BridgeError) {
        log::error!("{err}");
    }
}

pub struct NoopProfiler;

impl Profiler for NoopProfiler {
    fn begin_span(&self, _label: fmt::Arguments<'_>) {}

    fn end_span(&self) {}
}

/// Ends a profiler span when dropped, including during unwinding.
pub(crate) struct SpanGuard<'a> {
    profiler: &'a dyn Profiler,
}

impl<'a> SpanGuard<'a> {
    pub(crate) fn begin(profiler: &'a dyn Profiler, label: fmt::Arguments<'_>) -> Self {
        profiler.begin_span(label);
        Self { profiler }
    }
}

impl Drop for SpanGuard<'_> {
    fn drop(&mut self) {
        self.profiler.end_span();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn immediates_scheduled_while_draining_run_in_the_same_drain() {
        let queue = Arc::new(ImmediateQueue::new());
        let hits = Arc::new(AtomicUsize::new(0));

        {
            let queue2 = Arc::clone(&queue);
            let hits = Arc::clone(&hits);
            queue.schedule(move || {
                hits.fetch_add(1, Ordering::SeqCst);
                let hits = Arc::clone(&hits);
                queue2.schedule(move || {
                    hits.fetch_add(10, Ordering::SeqCst);
                    Ok(())
                });
                Ok(())
            });
        }

        queue.run_due_immediates().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 11);
        assert!(queue.is_empty());
    }

    #[test]
    fn failing_immediate_does_not_starve_the_rest() {
        let queue = ImmediateQueue::new();
        let hits = Arc::new(AtomicUsize::new(0));

        queue.schedule(|| Err(anyhow!("first")));
        {
            let hits = Arc::clone(&hits);
            queue.schedule(move || {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        queue.schedule(|| Err(anyhow!("second")));

        let err = queue.run_due_immediates().unwrap_err();
        assert_eq!(err.to_string(), "first");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 0);
    }

    struct Echo;

    impl LocalModule for Echo {
        fn invoke(&self, _method: &str, _args: Vec<Value>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn module_map_resolves_by_name() {
        let map = LocalModuleMap::new().with("Echo", Arc::new(Echo));
        assert_eq!(map.len(), 1);
        assert!(map.resolve("Echo").is_some());
        assert!(map.resolve("Missing").is_none());
    }

    #[derive(Default)]
    struct Depth {
        open: AtomicUsize,
        closed: AtomicUsize,
    }

    impl Profiler for Depth {
        fn begin_span(&self, _label: fmt::Arguments<'_>) {
            self.open.fetch_add(1, Ordering::SeqCst);
        }

        fn end_span(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn span_guard_closes_on_unwind() {
        let profiler = Depth::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _span = SpanGuard::begin(&profiler, format_args!("boom"));
            panic!("inside span");
        }));

        assert!(result.is_err());
        assert_eq!(profiler.open.load(Ordering::SeqCst), 1);
        assert_eq!(profiler.closed.load(Ordering::SeqCst), 1);
    }
}
