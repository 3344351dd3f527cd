//! Cross-crate test suite for the batched call bridge.

#[cfg(test)]
mod scenarios;

#[cfg(test)]
mod invariants;

#[cfg(test)]
mod host_e2e;

#[cfg(test)]
pub(crate) mod support {
    use bridge_runtime::{
        BridgeError, CallQueue, FatalErrorReporter, ImmediateFlush, ModuleConfig,
    };
    use parking_lot::Mutex;
    use serde_json::Value;

    pub fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    pub fn config(value: Value) -> ModuleConfig {
        ModuleConfig::from_value(&value).expect("test config decodes")
    }

    /// Collects every reported fault as text.
    #[derive(Default)]
    pub struct Faults(pub Mutex<Vec<String>>);

    impl FatalErrorReporter for Faults {
        fn report_fatal(&self, err: &BridgeError) {
            self.0.lock().push(err.to_string());
        }
    }

    /// Records every queue the bridge pushes.
    #[derive(Default)]
    pub struct Handoffs(pub Mutex<Vec<CallQueue>>);

    impl ImmediateFlush for Handoffs {
        fn flush_queue_immediate(&self, queue: CallQueue) {
            self.0.lock().push(queue);
        }
    }
}
