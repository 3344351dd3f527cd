use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bridge_runtime::{
    Arg, Bridge, BridgeConfig, BridgeError, LocalModule, LocalModuleMap, ManualClock, Profiler,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::support::{config, init_logging, Faults, Handoffs};

fn alerts() -> Bridge {
    init_logging();
    Bridge::builder(config(json!([["Alerts", ["show"]]])))
        .build()
        .unwrap()
}

fn recorder() -> (Arc<Mutex<Vec<Vec<Value>>>>, Arg) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    (calls, Arg::callback(move |args| sink.lock().push(args)))
}

#[test]
fn show_with_callback_queues_id_zero() {
    let bridge = alerts();
    let (_, cb) = recorder();

    let show = bridge.handle("Alerts", "show").unwrap();
    show.invoke(&bridge, vec![json!("hi").into(), cb]).unwrap();

    let queue = bridge.flushed_queue().unwrap();
    assert_eq!(
        serde_json::to_value(&queue).unwrap(),
        json!([[0], [0], [["hi", 0]]])
    );
    assert!(bridge.is_callback_pending(0));
}

#[test]
fn reply_invokes_once_then_id_is_unknown() {
    let bridge = alerts();
    let (calls, cb) = recorder();
    let show = bridge.handle("Alerts", "show").unwrap();
    show.invoke(&bridge, vec![json!("hi").into(), cb]).unwrap();
    bridge.flushed_queue();

    bridge
        .invoke_callback_and_return_flushed_queue(0, vec![json!("ok")])
        .unwrap();
    let replay = bridge.invoke_callback_and_return_flushed_queue(0, vec![json!("ok")]);

    assert_eq!(*calls.lock(), vec![vec![json!("ok")]]);
    assert!(matches!(replay, Err(BridgeError::UnknownCallback { id: 0, .. })));
}

fn pushing(clock: Arc<ManualClock>, handoffs: Arc<Handoffs>) -> Bridge {
    Bridge::builder(config(json!([["Alerts", ["show"]]])))
        .config(BridgeConfig {
            flush_interval_ms: 5,
            ..BridgeConfig::default()
        })
        .clock(clock)
        .push_flush(handoffs)
        .build()
        .unwrap()
}

#[test]
fn calls_within_one_millisecond_share_a_handoff() {
    let clock = Arc::new(ManualClock::new());
    let handoffs = Arc::new(Handoffs::default());
    let bridge = pushing(clock.clone(), handoffs.clone());

    bridge.enqueue(0, 0, vec![json!("a")], None, None).unwrap();
    clock.advance(Duration::from_micros(900));
    bridge.enqueue(0, 0, vec![json!("b")], None, None).unwrap();

    assert!(handoffs.0.lock().is_empty());
    let queue = bridge.flushed_queue().unwrap();
    assert_eq!(queue.params(), &[vec![json!("a")], vec![json!("b")]]);
}

#[test]
fn push_at_the_interval_carries_everything_pending() {
    let clock = Arc::new(ManualClock::new());
    let handoffs = Arc::new(Handoffs::default());
    let bridge = pushing(clock.clone(), handoffs.clone());

    clock.set(Duration::from_micros(4_500));
    bridge.enqueue(0, 0, vec![json!("a")], None, None).unwrap();
    clock.set(Duration::from_millis(5));
    bridge.enqueue(0, 0, vec![json!("b")], None, None).unwrap();

    let pushed = handoffs.0.lock();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].params(), &[vec![json!("a")], vec![json!("b")]]);
    assert!(bridge.flushed_queue().is_none());
}

#[test]
fn throwing_continuation_leaves_the_bridge_usable() {
    init_logging();
    let faults = Arc::new(Faults::default());
    let bridge = Bridge::builder(config(json!([["Alerts", ["show"]]])))
        .reporter(faults.clone())
        .build()
        .unwrap();
    let show = bridge.handle("Alerts", "show").unwrap();

    show.invoke(
        &bridge,
        vec![json!("boom").into(), Arg::callback(|_| panic!("listener threw"))],
    )
    .unwrap();
    bridge.flushed_queue();

    let first = bridge.invoke_callback_and_return_flushed_queue(0, vec![]);
    assert!(matches!(first, Ok(None)));
    assert_eq!(faults.0.lock().len(), 1);

    let (calls, cb) = recorder();
    show.invoke(&bridge, vec![json!("after").into(), cb]).unwrap();
    let queue = bridge.flushed_queue().unwrap();
    assert_eq!(queue.params(), &[vec![json!("after"), json!(1)]]);
    bridge
        .invoke_callback_and_return_flushed_queue(1, vec![json!(true)])
        .unwrap();
    assert_eq!(calls.lock().len(), 1);
}

#[test]
fn paired_continuations_take_adjacent_ids() {
    let bridge = alerts();
    let show = bridge.handle("Alerts", "show").unwrap();
    let (_, fail) = recorder();
    let (succ_calls, succ) = recorder();

    show.invoke(&bridge, vec![json!("pair").into(), fail, succ]).unwrap();
    let queue = bridge.flushed_queue().unwrap();
    assert_eq!(queue.params()[0], vec![json!("pair"), json!(0), json!(1)]);

    bridge
        .invoke_callback_and_return_flushed_queue(1, vec![json!("yes")])
        .unwrap();
    assert_eq!(succ_calls.lock().len(), 1);
    assert!(!bridge.is_callback_pending(0));
    assert!(bridge
        .invoke_callback_and_return_flushed_queue(0, vec![])
        .is_err());
}

#[test]
fn failure_only_continuation_is_an_arity_error() {
    let bridge = alerts();
    let show = bridge.handle("Alerts", "show").unwrap();
    let err = show
        .call(
            &bridge,
            vec![json!("x")],
            Some(bridge_runtime::Callback::new(|_| {})),
            None,
        )
        .unwrap_err();

    assert!(matches!(err, BridgeError::InvalidCallbackArity));
    assert!(bridge.flushed_queue().is_none());
}

#[derive(Default)]
struct Spans {
    events: Mutex<Vec<String>>,
}

impl Profiler for Spans {
    fn begin_span(&self, label: fmt::Arguments<'_>) {
        self.events.lock().push(format!("begin {label}"));
    }

    fn end_span(&self) {
        self.events.lock().push("end".to_owned());
    }
}

struct Failing;

impl LocalModule for Failing {
    fn invoke(&self, method: &str, _args: Vec<Value>) -> anyhow::Result<()> {
        anyhow::bail!("{method} is not supported")
    }
}

#[test]
fn spans_close_around_failing_dispatch() {
    init_logging();
    let spans = Arc::new(Spans::default());
    let faults = Arc::new(Faults::default());
    let bridge = Bridge::builder(config(json!([])))
        .loader(Arc::new(LocalModuleMap::new().with("Screen", Arc::new(Failing))))
        .profiler(spans.clone())
        .reporter(faults.clone())
        .config(BridgeConfig {
            spy: true,
            ..BridgeConfig::default()
        })
        .build()
        .unwrap();

    assert!(bridge
        .call_function_return_flushed_queue("Screen", "lock", vec![json!(1)])
        .is_none());

    let events = spans.events.lock().clone();
    let begins = events.iter().filter(|e| e.starts_with("begin")).count();
    let ends = events.iter().filter(|e| *e == "end").count();
    assert_eq!(begins, ends);
    assert!(events.contains(&"begin Screen.lock()".to_owned()));
    assert_eq!(
        *faults.0.lock(),
        vec!["dispatch fault in call to Screen.lock: Screen.lock() failed: lock is not supported"
            .to_owned()]
    );
}
