use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bridge_runtime::{Bridge, CallQueue, Callback, CallbackId, ManualClock};
use bridge_wire::QueueColumns;
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::{json, Value};

use crate::support::{config, Handoffs};

#[derive(Clone, Debug)]
enum Op {
    /// Issue a call carrying this many continuations.
    Call(u8),
    Flush,
    /// Reply to one of the ids issued so far, chosen by index.
    Reply(usize),
    Advance(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..=2).prop_map(Op::Call),
        2 => Just(Op::Flush),
        3 => any::<usize>().prop_map(Op::Reply),
        1 => (0u64..8).prop_map(Op::Advance),
    ]
}

/// What the bridge should be doing, tracked independently of it.
#[derive(Default)]
struct Model {
    calls: Vec<Vec<CallbackId>>,
    issued: Vec<CallbackId>,
    pending: HashSet<CallbackId>,
    sibling: HashMap<CallbackId, CallbackId>,
    flushed_calls: usize,
}

fn continuation(call: usize, hits: &Arc<Mutex<HashMap<usize, usize>>>) -> Callback {
    let hits = Arc::clone(hits);
    Callback::new(move |_| *hits.lock().entry(call).or_default() += 1)
}

fn drain(bridge: &Bridge, handoffs: &Handoffs) -> Vec<CallQueue> {
    let mut queues = std::mem::take(&mut *handoffs.0.lock());
    queues.extend(bridge.flushed_queue());
    queues
}

fn check(queues: Vec<CallQueue>, model: &mut Model) -> Result<(), TestCaseError> {
    for queue in queues {
        let QueueColumns(modules, methods, params) = queue.into();
        prop_assert_eq!(modules.len(), methods.len());
        prop_assert_eq!(methods.len(), params.len());
        for call_params in params {
            let index = call_params[0].as_u64().unwrap() as usize;
            prop_assert_eq!(index, model.flushed_calls, "calls flushed out of order");
            let ids: Vec<CallbackId> = call_params[1..]
                .iter()
                .map(|id| id.as_u64().unwrap())
                .collect();
            prop_assert_eq!(&ids, &model.calls[index]);
            model.flushed_calls += 1;
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn random_traffic_keeps_queue_and_table_consistent(
        ops in prop::collection::vec(op(), 1..64),
    ) {
        let clock = Arc::new(ManualClock::new());
        let handoffs = Arc::new(Handoffs::default());
        let bridge = Bridge::builder(config(json!([["Alerts", ["show"]]])))
            .clock(clock.clone())
            .push_flush(handoffs.clone())
            .build()
            .unwrap();
        let hits = Arc::new(Mutex::new(HashMap::new()));
        let mut model = Model::default();

        for op in ops {
            match op {
                Op::Call(continuations) => {
                    let index = model.calls.len();
                    let start = bridge.next_callback_id();
                    let (on_fail, on_succ) = match continuations {
                        0 => (None, None),
                        1 => (None, Some(continuation(index, &hits))),
                        _ => (
                            Some(continuation(index, &hits)),
                            Some(continuation(index, &hits)),
                        ),
                    };
                    bridge
                        .enqueue(0, 0, vec![json!(index)], on_fail, on_succ)
                        .unwrap();

                    let ids: Vec<CallbackId> =
                        (start..start + u64::from(continuations)).collect();
                    if let Some(last) = model.issued.last() {
                        prop_assert!(ids.iter().all(|id| id > last), "ids must keep increasing");
                    }
                    if let [fail, succ] = ids[..] {
                        prop_assert_eq!(fail + 1, succ);
                        model.sibling.insert(fail, succ);
                        model.sibling.insert(succ, fail);
                    }
                    model.issued.extend(&ids);
                    model.pending.extend(&ids);
                    model.calls.push(ids);
                }
                Op::Flush => {
                    check(drain(&bridge, &handoffs), &mut model)?;
                    prop_assert!(bridge.flushed_queue().is_none());
                }
                Op::Reply(pick) => {
                    let id = if model.issued.is_empty() {
                        pick as CallbackId
                    } else {
                        model.issued[pick % model.issued.len()]
                    };
                    let was_pending = model.pending.contains(&id);
                    let result = bridge.invoke_callback_and_return_flushed_queue(id, vec![]);
                    prop_assert_eq!(result.is_ok(), was_pending);
                    if let Ok(queue) = result {
                        let mut queues = std::mem::take(&mut *handoffs.0.lock());
                        queues.extend(queue);
                        check(queues, &mut model)?;
                        model.pending.remove(&id);
                        if let Some(sibling) = model.sibling.get(&id) {
                            model.pending.remove(sibling);
                        }
                    }
                }
                Op::Advance(ms) => clock.advance(Duration::from_millis(ms)),
            }
            prop_assert_eq!(bridge.pending_callbacks(), model.pending.len());
        }

        check(drain(&bridge, &handoffs), &mut model)?;
        prop_assert_eq!(model.flushed_calls, model.calls.len());
        prop_assert!(hits.lock().values().all(|count| *count == 1));
    }
}

#[test]
fn empty_bridge_never_flushes() {
    let bridge = Bridge::builder(config(json!([["Alerts", ["show"]]])))
        .build()
        .unwrap();
    assert!(bridge.flushed_queue().is_none());
    assert!(bridge
        .call_function_return_flushed_queue("Nobody", "home", Vec::<Value>::new())
        .is_none());
}
