use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use bridge_runtime::{Arg, Bridge, LocalModule, Value};
use mock_host::{Alerts, ConfigForm, MockHost, Settings, Vibration};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Map};

use crate::support::init_logging;

/// Scripting-side app: confirms with an alert, then buzzes and remembers the
/// choice once the user answers.
#[derive(Default)]
struct App {
    bridge: Mutex<Option<Bridge>>,
    log: Mutex<Vec<String>>,
}

impl App {
    fn bridge(&self) -> Result<Bridge> {
        self.bridge
            .lock()
            .clone()
            .ok_or_else(|| anyhow!("app not attached"))
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn answered(&self, reply: Vec<Value>) -> Result<()> {
        let bridge = self.bridge()?;
        let button = reply.first().and_then(Value::as_u64).unwrap_or_default();
        self.log.lock().push(format!("answered {button}"));

        let vibrate = bridge
            .handle("Vibration", "vibrate")
            .ok_or_else(|| anyhow!("no Vibration.vibrate"))?;
        let set = bridge
            .handle("Settings", "setValues")
            .ok_or_else(|| anyhow!("no Settings.setValues"))?;
        vibrate.call(&bridge, vec![json!([button * 100])], None, None)?;
        set.call(&bridge, vec![json!({"lastButton": button})], None, None)?;
        Ok(())
    }
}

/// `AppRegistry` as seen by the host.
struct AppRegistry(Arc<App>);

impl LocalModule for AppRegistry {
    fn invoke(&self, method: &str, args: Vec<Value>) -> Result<()> {
        let bridge = self.0.bridge()?;
        let title = args.first().and_then(Value::as_str).unwrap_or("untitled");
        self.0.log.lock().push(format!("{method} {title}"));

        let show = bridge
            .handle("Alerts", "show")
            .ok_or_else(|| anyhow!("no Alerts.show"))?;
        let app = Arc::clone(&self.0);
        show.invoke(
            &bridge,
            vec![
                json!(format!("Open {title}?")).into(),
                Arg::Callback(bridge_runtime::Callback::fallible(move |reply| {
                    app.answered(reply)
                })),
            ],
        )?;
        Ok(())
    }
}

struct Fixture {
    host: MockHost,
    app: Arc<App>,
    alerts: Arc<Alerts>,
    vibration: Arc<Vibration>,
    settings: Arc<Settings>,
}

fn fixture(form: ConfigForm) -> Fixture {
    init_logging();
    let app = Arc::new(App::default());
    let alerts = Arc::new(Alerts::pressing(1));
    let vibration = Arc::new(Vibration::new());
    let settings = Arc::new(Settings::new(Map::new()));
    let host = MockHost::builder()
        .config_form(form)
        .module(alerts.clone())
        .module(vibration.clone())
        .module(settings.clone())
        .local_module(
            "AppRegistry",
            &["runApplication"],
            Arc::new(AppRegistry(app.clone())),
        )
        .build()
        .unwrap();
    *app.bridge.lock() = Some(host.bridge().clone());
    Fixture {
        host,
        app,
        alerts,
        vibration,
        settings,
    }
}

#[test]
fn host_call_chains_through_callbacks_in_one_pump() {
    for form in [ConfigForm::Array, ConfigForm::Legacy] {
        let mut fx = fixture(form);

        fx.host
            .call_script("AppRegistry", "runApplication", vec![json!("Inbox")]);
        let executed = fx.host.pump().unwrap();

        assert_eq!(executed, 3, "{form:?}");
        assert_eq!(fx.app.log(), vec!["runApplication Inbox", "answered 1"]);
        assert_eq!(fx.alerts.shown(), vec!["Open Inbox?".to_owned()]);
        assert_eq!(fx.vibration.patterns(), vec![json!([100])]);
        assert_eq!(fx.settings.value("lastButton"), Some(json!(1)));
        assert_eq!(fx.host.bridge().pending_callbacks(), 0);
        *fx.app.bridge.lock() = None;
    }
}

#[test]
fn promise_round_trip_through_the_host() {
    let mut fx = fixture(ConfigForm::Array);
    let bridge = fx.host.bridge().clone();
    let set = bridge.handle("Settings", "setValues").unwrap();
    let get = bridge.handle("Settings", "getValue").unwrap();

    set.call(&bridge, vec![json!({"volume": 3})], None, None)
        .unwrap();
    let mut pending = get.call_async(&bridge, vec![json!("volume")]).unwrap();
    assert!(pending.try_take().is_none());

    fx.host.pump().unwrap();
    assert_eq!(pending.try_take(), Some(Ok(json!(3))));
    assert_eq!(fx.settings.value("volume"), Some(json!(3)));
}

#[test]
fn awaited_promises_settle_in_one_turn_for_both_forms() {
    for form in [ConfigForm::Array, ConfigForm::Legacy] {
        let mut fx = fixture(form);
        let bridge = fx.host.bridge().clone();
        let set = bridge.handle("Settings", "setValues").unwrap();
        let get = bridge.handle("Settings", "getValue").unwrap();

        set.call(&bridge, vec![json!({"theme": "dark"})], None, None)
            .unwrap();
        let theme = get.call_async(&bridge, vec![json!("theme")]).unwrap();
        let missing = get.call_async(&bridge, vec![json!("font")]).unwrap();
        assert_eq!(fx.host.pump().unwrap(), 3);

        let (theme, missing) =
            futures::executor::block_on(futures::future::join(theme, missing));
        assert_eq!(theme, Ok(json!("dark")));
        let err = missing.unwrap_err();
        assert_eq!(err.message, "no value for font");
        assert_eq!(err.extra["key"], json!("font"));
        assert_eq!(bridge.pending_callbacks(), 0);
    }
}

#[test]
fn timeout_callback_can_issue_calls() {
    let mut fx = fixture(ConfigForm::Array);
    let bridge = fx.host.bridge().clone();

    let caller = bridge.clone();
    fx.host
        .timers()
        .set_timeout(&bridge, Duration::from_millis(16), move || {
            let vibrate = caller.handle("Vibration", "vibrate").unwrap();
            vibrate
                .call(&caller, vec![json!("late")], None, None)
                .unwrap();
        })
        .unwrap();
    fx.host.pump().unwrap();

    assert_eq!(fx.host.advance(Duration::from_millis(15)).unwrap(), 0);
    assert!(fx.vibration.patterns().is_empty());
    assert_eq!(fx.host.advance(Duration::from_millis(1)).unwrap(), 1);
    assert_eq!(fx.vibration.patterns(), vec![json!("late")]);
}

#[test]
fn immediates_scheduled_by_a_callback_flush_in_the_same_turn() {
    let mut fx = fixture(ConfigForm::Array);
    let bridge = fx.host.bridge().clone();
    let show = bridge.handle("Alerts", "show").unwrap();
    let cancel = bridge.handle("Vibration", "cancel").unwrap();

    let immediates = fx.host.immediates();
    let deferred = bridge.clone();
    show.invoke(
        &bridge,
        vec![
            json!("Later?").into(),
            Arg::callback(move |_| {
                immediates.schedule(move || {
                    cancel.call(&deferred, vec![], None, None)?;
                    Ok(())
                });
            }),
        ],
    )
    .unwrap();

    assert_eq!(fx.host.pump().unwrap(), 2);
    assert_eq!(fx.vibration.cancelled(), 1);
    assert!(fx.host.immediates().is_empty());
    assert_eq!(fx.host.stats().batches, 2);
}
