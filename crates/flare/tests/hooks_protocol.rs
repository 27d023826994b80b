use flare::{
    Action, Args, CallOptions, Client, ColumnChange, Condition, Delegate, Engine, Execute,
    HookConfig, HookRegistry, MemoryEngine, OrmError, Output, Query, Record, Request, SharedEngine,
    Value, record,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

type Seen = Arc<Mutex<Vec<ColumnChange>>>;

fn setup(rows: Vec<Record>) -> (Arc<MemoryEngine>, Arc<HookRegistry>, Client) {
    let engine = Arc::new(MemoryEngine::new().with_model("user").with_model("audit"));
    engine.seed("user", rows);
    let hooks = Arc::new(HookRegistry::new());
    let client = Client::new(engine.clone()).with_hooks(hooks.clone());
    (engine, hooks, client)
}

fn watch(hooks: &HookRegistry, model: &str, column: &str) -> Seen {
    let seen: Seen = Arc::default();
    let sink = seen.clone();
    hooks.after_change(model, column, move |change: ColumnChange, _engine: SharedEngine| {
        let sink = sink.clone();
        Box::pin(async move {
            sink.lock().unwrap().push(change);
            Ok(())
        })
    });
    seen
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn pending_users(n: i64) -> Vec<Record> {
    (1..=n)
        .map(|id| record! { "id" => id, "name" => format!("user-{id}"), "status" => "pending" })
        .collect()
}

#[tokio::test]
async fn column_hook_fires_once_per_change() {
    let (_engine, hooks, client) = setup(pending_users(1));
    let seen = watch(&hooks, "user", "status");

    let updated = client
        .model("user")
        .with_id(1)
        .unwrap()
        .update(record! { "status" => "active" })
        .await
        .unwrap();
    assert_eq!(updated["status"], Value::from("active"));
    client.settle().await;

    let changes = seen.lock().unwrap().clone();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].model, "user");
    assert_eq!(changes[0].column, "status");
    assert_eq!(changes[0].old, Value::from("pending"));
    assert_eq!(changes[0].new, Value::from("active"));
    assert_eq!(changes[0].record["name"], Value::from("user-1"));
}

#[tokio::test]
async fn unchanged_values_do_not_fire() {
    let (_engine, hooks, client) = setup(pending_users(1));
    let status = watch(&hooks, "user", "status");
    let deleted = watch(&hooks, "user", "deleted_at");

    client
        .model("user")
        .with_id(1)
        .unwrap()
        .update(record! { "status" => "pending", "deleted_at" => Value::Null })
        .await
        .unwrap();
    client.settle().await;

    assert!(status.lock().unwrap().is_empty());
    assert!(deleted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn update_many_fires_per_record_even_when_the_filter_field_changes() {
    let (_engine, hooks, client) = setup(pending_users(3));
    let seen = watch(&hooks, "user", "status");

    let n = client
        .model("user")
        .where_(Condition::eq("status", "pending"))
        .update_many(record! { "status" => "active" })
        .await
        .unwrap();
    assert_eq!(n, 3);
    client.settle().await;

    let mut ids: Vec<i64> = seen
        .lock()
        .unwrap()
        .iter()
        .filter_map(|change| change.record["id"].as_i64())
        .collect();
    ids.sort();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(seen.lock().unwrap().iter().all(|c| c.new == Value::from("active")));
}

#[tokio::test]
async fn max_refetch_bounds_change_detection() {
    for (max_refetch, expected) in [(2, 0), (10, 3)] {
        let (engine, hooks, client) = setup(pending_users(3));
        hooks.configure(HookConfig::new().with_max_refetch(max_refetch).with_warn_on_skip(false));
        let seen = watch(&hooks, "user", "status");

        client
            .model("user")
            .where_(Condition::eq("status", "pending"))
            .update_many(record! { "status" => "active" })
            .await
            .unwrap();
        client.settle().await;

        assert_eq!(seen.lock().unwrap().len(), expected, "max_refetch = {max_refetch}");
        assert!(engine.rows("user").iter().all(|row| row["status"] == Value::from("active")));
    }
}

/// Collects `(level, target)` of every event emitted while installed.
#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<(Level, String)>>>);

impl EventLog {
    fn count(&self, level: Level, target: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, t)| *l == level && t == target)
            .count()
    }
}

impl<S: Subscriber> Layer<S> for EventLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        self.0.lock().unwrap().push((*meta.level(), meta.target().to_string()));
    }
}

#[tokio::test]
async fn exceeding_max_refetch_warns_when_configured() {
    for (warn_on_skip, expected) in [(true, 1), (false, 0)] {
        let log = EventLog::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(log.clone()));

        let (_engine, hooks, client) = setup(pending_users(3));
        hooks.configure(
            HookConfig::new()
                .with_max_refetch(2)
                .with_warn_on_skip(warn_on_skip),
        );
        let seen = watch(&hooks, "user", "status");

        client
            .model("user")
            .where_(Condition::eq("status", "pending"))
            .update_many(record! { "status" => "active" })
            .await
            .unwrap();
        client.settle().await;

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(
            log.count(Level::WARN, "flare.hooks"),
            expected,
            "warn_on_skip = {warn_on_skip}"
        );
    }
}

#[tokio::test]
async fn skip_flag_suppresses_only_column_hooks() {
    let (engine, hooks, client) = setup(pending_users(2));
    let seen = watch(&hooks, "user", "status");
    let after = counter();
    let calls = after.clone();
    hooks.after("user", Action::UpdateMany, move |_args: Args, _output: Output, _engine: SharedEngine| {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    });

    client
        .model("user")
        .where_(Condition::eq("status", "pending"))
        .skip_column_hooks()
        .update_many(record! { "status" => "active" })
        .await
        .unwrap();
    client.settle().await;

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(after.load(Ordering::SeqCst), 1);
    // No snapshot fetch either.
    assert_eq!(engine.call_count(Action::FindMany), 0);

    // The flag applies to that call only.
    client
        .model("user")
        .with_id(1)
        .unwrap()
        .update(record! { "status" => "archived" })
        .await
        .unwrap();
    client.settle().await;
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn disabled_column_hooks_skip_the_snapshot() {
    let (engine, hooks, client) = setup(pending_users(2));
    let seen = watch(&hooks, "user", "status");
    hooks.update_config(|config| config.enable_column_hooks = false);

    client
        .model("user")
        .where_(Condition::eq("status", "pending"))
        .update_many(record! { "status" => "active" })
        .await
        .unwrap();
    client.settle().await;

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(engine.call_count(Action::FindMany), 0);
}

#[tokio::test]
async fn failed_snapshot_fetch_skips_column_hooks_only() {
    let (engine, hooks, client) = setup(pending_users(1));
    let seen = watch(&hooks, "user", "status");
    engine.fail_on(Action::FindMany);

    let updated = client
        .model("user")
        .with_id(1)
        .unwrap()
        .update(record! { "status" => "active" })
        .await
        .unwrap();
    client.settle().await;

    assert_eq!(updated["status"], Value::from("active"));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn before_hook_abort_prevents_the_write() {
    let (engine, hooks, client) = setup(pending_users(1));
    hooks.before_update("user", |_args: Args, _engine: SharedEngine| {
        Box::pin(async { Err(OrmError::aborted("users are read-only")) })
    });

    let err = client
        .model("user")
        .with_id(1)
        .unwrap()
        .update(record! { "status" => "active" })
        .await
        .unwrap_err();

    assert!(err.is_aborted());
    assert_eq!(engine.call_count(Action::Update), 0);
    assert_eq!(engine.rows("user")[0]["status"], Value::from("pending"));
}

#[tokio::test]
async fn before_hooks_run_in_order_and_rewrite_args() {
    let (engine, hooks, client) = setup(Vec::new());
    hooks.before_create("user", |mut args: Args, _engine: SharedEngine| {
        Box::pin(async move {
            if let Some(data) = args.data_one_mut() {
                data.insert("status".into(), Value::from("pending"));
            }
            Ok(args)
        })
    });
    hooks.before_create("user", |mut args: Args, _engine: SharedEngine| {
        Box::pin(async move {
            if let Some(data) = args.data_one_mut() {
                let status = data.get("status").cloned().unwrap_or_default();
                data.insert("status".into(), Value::from(format!("{}-checked", status.as_str().unwrap_or(""))));
            }
            Ok(args)
        })
    });

    let created = client.model("user").create(record! { "name" => "ann" }).await.unwrap();
    assert_eq!(created["status"], Value::from("pending-checked"));
    assert_eq!(engine.rows("user").len(), 1);
}

#[tokio::test]
async fn after_hook_errors_are_swallowed() {
    let (_engine, hooks, client) = setup(Vec::new());
    let ran = counter();
    let calls = ran.clone();
    hooks.after_create("user", |_args: Args, _output: Output, _engine: SharedEngine| {
        Box::pin(async { Err(OrmError::validation("after hook exploded")) })
    });
    hooks.after_create("user", move |_args: Args, output: Output, _engine: SharedEngine| {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            assert_eq!(output.affected(), 1);
            Ok(())
        })
    });

    let created = client.model("user").create(record! { "name" => "ann" }).await;
    client.settle().await;

    assert!(created.is_ok());
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn hooks_receive_the_base_engine() {
    let (engine, hooks, client) = setup(Vec::new());
    let audit_hooks = counter();
    let calls = audit_hooks.clone();
    hooks.after_create("audit", move |_args: Args, _output: Output, _engine: SharedEngine| {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    });
    hooks.after_create("user", |_args: Args, output: Output, engine: SharedEngine| {
        Box::pin(async move {
            let user = output.into_record()?.unwrap_or_default();
            let entry = record! { "event" => "user.created", "user_id" => user["id"].clone() };
            Delegate::new(engine.as_ref(), "audit")
                .create(Args::new().with_data(entry))
                .await?;
            Ok(())
        })
    });

    client.model("user").create(record! { "name" => "ann" }).await.unwrap();
    client.settle().await;

    let audit = engine.rows("audit");
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0]["user_id"], Value::from(1));
    assert_eq!(audit_hooks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn delegate_calls_are_intercepted() {
    let (_engine, hooks, client) = setup(pending_users(2));
    let seen = watch(&hooks, "user", "status");

    let args = Args::from_query(flare::QueryState::filtered(Some(Condition::eq("id", 2))))
        .with_data(record! { "status" => "active" });
    client.delegate("user").update(args).await.unwrap();
    client.settle().await;

    let changes = seen.lock().unwrap().clone();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].record["id"], Value::from(2));
}

#[tokio::test]
async fn per_call_options_are_not_forwarded() {
    let (engine, hooks, client) = setup(pending_users(1));
    let seen = watch(&hooks, "user", "status");

    let request = Request::new(
        "user",
        Action::Update,
        Args::from_query(flare::QueryState::filtered(Some(Condition::eq("id", 1))))
            .with_data(record! { "status" => "active" }),
    )
    .with_options(CallOptions::skip_column_hooks());
    client.execute(request).await.unwrap();
    client.settle().await;

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(engine.rows("user")[0]["status"], Value::from("active"));
}

#[tokio::test]
async fn raw_requests_pass_through() {
    let (engine, hooks, client) = setup(Vec::new());
    let before = counter();
    let calls = before.clone();
    hooks.before("user", Action::Raw, move |args: Args, _engine: SharedEngine| {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(args) })
    });

    let err = client.execute(Request::raw(Args::new())).await.unwrap_err();

    assert!(matches!(err, OrmError::Unsupported(_)));
    assert_eq!(engine.call_count(Action::Raw), 1);
    assert_eq!(before.load(Ordering::SeqCst), 0);
}
