mod common;

use axum::http::StatusCode;
use common::{get, Project, RecordingTransport, USER_TYPES};
use forgery::adapters::live_channel::LiveMessage;
use forgery::domain::events::EventName;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_stream::StreamExt;

const CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 0

[reload]
debounce_ms = 50
"#;

const ORDER_TYPES: &str = r#"
export interface Order {
    /** @faker number.int({ min: 1, max: 5 }) */
    quantity: number;
}
"#;

fn record(ctx: &forgery::AppContext, event: EventName) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _ = ctx
        .bus
        .subscribe(event, move |payload| sink.lock().unwrap().push(payload.clone()));
    seen
}

async fn wait_for_generation(ctx: &forgery::AppContext, generation: u64) -> bool {
    for _ in 0..100 {
        if ctx.coordinator.generation() >= generation {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_rebuild_picks_up_new_declarations() {
    let project = Project::with_types(CONFIG, USER_TYPES);
    let ctx = project.start(Arc::new(RecordingTransport::default()));
    let app = forgery::create_app(&ctx);
    let reloaded = record(&ctx, EventName::ServerReloaded);
    let (_, mut live) = ctx.live.connect();

    let (status, _) = get(&app, "/order").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    project.write_types("orders.ts", ORDER_TYPES);
    ctx.coordinator.request_rebuild().await;

    assert_eq!(ctx.coordinator.generation(), 2);
    let (status, body) = get(&app, "/order").await;
    assert_eq!(status, StatusCode::OK);
    let quantity = body["quantity"].as_i64().unwrap();
    assert!((1..=5).contains(&quantity));

    let (_, entities) = get(&app, "/__forgery/entities").await;
    assert_eq!(entities["generation"], 2);

    let reloaded = reloaded.lock().unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0]["entities"], serde_json::json!(["order", "status", "user"]));
    assert_eq!(live.next().await, Some(LiveMessage::Reload { generation: 2 }));
}

#[tokio::test]
async fn test_broken_source_keeps_serving_previous_table() {
    let project = Project::with_types(CONFIG, USER_TYPES);
    let ctx = project.start(Arc::new(RecordingTransport::default()));
    let app = forgery::create_app(&ctx);
    let failed = record(&ctx, EventName::ReloadFailed);

    project.write_types("broken.ts", "export interface {");
    ctx.coordinator.request_rebuild().await;

    assert_eq!(ctx.coordinator.generation(), 1);
    let (status, _) = get(&app, "/user").await;
    assert_eq!(status, StatusCode::OK);

    let failed = failed.lock().unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0]["error"].as_str().unwrap().contains("broken.ts"));
}

#[tokio::test]
async fn test_config_change_applies_new_network_profile() {
    let project = Project::with_types(CONFIG, USER_TYPES);
    let ctx = project.start(Arc::new(RecordingTransport::default()));
    let app = forgery::create_app(&ctx);

    std::fs::write(
        project.config_path(),
        format!("{}\n[network]\npreset = \"offline\"\n", CONFIG),
    )
    .unwrap();
    ctx.coordinator.request_rebuild().await;

    let (status, _) = get(&app, "/user").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_watcher_triggers_rebuild() {
    let project = Project::with_types(CONFIG, USER_TYPES);
    let ctx = project.start(Arc::new(RecordingTransport::default()));
    let app = forgery::create_app(&ctx);
    ctx.coordinator.watch().unwrap();

    project.write_types("orders.ts", ORDER_TYPES);

    assert!(wait_for_generation(&ctx, 2).await, "no rebuild after a source change");
    let (status, _) = get(&app, "/order").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_shutdown_releases_hanging_requests_and_stops_rebuilds() {
    let config = format!("{}\n[network]\ntimeout_rate = 1.0\n", CONFIG);
    let project = Project::with_types(&config, USER_TYPES);
    let ctx = project.start(Arc::new(RecordingTransport::default()));
    let app = forgery::create_app(&ctx);
    let (_, mut live) = ctx.live.connect();

    let pending = {
        let app = app.clone();
        tokio::spawn(async move { get(&app, "/user").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pending.is_finished());

    ctx.lifecycle.shutdown();

    let (status, body) = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("request still hanging after shutdown")
        .unwrap();
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Server shutting down");
    assert_eq!(live.next().await, None);

    project.write_types("orders.ts", ORDER_TYPES);
    ctx.coordinator.request_rebuild().await;
    assert_eq!(ctx.coordinator.generation(), 1);
}
