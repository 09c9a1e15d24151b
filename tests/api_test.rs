mod common;

use axum::http::StatusCode;
use common::{get, get_text, Project, RecordingTransport, USER_TYPES};
use forgery::domain::events::EventName;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const BASIC: &str = r#"
[server]
host = "127.0.0.1"
port = 0
"#;

fn app_for(config: &str) -> (Project, forgery::AppContext, axum::Router) {
    let project = Project::with_types(config, USER_TYPES);
    let ctx = project.start(Arc::new(RecordingTransport::default()));
    let app = forgery::create_app(&ctx);
    (project, ctx, app)
}

#[tokio::test]
async fn test_single_object_has_declared_shape() {
    let (_project, _ctx, app) = app_for(BASIC);

    let (status, body) = get(&app, "/user").await;
    assert_eq!(status, StatusCode::OK);

    let object = body.as_object().unwrap();
    let keys: Vec<_> = object.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["id", "name", "email", "age", "active"]);
    assert_eq!(body["id"], 1);
    assert!(body["name"].as_str().is_some_and(|s| !s.is_empty()));
    assert!(body["email"].as_str().unwrap().contains('@'));
    assert!(body["age"].is_number());
    assert!(body["active"].is_boolean());
}

#[tokio::test]
async fn test_count_semantics() {
    let (_project, _ctx, app) = app_for(BASIC);

    let (_, body) = get(&app, "/user?count=3").await;
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 3);
    let ids: Vec<_> = items.iter().map(|item| item["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let (status, body) = get(&app, "/user?count=-2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));

    let (_, body) = get(&app, "/user?count=0").await;
    assert!(body.is_object());

    let (_, body) = get(&app, "/user?count=lots").await;
    assert!(body.is_object());
}

#[tokio::test]
async fn test_entity_lookup_ignores_case() {
    let (_project, _ctx, app) = app_for(BASIC);
    let (status, _) = get(&app, "/User").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_union_alias_yields_a_member() {
    let (_project, _ctx, app) = app_for(BASIC);
    for _ in 0..10 {
        let (_, body) = get(&app, "/status").await;
        let value = body.as_str().unwrap();
        assert!(value == "active" || value == "inactive", "unexpected {}", value);
    }
}

#[tokio::test]
async fn test_unknown_entity_lists_known_ones() {
    let (_project, _ctx, app) = app_for(BASIC);

    let (status, body) = get(&app, "/order").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("order"));
    assert_eq!(body["entities"], serde_json::json!(["status", "user"]));
}

#[tokio::test]
async fn test_offline_preset_rejects_every_route() {
    let config = format!("{}\n[network]\npreset = \"offline\"\n", BASIC);
    let (_project, _ctx, app) = app_for(&config);

    for uri in ["/user", "/nothing"] {
        let (status, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Network offline");
    }
}

#[tokio::test]
async fn test_error_rate_uses_configured_status_and_message() {
    let config = format!(
        "{}\n[network]\nerror_rate = 1.0\nerror_status_codes = [502]\n\n[network.error_messages]\n\"502\" = \"Bad gateway\"\n",
        BASIC
    );
    let (_project, _ctx, app) = app_for(&config);

    let (status, body) = get(&app, "/user").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Bad gateway");
}

#[tokio::test]
async fn test_fixed_delay_is_applied() {
    let config = format!("{}\n[network]\ndelay = 80\n", BASIC);
    let (_project, _ctx, app) = app_for(&config);

    let started = Instant::now();
    let (status, _) = get(&app, "/user").await;
    assert_eq!(status, StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_millis(80));
}

#[tokio::test]
async fn test_persisted_tables_are_stable_and_grow() {
    let config = format!("{}\n[database]\nenabled = true\nseed_count = 5\n", BASIC);
    let (_project, _ctx, app) = app_for(&config);

    let (_, first) = get(&app, "/user?count=3").await;
    let (_, second) = get(&app, "/user?count=3").await;
    assert_eq!(first, second);

    let (_, single) = get(&app, "/user").await;
    assert_eq!(single, first[0]);

    let (_, grown) = get(&app, "/user?count=8").await;
    let grown = grown.as_array().unwrap();
    assert_eq!(grown.len(), 8);
    assert_eq!(&grown[..3], first.as_array().unwrap().as_slice());
    let ids: Vec<_> = grown.iter().map(|row| row["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, (1..=8).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_data_generated_event_is_published() {
    let (_project, ctx, app) = app_for(BASIC);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _subscription = ctx
        .bus
        .subscribe(EventName::DataGenerated, move |payload| sink.lock().unwrap().push(payload.clone()));

    get(&app, "/user?count=2").await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["entity"], "user");
    assert_eq!(seen[0]["count"], 2);
    assert_eq!(seen[0]["persisted"], false);
}

#[tokio::test]
async fn test_entities_endpoint() {
    let (_project, _ctx, app) = app_for(BASIC);

    let (status, body) = get(&app, "/__forgery/entities").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["generation"], 1);

    let entities = body["entities"].as_array().unwrap();
    assert_eq!(entities.len(), 2);
    let user = entities.iter().find(|e| e["name"] == "user").unwrap();
    assert_eq!(user["kind"], "object");
    assert_eq!(user["id_strategy"], "sequential");
    assert_eq!(user["persisted"], false);
    assert!(user["source"].as_str().unwrap().ends_with("models.ts"));
}

#[tokio::test]
async fn test_health_endpoints() {
    let (_project, _ctx, app) = app_for(BASIC);

    let (status, body) = get(&app, "/__forgery/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["entities"], 2);
    assert_eq!(body["checks"]["generation"], 1);
    assert_eq!(body["checks"]["rebuilding"], false);
    assert_eq!(body["checks"]["persistent"], false);

    let (status, _) = get(&app, "/__forgery/health/ready").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&app, "/__forgery/health/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");
}

#[tokio::test]
async fn test_not_ready_without_entities() {
    let project = Project::new(BASIC);
    let ctx = project.start(Arc::new(RecordingTransport::default()));
    let app = forgery::create_app(&ctx);

    let (status, body) = get(&app, "/__forgery/health/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "not_ready");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (_project, _ctx, app) = app_for(BASIC);
    get(&app, "/user").await;
    get(&app, "/missing").await;

    let (status, text) = get_text(&app, "/__forgery/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("forgery_requests_total"));
    assert!(text.contains(r#"entity="user",status="200""#));
    assert!(text.contains(r#"entity="unknown",status="404""#));
    assert!(!text.contains(r#"entity="missing""#));
}

#[tokio::test]
async fn test_unknown_paths_share_one_metric_series() {
    let (_project, _ctx, app) = app_for(BASIC);
    for i in 0..50 {
        let (status, _) = get(&app, &format!("/random-{}", i)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
    get(&app, "/USER").await;

    let (_, text) = get_text(&app, "/__forgery/metrics").await;
    let series = text
        .lines()
        .filter(|line| line.starts_with("forgery_requests_total{"))
        .count();
    assert_eq!(series, 2);
    assert!(text.contains(r#"forgery_requests_total{entity="unknown",status="404"} 50"#));
    assert!(text.contains(r#"entity="user",status="200""#));
    assert!(!text.contains("random-"));
}

#[tokio::test]
async fn test_count_above_maximum_is_rejected() {
    let config = format!("{}max_count = 5\n", BASIC);
    let (_project, _ctx, app) = app_for(&config);

    let (status, body) = get(&app, "/user?count=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 5);

    let (status, body) = get(&app, "/user?count=6").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["max_count"], 5);
    assert!(body["error"].as_str().unwrap().contains("exceeds"));

    let (status, _) = get(&app, "/user?count=9223372036854775807").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_default_maximum_applies_to_persisted_tables() {
    let config = format!("{}\n[database]\nenabled = true\n", BASIC);
    let (_project, _ctx, app) = app_for(&config);

    let (status, body) = get(&app, "/user?count=1000000000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["max_count"], 1000);

    let (_, health) = get(&app, "/__forgery/health").await;
    assert_eq!(health["checks"]["persistent"], true);
}
