use super::event_bus::EventBus;
use super::webhook::{DeliveryError, HookDelivery, HookTransport, WebhookDispatcher, HOOK_HEADER};
use crate::domain::events::EventName;
use crate::domain::hook::{Hook, HookTransform, TransformSpec};
use crate::lifecycle::Lifecycle;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct RecordingTransport {
    tx: mpsc::UnboundedSender<HookDelivery>,
}

#[async_trait]
impl HookTransport for RecordingTransport {
    async fn deliver(&self, delivery: &HookDelivery) -> Result<u16, DeliveryError> {
        let _ = self.tx.send(delivery.clone());
        Ok(200)
    }
}

/// Never completes; holds a marker so tests can see when the future is dropped.
struct HangingTransport {
    marker: Arc<()>,
}

#[async_trait]
impl HookTransport for HangingTransport {
    async fn deliver(&self, _delivery: &HookDelivery) -> Result<u16, DeliveryError> {
        let _held = self.marker.clone();
        std::future::pending::<()>().await;
        Ok(200)
    }
}

fn recording(enabled: bool) -> (Arc<EventBus>, Arc<WebhookDispatcher>, mpsc::UnboundedReceiver<HookDelivery>) {
    let bus = EventBus::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = WebhookDispatcher::new(bus.clone(), Arc::new(RecordingTransport { tx }), enabled);
    (bus, dispatcher, rx)
}

async fn next_delivery(rx: &mut mpsc::UnboundedReceiver<HookDelivery>) -> HookDelivery {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("delivery timed out")
        .expect("transport dropped")
}

fn audit_hook() -> Hook {
    Hook::new("audit", "data:generated", "http://localhost:9/hooks")
}

#[tokio::test]
async fn test_activate_returns_false_when_disabled_or_empty() {
    let (bus, disabled, _rx) = recording(false);
    assert!(!disabled.activate(&[audit_hook()]));
    assert_eq!(bus.handler_count(EventName::DataGenerated), 0);

    let (_, enabled, _rx) = recording(true);
    assert!(!enabled.activate(&[]));
}

#[tokio::test]
async fn test_invalid_and_disabled_hooks_are_skipped() {
    let (bus, dispatcher, _rx) = recording(true);
    let hooks = vec![
        audit_hook().with_method("PUT"),
        Hook::new("relative", "data:generated", "/hooks"),
        Hook::new("unknown", "server:exploded", "http://localhost/hooks"),
        audit_hook().disabled(),
    ];
    assert!(!dispatcher.activate(&hooks));
    assert!(dispatcher.active_hooks().is_empty());
    assert_eq!(bus.handler_count(EventName::DataGenerated), 0);
}

#[tokio::test]
async fn test_reactivation_keeps_one_subscription_per_name() {
    let (bus, dispatcher, mut rx) = recording(true);
    let hooks = vec![audit_hook()];

    assert!(dispatcher.activate(&hooks));
    assert!(dispatcher.activate(&hooks));
    assert!(dispatcher.activate(&hooks));
    assert_eq!(bus.handler_count(EventName::DataGenerated), 1);

    bus.publish(EventName::DataGenerated, &json!({ "entity": "user" }));
    next_delivery(&mut rx).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_hooks_ignore_other_events() {
    let (bus, dispatcher, mut rx) = recording(true);
    assert!(dispatcher.activate(&[audit_hook()]));
    assert_eq!(bus.handler_count(EventName::ServerReloaded), 0);

    bus.publish(EventName::ServerReloaded, &json!({ "generation": 2 }));
    bus.publish(EventName::FaultInjected, &json!({ "entity": "user", "kind": "error" }));
    bus.publish(EventName::ServerStarted, &json!({ "address": "127.0.0.1:3000" }));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    bus.publish(EventName::DataGenerated, &json!({ "entity": "user" }));
    assert_eq!(next_delivery(&mut rx).await.event, EventName::DataGenerated);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_duplicate_names_first_wins() {
    let (bus, dispatcher, mut rx) = recording(true);
    let hooks = vec![
        Hook::new("dup", "data:generated", "http://first.test/hook"),
        Hook::new("dup", "data:generated", "http://second.test/hook"),
    ];
    assert!(dispatcher.activate(&hooks));
    assert_eq!(dispatcher.active_hooks(), vec!["dup".to_string()]);

    bus.publish(EventName::DataGenerated, &json!({}));
    assert_eq!(next_delivery(&mut rx).await.url, "http://first.test/hook");
}

#[tokio::test]
async fn test_delivery_headers_and_body() {
    let (bus, dispatcher, mut rx) = recording(true);
    let hook = audit_hook().with_header("Authorization", "Bearer token");
    assert!(dispatcher.activate(&[hook]));

    bus.publish(EventName::DataGenerated, &json!({ "entity": "user", "count": 2 }));
    let delivery = next_delivery(&mut rx).await;

    assert_eq!(delivery.event, EventName::DataGenerated);
    assert_eq!(delivery.header("content-type"), Some("application/json"));
    assert_eq!(delivery.header(HOOK_HEADER), Some("name=audit,event=data:generated"));
    assert_eq!(delivery.header("Authorization"), Some("Bearer token"));
    assert_eq!(delivery.body, json!({ "entity": "user", "count": 2 }));
}

#[tokio::test]
async fn test_transform_is_applied() {
    let (bus, dispatcher, mut rx) = recording(true);
    let transform = HookTransform::declarative(TransformSpec {
        pick: Some(vec!["entity".to_string()]),
        wrap: Some("data".to_string()),
        ..Default::default()
    });
    assert!(dispatcher.activate(&[audit_hook().with_transform(transform)]));

    bus.publish(EventName::DataGenerated, &json!({ "entity": "user", "count": 2 }));
    assert_eq!(next_delivery(&mut rx).await.body, json!({ "data": { "entity": "user" } }));
}

#[tokio::test]
async fn test_failing_transform_sends_original_payload() {
    let (bus, dispatcher, mut rx) = recording(true);
    let failing = HookTransform::new(|_| Err(anyhow::anyhow!("nope")));
    let panicking = HookTransform::new(|_| panic!("transform blew up"));
    assert!(dispatcher.activate(&[
        Hook::new("failing", "server:reloaded", "http://a.test/").with_transform(failing),
        Hook::new("panicking", "server:reloaded", "http://b.test/").with_transform(panicking),
    ]));

    let payload = json!({ "generation": 4 });
    bus.publish(EventName::ServerReloaded, &payload);
    let first = next_delivery(&mut rx).await;
    let second = next_delivery(&mut rx).await;
    assert_eq!(first.body, payload);
    assert_eq!(second.body, payload);
}

#[tokio::test]
async fn test_deactivate_aborts_in_flight_delivery() {
    let bus = EventBus::new();
    let marker = Arc::new(());
    let transport = Arc::new(HangingTransport { marker: marker.clone() });
    let dispatcher = WebhookDispatcher::new(bus.clone(), transport, true);
    assert!(dispatcher.activate(&[audit_hook()]));

    bus.publish(EventName::DataGenerated, &json!({}));
    tokio::time::timeout(Duration::from_secs(2), async {
        while Arc::strong_count(&marker) < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("delivery never started");

    dispatcher.deactivate();
    assert!(dispatcher.active_hooks().is_empty());
    assert_eq!(bus.handler_count(EventName::DataGenerated), 0);

    tokio::time::timeout(Duration::from_secs(2), async {
        while Arc::strong_count(&marker) > 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("delivery was not aborted");
}

#[tokio::test]
async fn test_shutdown_deactivates() {
    let lifecycle = Lifecycle::new();
    let bus = EventBus::with_lifecycle(&lifecycle);
    let (tx, _rx) = mpsc::unbounded_channel();
    let dispatcher = WebhookDispatcher::with_lifecycle(
        bus.clone(),
        Arc::new(RecordingTransport { tx }),
        true,
        &lifecycle,
    );
    assert!(dispatcher.activate(&[audit_hook()]));

    lifecycle.shutdown();
    assert!(dispatcher.active_hooks().is_empty());
}
