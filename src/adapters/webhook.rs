use crate::adapters::event_bus::{EventBus, Subscription};
use crate::domain::events::EventName;
use crate::domain::hook::Hook;
use crate::lifecycle::Lifecycle;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const HOOK_HEADER: &str = "X-Forgery-Hook";

/// One outbound call, fully prepared.
#[derive(Debug, Clone, PartialEq)]
pub struct HookDelivery {
    pub hook: String,
    pub event: EventName,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl HookDelivery {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Endpoint responded with {status}: {body}")]
    Status { status: u16, body: String },
}

/// Sends a prepared delivery somewhere.
#[async_trait]
pub trait HookTransport: Send + Sync {
    /// Returns the response status on success.
    async fn deliver(&self, delivery: &HookDelivery) -> Result<u16, DeliveryError>;
}

/// HTTP transport backed by `reqwest`.
pub struct ReqwestTransport {
    http_client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build webhook client ({}), using defaults", e);
                Client::new()
            });
        Self { http_client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl HookTransport for ReqwestTransport {
    async fn deliver(&self, delivery: &HookDelivery) -> Result<u16, DeliveryError> {
        let payload = serde_json::to_string(&delivery.body)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let mut request = self.http_client.post(&delivery.url);
        for (key, value) in &delivery.headers {
            request = request.header(key, value);
        }

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(DeliveryError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

struct ActiveHook {
    subscription: Subscription,
    cancel: CancellationToken,
}

/// Turns lifecycle events into outbound HTTP calls.
///
/// Holds at most one live subscription per hook name. Every
/// [`activate`](Self::activate) first tears down the previous set, so
/// re-activating with the same list never duplicates deliveries.
pub struct WebhookDispatcher {
    bus: Arc<EventBus>,
    transport: Arc<dyn HookTransport>,
    enabled: AtomicBool,
    active: Mutex<HashMap<String, ActiveHook>>,
}

impl WebhookDispatcher {
    pub fn new(bus: Arc<EventBus>, transport: Arc<dyn HookTransport>, enabled: bool) -> Arc<Self> {
        Arc::new(Self {
            bus,
            transport,
            enabled: AtomicBool::new(enabled),
            active: Mutex::new(HashMap::new()),
        })
    }

    /// Like [`new`](Self::new), deactivating on shutdown.
    pub fn with_lifecycle(
        bus: Arc<EventBus>,
        transport: Arc<dyn HookTransport>,
        enabled: bool,
        lifecycle: &Lifecycle,
    ) -> Arc<Self> {
        let dispatcher = Self::new(bus, transport, enabled);
        let weak = Arc::downgrade(&dispatcher);
        lifecycle.on_shutdown("webhook dispatcher", move || {
            if let Some(dispatcher) = weak.upgrade() {
                dispatcher.deactivate();
            }
        });
        dispatcher
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Subscribe `hooks`, replacing whatever was active.
    ///
    /// Returns false when the feature is disabled, `hooks` is empty, or no
    /// hook survived validation.
    pub fn activate(&self, hooks: &[Hook]) -> bool {
        self.deactivate();

        if !self.is_enabled() {
            debug!("Webhooks disabled, not activating {} hooks", hooks.len());
            return false;
        }
        if hooks.is_empty() {
            return false;
        }

        let mut active = self.lock();
        for hook in hooks {
            if !hook.enabled {
                debug!("Hook '{}' is disabled, skipping", hook.name);
                continue;
            }
            let event = match hook.validate() {
                Ok(event) => event,
                Err(e) => {
                    warn!("Skipping hook '{}': {}", hook.name, e);
                    continue;
                }
            };
            if active.contains_key(&hook.name) {
                warn!("Duplicate hook name '{}', keeping the first definition", hook.name);
                continue;
            }

            let cancel = CancellationToken::new();
            let handler = self.handler(hook.clone(), event, cancel.clone());
            let subscription = self.bus.subscribe(event, handler);
            active.insert(hook.name.clone(), ActiveHook { subscription, cancel });
        }

        let count = active.len();
        if count > 0 {
            info!("Activated {} of {} webhooks", count, hooks.len());
        } else {
            warn!("No valid webhooks to activate");
        }
        count > 0
    }

    /// Dispose every subscription and abort in-flight deliveries.
    pub fn deactivate(&self) {
        let previous: Vec<(String, ActiveHook)> = self.lock().drain().collect();
        if previous.is_empty() {
            return;
        }
        for (name, hook) in previous {
            hook.cancel.cancel();
            hook.subscription.dispose();
            debug!("Deactivated hook '{}'", name);
        }
    }

    /// Names of the hooks currently subscribed, sorted.
    pub fn active_hooks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn handler(&self, hook: Hook, event: EventName, cancel: CancellationToken) -> impl Fn(&Value) + Send + Sync + 'static {
        let transport = self.transport.clone();
        move |payload: &Value| {
            let delivery = HookDelivery {
                hook: hook.name.clone(),
                event,
                url: hook.url.clone(),
                headers: delivery_headers(&hook, event),
                body: transformed_body(&hook, payload),
            };

            let Ok(runtime) = Handle::try_current() else {
                warn!("No async runtime available, dropping delivery for hook '{}'", hook.name);
                return;
            };

            let transport = transport.clone();
            let cancel = cancel.clone();
            runtime.spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Delivery for hook '{}' aborted", delivery.hook);
                    }
                    result = transport.deliver(&delivery) => match result {
                        Ok(status) => debug!("Hook '{}' delivered {} ({})", delivery.hook, delivery.event, status),
                        Err(e) => warn!("Hook '{}' delivery to {} failed: {}", delivery.hook, delivery.url, e),
                    }
                }
            });
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ActiveHook>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Apply the hook's transform, falling back to the original payload when it
/// fails or panics.
fn transformed_body(hook: &Hook, payload: &Value) -> Value {
    let Some(transform) = &hook.transform else {
        return payload.clone();
    };

    let input = payload.clone();
    match std::panic::catch_unwind(AssertUnwindSafe(|| transform.apply(input))) {
        Ok(Ok(body)) => body,
        Ok(Err(e)) => {
            warn!("Transform for hook '{}' failed, sending original payload: {}", hook.name, e);
            payload.clone()
        }
        Err(_) => {
            warn!("Transform for hook '{}' panicked, sending original payload", hook.name);
            payload.clone()
        }
    }
}

fn delivery_headers(hook: &Hook, event: EventName) -> Vec<(String, String)> {
    let mut headers = vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        (
            HOOK_HEADER.to_string(),
            format!("name={},event={}", hook.name, event),
        ),
    ];
    for (key, value) in &hook.headers {
        headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(key));
        headers.push((key.clone(), value.clone()));
    }
    headers
}
