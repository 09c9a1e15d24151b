use crate::adapters::event_bus::EventBus;
use crate::adapters::fault_injector::FaultInjector;
use crate::adapters::metrics_handler::MetricsCollector;
use crate::adapters::reload::ReloadCoordinator;
use crate::adapters::table_store::TableHandle;
use crate::domain::entity::EntityDescriptor;
use crate::domain::events::EventName;
use crate::domain::fault::FaultKind;
use crate::engine::{inject_id, ForgeOptions, GenerationEngine, GenerationError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Metric label for requests naming no registered entity.
pub const UNKNOWN_ENTITY_LABEL: &str = "unknown";

/// Serves `GET /{entity}`: fault pipeline first, then generated data.
pub struct EntityHandler {
    coordinator: Arc<ReloadCoordinator>,
    engine: Arc<GenerationEngine>,
    bus: Arc<EventBus>,
    metrics: Arc<MetricsCollector>,
}

impl EntityHandler {
    pub fn new(
        coordinator: Arc<ReloadCoordinator>,
        engine: Arc<GenerationEngine>,
        bus: Arc<EventBus>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            coordinator,
            engine,
            bus,
            metrics,
        }
    }

    pub async fn serve(&self, entity: &str, query: &HashMap<String, String>) -> Response {
        let started = Instant::now();
        let table = self.coordinator.current();
        let faults = table.faults.clone();
        let descriptor = table.registry.get(entity);
        // Unregistered names share one label so arbitrary paths cannot grow the series.
        let label = descriptor
            .as_ref()
            .map_or(UNKNOWN_ENTITY_LABEL, |d| d.name.as_str())
            .to_string();

        if faults.is_offline() {
            return self.fault_response(entity, &label, FaultKind::Offline, &faults);
        }

        faults.wait().await;

        if faults.should_timeout() {
            debug!("Simulating a network hang for /{}", entity);
            self.metrics.faults_injected.with_label_values(&["timeout"]).inc();
            self.bus
                .publish(EventName::FaultInjected, &json!({ "entity": entity, "kind": "timeout" }));
            // Hang until the client gives up or the server stops.
            self.coordinator.shutdown_token().cancelled().await;
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "Server shutting down" })),
            )
                .into_response();
        }

        if faults.should_error() {
            return self.fault_response(entity, &label, FaultKind::Error, &faults);
        }

        let Some(descriptor) = descriptor else {
            self.count_request(&label, StatusCode::NOT_FOUND);
            return (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": format!("Unknown entity '{}'", entity),
                    "entities": table.registry.names().collect::<Vec<_>>(),
                })),
            )
                .into_response();
        };

        let count = parse_count(query);
        if let Some(n) = count.filter(|n| *n > 0 && *n as u64 > table.max_count as u64) {
            warn!("Rejected count {} for '{}', maximum is {}", n, descriptor.name, table.max_count);
            self.count_request(&label, StatusCode::BAD_REQUEST);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": format!("count {} exceeds the maximum of {}", n, table.max_count),
                    "max_count": table.max_count,
                })),
            )
                .into_response();
        }

        let result = match &descriptor.table {
            Some(rows) => self.serve_persisted(&descriptor, rows, count, table.seed_count).await,
            None => {
                let options = ForgeOptions {
                    count,
                    id_strategy: descriptor.id_strategy,
                };
                self.engine.forge(&descriptor.schema, options).await
            }
        };

        let response = match result {
            Ok(body) => {
                self.bus.publish(
                    EventName::DataGenerated,
                    &json!({
                        "entity": descriptor.name,
                        "count": count,
                        "persisted": descriptor.table.is_some(),
                    }),
                );
                self.count_request(&label, StatusCode::OK);
                (StatusCode::OK, Json(body)).into_response()
            }
            Err(e) => {
                error!("Generation failed for '{}': {}", descriptor.name, e);
                self.count_request(&label, StatusCode::INTERNAL_SERVER_ERROR);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": e.to_string(), "entity": descriptor.name })),
                )
                    .into_response()
            }
        };

        self.metrics
            .request_duration
            .with_label_values(&[&label])
            .observe(started.elapsed().as_secs_f64());
        response
    }

    /// Same count semantics as [`GenerationEngine::forge`], read from the
    /// entity's stored rows. The table grows on demand and is seeded with
    /// `seed_count` rows on first use.
    async fn serve_persisted(
        &self,
        descriptor: &EntityDescriptor,
        rows: &TableHandle,
        count: Option<i64>,
        seed_count: usize,
    ) -> Result<Value, GenerationError> {
        let wanted = match count {
            Some(n) if n < 0 => return Ok(Value::Array(Vec::new())),
            Some(n) if n > 0 => n as usize,
            _ => 1,
        };

        let engine = &self.engine;
        let schema = &descriptor.schema;
        let strategy = descriptor.id_strategy;
        rows.ensure(wanted.max(seed_count), |missing, start| async move {
            debug!("Seeding {} rows for '{}'", missing, descriptor.name);
            let values = engine.generate_many(schema, missing).await?;
            Ok::<_, GenerationError>(
                values
                    .into_iter()
                    .enumerate()
                    .map(|(i, value)| inject_id(value, strategy, start + i + 1))
                    .collect(),
            )
        })
        .await?;

        match count {
            Some(n) if n > 0 => Ok(Value::Array(rows.take(wanted).await)),
            _ => Ok(rows.first().await.unwrap_or(Value::Null)),
        }
    }

    fn fault_response(&self, entity: &str, label: &str, kind: FaultKind, faults: &FaultInjector) -> Response {
        let fault = faults.resolve_fault_response(kind);
        warn!("Injected {} fault on /{}: {} {}", kind.as_str(), entity, fault.status, fault.message);

        self.metrics.faults_injected.with_label_values(&[kind.as_str()]).inc();
        self.bus.publish(
            EventName::FaultInjected,
            &json!({ "entity": entity, "kind": kind.as_str(), "status": fault.status }),
        );

        let status = StatusCode::from_u16(fault.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.count_request(label, status);
        (status, Json(json!({ "error": fault.message }))).into_response()
    }

    fn count_request(&self, label: &str, status: StatusCode) {
        self.metrics
            .requests_total
            .with_label_values(&[label, status.as_str()])
            .inc();
    }
}

/// `count` query parameter; anything that is not an integer counts as absent.
pub fn parse_count(query: &HashMap<String, String>) -> Option<i64> {
    query.get("count").and_then(|raw| raw.trim().parse::<i64>().ok())
}
