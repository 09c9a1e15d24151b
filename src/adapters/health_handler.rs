use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::adapters::reload::ReloadCoordinator;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    pub generation: u64,
    pub entities: usize,
    pub rebuilding: bool,
    /// Whether entities keep their rows between requests.
    pub persistent: bool,
}

pub struct HealthHandler {
    coordinator: Arc<ReloadCoordinator>,
    start_time: std::time::Instant,
}

impl HealthHandler {
    pub fn new(coordinator: Arc<ReloadCoordinator>) -> Self {
        Self {
            coordinator,
            start_time: std::time::Instant::now(),
        }
    }

    /// Basic health check - returns 200 while the server is running
    pub async fn health(&self) -> impl IntoResponse {
        let table = self.coordinator.current();
        let status = HealthStatus {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            checks: HealthChecks {
                generation: table.generation,
                entities: table.registry.len(),
                rebuilding: self.coordinator.is_rebuilding(),
                persistent: table.is_persistent(),
            },
        };

        (StatusCode::OK, Json(status))
    }

    /// Readiness check - 200 once at least one entity is being served
    pub async fn ready(&self) -> impl IntoResponse {
        let table = self.coordinator.current();

        if table.registry.is_empty() {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "not_ready",
                    "message": "No entities extracted from the configured sources"
                })),
            )
        } else {
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": "ready",
                    "message": format!("Serving {} entities", table.registry.len())
                })),
            )
        }
    }

    /// Liveness check
    pub async fn live(&self) -> impl IntoResponse {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "alive",
                "message": "Server is alive"
            })),
        )
    }
}
