//! # Forgery - schema-driven mock REST server
//!
//! Forgery reads TypeScript-style type declarations, turns every exported
//! entity into a `GET /{entity}` endpoint and answers with fake data shaped
//! like the declared type.
//!
//! ## Features
//!
//! - **Schema extraction**: interfaces, type aliases, unions, intersections and
//!   `@faker` / `@id` doc tags
//! - **Generation**: faker-backed values, `?count=` arrays, optional persisted tables
//! - **Network simulation**: delay, error, timeout and offline presets
//! - **Webhooks**: POST lifecycle events to configured URLs
//! - **Live reload**: debounced rebuilds on source or config changes, pushed over SSE
//! - **Metrics & health**: Prometheus text and readiness probes under `/__forgery`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clap::Parser;
//! use forgery::cli::Cli;
//! use forgery::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let cli = Cli::parse();
//!     let settings = Settings::new_with_cli(&cli)?;
//!     println!("Serving {:?}", settings.source_patterns());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Domain**: entities, schemas, faults, hooks and event names
//! - **Schema**: declaration lexer, parser and resolver
//! - **Engine**: value generation and the generator library
//! - **Adapters**: HTTP handlers, event bus, webhooks, reload, live channel
//! - **Config**: settings, validation and file watching

pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod lifecycle;
pub mod schema;

use crate::adapters::event_bus::EventBus;
use crate::adapters::health_handler::HealthHandler;
use crate::adapters::live_channel::LiveChannel;
use crate::adapters::metrics_handler::{MetricsCollector, MetricsHandler};
use crate::adapters::mock_handler::EntityHandler;
use crate::adapters::reload::{ReloadCoordinator, ReloadServices};
use crate::adapters::table_builder::{ServingTable, TableBuilder};
use crate::adapters::webhook::{HookTransport, WebhookDispatcher};
use crate::config::ReloadSettings;
use crate::engine::GenerationEngine;
use crate::lifecycle::Lifecycle;
use axum::{
    extract::{Path, Query},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Long-lived components shared by the router and the process.
pub struct AppContext {
    pub lifecycle: Lifecycle,
    pub bus: Arc<EventBus>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub live: Arc<LiveChannel>,
    pub metrics: Arc<MetricsCollector>,
    pub coordinator: Arc<ReloadCoordinator>,
    pub engine: Arc<GenerationEngine>,
}

impl AppContext {
    /// Wire every component around `initial` and start the live heartbeat.
    ///
    /// Must be called inside a Tokio runtime. Does not start file watching;
    /// call [`ReloadCoordinator::watch`] for that.
    pub fn start(
        initial: ServingTable,
        builder: Arc<dyn TableBuilder>,
        transport: Arc<dyn HookTransport>,
        reload: &ReloadSettings,
    ) -> anyhow::Result<Self> {
        let lifecycle = Lifecycle::new();
        let bus = EventBus::with_lifecycle(&lifecycle);
        let dispatcher =
            WebhookDispatcher::with_lifecycle(bus.clone(), transport, initial.webhooks_enabled, &lifecycle);

        let metrics = Arc::new(MetricsCollector::new()?);

        let live = Arc::new(LiveChannel::new().with_gauge(metrics.live_connections.clone()));
        let _ = live.start_heartbeat(Duration::from_secs(reload.heartbeat_secs));

        let coordinator = ReloadCoordinator::new(
            initial,
            builder,
            ReloadServices {
                bus: bus.clone(),
                dispatcher: dispatcher.clone(),
                live: live.clone(),
                metrics: Some(metrics.clone()),
            },
            Duration::from_millis(reload.debounce_ms),
            &lifecycle,
        );

        Ok(Self {
            lifecycle,
            bus,
            dispatcher,
            live,
            metrics,
            coordinator,
            engine: Arc::new(GenerationEngine::default()),
        })
    }
}

/// Creates the Axum application router with all endpoints configured.
///
/// Introspection routes live under `/__forgery`; every other single-segment
/// path is treated as an entity name.
pub fn create_app(ctx: &AppContext) -> Router {
    let entity_handler = Arc::new(EntityHandler::new(
        ctx.coordinator.clone(),
        ctx.engine.clone(),
        ctx.bus.clone(),
        ctx.metrics.clone(),
    ));
    let health_handler = Arc::new(HealthHandler::new(ctx.coordinator.clone()));
    let metrics_handler = Arc::new(MetricsHandler::new(ctx.metrics.clone()));

    let internal_router = Router::new()
        .route("/events", get({
            let live = ctx.live.clone();
            move || {
                let live = live.clone();
                async move { live.sse() }
            }
        }))
        .route("/entities", get({
            let coordinator = ctx.coordinator.clone();
            move || {
                let coordinator = coordinator.clone();
                async move {
                    let table = coordinator.current();
                    Json(json!({
                        "generation": table.generation,
                        "entities": table.registry.summaries(),
                    }))
                }
            }
        }))
        // Health check endpoints
        .route("/health", get({
            let handler = health_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.health().await }
            }
        }))
        .route("/health/ready", get({
            let handler = health_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.ready().await }
            }
        }))
        .route("/health/live", get({
            let handler = health_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.live().await }
            }
        }))
        // Metrics endpoint
        .route("/metrics", get({
            let handler = metrics_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.metrics().await }
            }
        }));

    Router::new()
        .nest("/__forgery", internal_router)
        .route("/:entity", get({
            let handler = entity_handler.clone();
            move |Path(entity): Path<String>, Query(query): Query<HashMap<String, String>>| {
                let h = handler.clone();
                async move { h.serve(&entity, &query).await }
            }
        }))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}
