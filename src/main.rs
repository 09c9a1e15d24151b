use clap::Parser;
use forgery::adapters::table_builder::SourceTableBuilder;
use forgery::adapters::webhook::ReqwestTransport;
use forgery::cli::Cli;
use forgery::config::Settings;
use forgery::domain::events::EventName;
use forgery::AppContext;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration with CLI overrides
    let settings = Settings::new_with_cli(&cli)?;
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let reload = settings.reload.clone();
    let webhook_timeout = Duration::from_secs(settings.webhook.timeout_secs);

    info!("Starting Forgery mock server on {}:{}", host, port);

    // Initial extraction failures are fatal; later ones keep the last table.
    let initial = SourceTableBuilder::from_settings(settings, 1)?;
    info!(
        "Extracted {} entities: {}",
        initial.registry.len(),
        initial.registry.names().collect::<Vec<_>>().join(", ")
    );

    let ctx = AppContext::start(
        initial,
        Arc::new(SourceTableBuilder::new(cli)),
        Arc::new(ReqwestTransport::new(webhook_timeout)),
        &reload,
    )?;

    if reload.enabled {
        ctx.coordinator.watch()?;
        info!("Watching sources for changes");
    } else {
        info!("Live reload disabled");
    }

    let app = forgery::create_app(&ctx);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    let current = ctx.coordinator.current();
    ctx.bus.publish(
        EventName::ServerStarted,
        &json!({
            "address": addr.to_string(),
            "generation": current.generation,
            "entities": current.registry.names().collect::<Vec<_>>(),
        }),
    );
    drop(current);

    let lifecycle_ctx = Arc::new(ctx);
    let shutdown_ctx = lifecycle_ctx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_ctx.lifecycle.shutdown();
        })
        .await?;

    info!("Server stopped");
    drop(lifecycle_ctx);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                return std::future::pending::<()>().await;
            }
        };
        let mut quit = match signal(SignalKind::quit()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to listen for SIGQUIT: {}", e);
                return std::future::pending::<()>().await;
            }
        };
        tokio::select! {
            _ = term.recv() => {},
            _ = quit.recv() => {},
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received termination signal"),
    }
}
