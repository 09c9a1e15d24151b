use crate::adapters::fault_injector::FaultInjector;
use crate::cli::Cli;
use crate::config::{Settings, DEFAULT_MAX_COUNT};
use crate::domain::entity::EntityRegistry;
use crate::domain::hook::Hook;
use crate::schema::SchemaExtractor;
use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Everything a request needs, built and swapped as one unit.
#[derive(Debug)]
pub struct ServingTable {
    pub generation: u64,
    pub registry: EntityRegistry,
    pub faults: Arc<FaultInjector>,
    pub hooks: Vec<Hook>,
    pub webhooks_enabled: bool,
    /// Rows seeded on first request when persistence is on.
    pub seed_count: usize,
    /// Upper bound on `count` per request.
    pub max_count: usize,
    /// Source patterns the table was built from, for the watcher.
    pub watch_patterns: Vec<String>,
    pub config_path: Option<PathBuf>,
}

impl ServingTable {
    pub fn empty(generation: u64) -> Self {
        Self {
            generation,
            registry: EntityRegistry::new(),
            faults: Arc::new(FaultInjector::default()),
            hooks: Vec::new(),
            webhooks_enabled: false,
            seed_count: 0,
            max_count: DEFAULT_MAX_COUNT,
            watch_patterns: Vec::new(),
            config_path: None,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.registry.iter().any(|entity| entity.table.is_some())
    }
}

/// Produces a complete serving table, or fails without side effects.
#[async_trait]
pub trait TableBuilder: Send + Sync {
    async fn build(&self, generation: u64) -> anyhow::Result<ServingTable>;
}

/// Re-reads the config file, then extracts entities from the configured sources.
pub struct SourceTableBuilder {
    cli: Cli,
}

impl SourceTableBuilder {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    pub fn from_settings(settings: Settings, generation: u64) -> anyhow::Result<ServingTable> {
        let patterns = settings.source_patterns();
        let registry = SchemaExtractor::new(settings.sources.recursion_limit)
            .extract_patterns(&patterns)
            .context("Failed to extract entities")?;
        let registry = if settings.database.enabled {
            registry.with_tables()
        } else {
            registry
        };

        let profile = settings
            .fault_profile()
            .context("Failed to resolve network profile")?;
        debug!("Resolved fault profile: {:?}", profile);

        Ok(ServingTable {
            generation,
            registry,
            faults: Arc::new(FaultInjector::new(profile)),
            hooks: settings.hooks(),
            webhooks_enabled: settings.webhook.enabled,
            seed_count: settings.database.seed_count,
            max_count: settings.server.max_count,
            watch_patterns: patterns,
            config_path: settings.config_path.clone(),
        })
    }
}

#[async_trait]
impl TableBuilder for SourceTableBuilder {
    async fn build(&self, generation: u64) -> anyhow::Result<ServingTable> {
        let cli = self.cli.clone();
        tokio::task::spawn_blocking(move || {
            let settings = Settings::new_with_cli(&cli)?;
            Self::from_settings(settings, generation)
        })
        .await
        .context("Table build task failed")?
    }
}
