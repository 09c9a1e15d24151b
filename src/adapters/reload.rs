use crate::adapters::event_bus::EventBus;
use crate::adapters::live_channel::{LiveChannel, LiveMessage};
use crate::adapters::metrics_handler::MetricsCollector;
use crate::adapters::table_builder::{ServingTable, TableBuilder};
use crate::adapters::webhook::WebhookDispatcher;
use crate::config::watcher::SourceWatcher;
use crate::domain::events::EventName;
use crate::lifecycle::Lifecycle;
use arc_swap::ArcSwap;
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Two-flag guard that serialises rebuilds.
///
/// A request while a rebuild runs only marks `queued`; however many arrive,
/// exactly one follow-up rebuild runs once the current one ends.
#[derive(Debug, Default)]
pub struct RebuildGate {
    state: Mutex<GateState>,
}

#[derive(Debug, Default)]
struct GateState {
    running: bool,
    queued: bool,
}

impl RebuildGate {
    /// Claim the gate. Returns false (and queues a rerun) if already held.
    pub fn try_begin(&self) -> bool {
        let mut state = self.lock();
        if state.running {
            state.queued = true;
            false
        } else {
            state.running = true;
            true
        }
    }

    /// Release the gate, unless a rerun was queued: then the caller keeps
    /// the gate and must rebuild once more (returns true).
    pub fn finish(&self) -> bool {
        let mut state = self.lock();
        if state.queued {
            state.queued = false;
            true
        } else {
            state.running = false;
            false
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Collaborators the coordinator notifies after a rebuild.
pub struct ReloadServices {
    pub bus: Arc<EventBus>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub live: Arc<LiveChannel>,
    pub metrics: Option<Arc<MetricsCollector>>,
}

struct WatchState {
    _watcher: SourceWatcher,
    patterns: Vec<String>,
    config_file: Option<PathBuf>,
}

/// Owns the active [`ServingTable`] and replaces it when sources change.
pub struct ReloadCoordinator {
    table: ArcSwap<ServingTable>,
    builder: Arc<dyn TableBuilder>,
    services: ReloadServices,
    gate: RebuildGate,
    debounce: Duration,
    generation: AtomicU64,
    timer: Mutex<Option<JoinHandle<()>>>,
    watch: Mutex<Option<WatchState>>,
    cancel: CancellationToken,
}

impl ReloadCoordinator {
    /// Install `initial`, activate its hooks, and register teardown with
    /// `lifecycle`.
    pub fn new(
        initial: ServingTable,
        builder: Arc<dyn TableBuilder>,
        services: ReloadServices,
        debounce: Duration,
        lifecycle: &Lifecycle,
    ) -> Arc<Self> {
        let generation = initial.generation;
        let coordinator = Arc::new(Self {
            table: ArcSwap::from_pointee(initial),
            builder,
            services,
            gate: RebuildGate::default(),
            debounce,
            generation: AtomicU64::new(generation),
            timer: Mutex::new(None),
            watch: Mutex::new(None),
            cancel: lifecycle.token(),
        });
        coordinator.apply_hooks(&coordinator.current());

        let weak = Arc::downgrade(&coordinator);
        lifecycle.on_shutdown("reload coordinator", move || {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.teardown();
            }
        });
        coordinator
    }

    /// The table requests should be served from.
    pub fn current(&self) -> Arc<ServingTable> {
        self.table.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_rebuilding(&self) -> bool {
        self.gate.is_running()
    }

    /// Cancelled once the process starts shutting down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start watching the current table's sources and config file.
    pub fn watch(self: &Arc<Self>) -> anyhow::Result<()> {
        let table = self.current();
        self.start_watcher(table.watch_patterns.clone(), table.config_path.clone())
    }

    /// Schedule a rebuild after the debounce window; each call restarts it.
    pub fn trigger(self: &Arc<Self>) {
        if self.cancel.is_cancelled() {
            return;
        }

        let weak = Arc::downgrade(self);
        let debounce = self.debounce;
        let mut timer = self.lock_timer();
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            // Detached: aborting this timer must not cancel the rebuild.
            if let Some(coordinator) = weak.upgrade() {
                tokio::spawn(async move { coordinator.request_rebuild().await });
            }
        }));
    }

    /// Rebuild now, or queue one rerun if a rebuild is in progress.
    pub async fn request_rebuild(self: &Arc<Self>) {
        if !self.gate.try_begin() {
            debug!("Rebuild in progress, queued another");
            return;
        }
        loop {
            self.rebuild_once().await;
            if !self.gate.finish() {
                break;
            }
        }
    }

    async fn rebuild_once(self: &Arc<Self>) {
        if self.cancel.is_cancelled() {
            return;
        }

        let started = Instant::now();
        let generation = self.generation() + 1;
        let result = self.builder.build(generation).await;
        let elapsed = started.elapsed();

        if self.cancel.is_cancelled() {
            debug!("Shut down during rebuild, discarding result");
            return;
        }

        match result {
            Ok(table) => {
                let table = Arc::new(table);
                self.table.store(table.clone());
                self.generation.store(generation, Ordering::SeqCst);
                self.apply_hooks(&table);
                self.refresh_watcher(&table);
                self.record("success", elapsed);

                info!(
                    "Rebuilt serving table {} with {} entities in {} ms",
                    generation,
                    table.registry.len(),
                    elapsed.as_millis()
                );
                self.publish(
                    EventName::ServerReloaded,
                    json!({
                        "generation": generation,
                        "entities": table.registry.names().collect::<Vec<_>>(),
                        "elapsed_ms": elapsed.as_millis() as u64,
                    }),
                );
                self.services.live.broadcast(LiveMessage::Reload { generation });
            }
            Err(e) => {
                self.record("failure", elapsed);
                error!("Rebuild failed, keeping serving table {}: {:#}", self.generation(), e);
                self.publish(
                    EventName::ReloadFailed,
                    json!({ "generation": self.generation(), "error": format!("{:#}", e) }),
                );
            }
        }
    }

    /// Cancel pending work, stop watching and close live connections.
    pub fn teardown(&self) {
        self.cancel.cancel();
        if let Some(timer) = self.lock_timer().take() {
            timer.abort();
        }
        self.lock_watch().take();
        self.services.live.close_all();
        debug!("Reload coordinator torn down");
    }

    fn apply_hooks(&self, table: &ServingTable) {
        let dispatcher = &self.services.dispatcher;
        dispatcher.set_enabled(table.webhooks_enabled);
        dispatcher.activate(&table.hooks);
    }

    fn start_watcher(self: &Arc<Self>, patterns: Vec<String>, config_file: Option<PathBuf>) -> anyhow::Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let watcher = SourceWatcher::new(&patterns, config_file.as_deref(), move || {
            let _ = tx.send(());
        })?;

        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                match weak.upgrade() {
                    Some(coordinator) => coordinator.trigger(),
                    None => break,
                }
            }
        });

        *self.lock_watch() = Some(WatchState {
            _watcher: watcher,
            patterns,
            config_file,
        });
        Ok(())
    }

    /// Re-create the watcher when a rebuild changed what has to be watched.
    fn refresh_watcher(self: &Arc<Self>, table: &ServingTable) {
        let changed = match self.lock_watch().as_ref() {
            Some(state) => state.patterns != table.watch_patterns || state.config_file != table.config_path,
            None => return,
        };
        if !changed {
            return;
        }

        info!("Source patterns changed, restarting watcher");
        if let Err(e) = self.start_watcher(table.watch_patterns.clone(), table.config_path.clone()) {
            warn!("Failed to restart watcher, keeping the previous one: {}", e);
        }
    }

    fn publish(&self, event: EventName, payload: Value) {
        let bus = &self.services.bus;
        if std::panic::catch_unwind(AssertUnwindSafe(|| bus.publish(event, &payload))).is_err() {
            error!("A handler for {} panicked", event);
        }
    }

    fn record(&self, outcome: &str, elapsed: Duration) {
        if let Some(metrics) = &self.services.metrics {
            metrics.rebuilds_total.with_label_values(&[outcome]).inc();
            metrics
                .rebuild_duration
                .with_label_values(&[outcome])
                .observe(elapsed.as_secs_f64());
        }
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_watch(&self) -> MutexGuard<'_, Option<WatchState>> {
        self.watch.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
