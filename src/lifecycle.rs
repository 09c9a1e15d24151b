//! Process-wide shutdown coordination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

type TeardownFn = Box<dyn FnOnce() + Send>;

/// Owns the root cancellation token and the ordered teardown list.
///
/// Components register their teardown when constructed; [`shutdown`]
/// runs the callbacks in registration order and then cancels the token.
///
/// [`shutdown`]: Lifecycle::shutdown
pub struct Lifecycle {
    token: CancellationToken,
    teardowns: Mutex<Vec<(&'static str, TeardownFn)>>,
    stopped: AtomicBool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            teardowns: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Child token cancelled when shutdown completes.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Register a teardown step. Steps registered after shutdown run at once.
    pub fn on_shutdown<F>(&self, name: &'static str, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_stopped() {
            debug!("Running late teardown for {}", name);
            f();
            return;
        }
        self.lock().push((name, Box::new(f)));
    }

    /// Run every teardown step exactly once. Later calls are no-ops.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let steps = std::mem::take(&mut *self.lock());
        info!("Shutting down ({} components)", steps.len());
        for (name, step) in steps {
            debug!("Tearing down {}", name);
            step();
        }
        self.token.cancel();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(&'static str, TeardownFn)>> {
        self.teardowns.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_runs_steps_in_order_once() {
        let lifecycle = Lifecycle::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["bus", "dispatcher", "coordinator"] {
            let order = order.clone();
            lifecycle.on_shutdown(name, move || order.lock().unwrap().push(name));
        }

        let token = lifecycle.token();
        lifecycle.shutdown();
        lifecycle.shutdown();

        assert_eq!(*order.lock().unwrap(), vec!["bus", "dispatcher", "coordinator"]);
        assert!(token.is_cancelled());
        assert!(lifecycle.is_stopped());
    }

    #[test]
    fn test_late_registration_runs_immediately() {
        let lifecycle = Lifecycle::new();
        lifecycle.shutdown();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        lifecycle.on_shutdown("late", move || flag.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
    }
}
