use anyhow::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use tracing::{debug, error, info, warn};

use crate::schema::watch_root;

/// Watches declaration sources and the config file.
///
/// `on_change` runs on the watcher thread for every relevant event; callers
/// debounce on their side.
pub struct SourceWatcher {
    _watcher: RecommendedWatcher,
    roots: Vec<PathBuf>,
}

impl SourceWatcher {
    pub fn new<F>(patterns: &[String], config_file: Option<&Path>, on_change: F) -> Result<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (tx, rx) = channel();
        let mut watcher = RecommendedWatcher::new(tx, Config::default())?;

        let mut roots = Vec::new();
        let mut matchers = Vec::new();
        for pattern in patterns {
            let root = watch_root(pattern);
            let Ok(canonical_root) = root.canonicalize() else {
                warn!("Source root does not exist, skipping: {}", root.display());
                continue;
            };
            let rest = Path::new(pattern).strip_prefix(&root).unwrap_or(Path::new(pattern));
            match glob::Pattern::new(&canonical_root.join(rest).to_string_lossy()) {
                Ok(matcher) => matchers.push(matcher),
                Err(e) => warn!("Cannot watch pattern '{}': {}", pattern, e),
            }
            if !roots.contains(&canonical_root) {
                watcher.watch(&canonical_root, RecursiveMode::Recursive)?;
                info!("Watching sources under {}", canonical_root.display());
                roots.push(canonical_root);
            }
        }

        let config_file = match config_file.map(Path::canonicalize) {
            Some(Ok(path)) => {
                // Editors save by renaming over the file, which drops a watch on
                // the file itself. Watch the directory and filter by path instead.
                if let Some(dir) = path.parent() {
                    if !roots.iter().any(|root| dir.starts_with(root)) {
                        watcher.watch(dir, RecursiveMode::NonRecursive)?;
                    }
                }
                info!("Watching configuration file: {}", path.display());
                Some(path)
            }
            Some(Err(_)) => {
                warn!("Configuration file does not exist, not watching it");
                None
            }
            None => None,
        };

        std::thread::spawn(move || loop {
            match rx.recv() {
                Ok(Ok(event)) => {
                    if is_relevant(&event, &matchers, config_file.as_deref()) {
                        debug!("Change detected: {:?}", event.paths);
                        on_change();
                    }
                }
                Ok(Err(e)) => error!("Watch error: {:?}", e),
                Err(_) => {
                    debug!("Watcher dropped, stopping event thread");
                    break;
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            roots,
        })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

fn is_relevant(event: &Event, matchers: &[glob::Pattern], config_file: Option<&Path>) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event.paths.iter().any(|path| {
        config_file == Some(path.as_path()) || matchers.iter().any(|m| m.matches_path(path))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_relevance_filter() {
        let matchers = vec![glob::Pattern::new("/srv/types/**/*.ts").unwrap()];
        let config = Path::new("/srv/forgery.toml");

        assert!(is_relevant(
            &event(EventKind::Create(CreateKind::File), "/srv/types/user.ts"),
            &matchers,
            Some(config)
        ));
        assert!(is_relevant(
            &event(EventKind::Create(CreateKind::File), "/srv/forgery.toml"),
            &matchers,
            Some(config)
        ));
        assert!(!is_relevant(
            &event(EventKind::Create(CreateKind::File), "/srv/types/notes.md"),
            &matchers,
            Some(config)
        ));
        assert!(!is_relevant(
            &event(EventKind::Access(AccessKind::Any), "/srv/types/user.ts"),
            &matchers,
            Some(config)
        ));
    }

    #[test]
    fn test_reports_source_changes() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/**/*.ts", dir.path().display());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        let watcher = SourceWatcher::new(&[pattern], None, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(watcher.roots().len(), 1);

        std::fs::write(dir.path().join("user.ts"), "interface User { id: string }").unwrap();
        for _ in 0..100 {
            if hits.load(Ordering::SeqCst) > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(hits.load(Ordering::SeqCst) > 0);
    }

    fn wait_past(hits: &AtomicUsize, seen: usize) -> bool {
        for _ in 0..100 {
            if hits.load(Ordering::SeqCst) > seen {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        false
    }

    #[test]
    fn test_config_survives_atomic_saves() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("forgery.toml");
        std::fs::write(&config, "[server]\nport = 3000\n").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        let _watcher = SourceWatcher::new(&[], Some(&config), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        for port in [3001, 3002] {
            let seen = hits.load(Ordering::SeqCst);
            let staged = dir.path().join(format!(".forgery.toml.{}", port));
            std::fs::write(&staged, format!("[server]\nport = {}\n", port)).unwrap();
            std::fs::rename(&staged, &config).unwrap();
            assert!(wait_past(&hits, seen), "save to port {} went unnoticed", port);
            // Let the rename settle before the next save.
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    #[test]
    fn test_missing_roots_are_skipped() {
        let watcher = SourceWatcher::new(&["/definitely/not/here/*.ts".to_string()], None, || {}).unwrap();
        assert!(watcher.roots().is_empty());
    }
}
