//! Notify-backed change notifier

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, trace, warn};

use crate::debounce::Debouncer;
use crate::fingerprint::fingerprint;
use crate::Result;

/// Directory and file patterns never worth watching
const DEFAULT_IGNORES: &[&str] = &[
    "**/.git/**",
    "**/target/**",
    "**/node_modules/**",
    "**/dist/**",
    "**/build/**",
    "**/.idea/**",
    "**/*.swp",
    "**/*.tmp",
];

/// Normalized kind of a change event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Path observed for the first time
    #[serde(rename = "add")]
    Added,
    /// Content fingerprint differs from the stored record
    #[serde(rename = "change")]
    Modified,
    /// Previously-observed path no longer exists
    #[serde(rename = "unlink")]
    Removed,
}

/// A debounced, fingerprint-verified change notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Absolute path of the affected file
    pub path: PathBuf,
    /// What happened to it
    pub kind: ChangeKind,
}

/// Last-known state of one watched path
#[derive(Debug, Clone)]
pub struct WatchedFileRecord {
    /// Absolute path
    pub path: PathBuf,
    /// Content fingerprint at last check
    pub fingerprint: String,
    /// Size in bytes at last check
    pub size: u64,
    /// Filesystem mtime at last check
    pub modified: SystemTime,
    /// When the record was last refreshed
    pub last_checked: SystemTime,
}

/// Change notifier configuration
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Workspace root to watch recursively
    pub root: PathBuf,
    /// Quiet window applied per path before an event is processed
    pub debounce_window: Duration,
    /// Ignore globs applied on top of the built-in set
    pub extra_ignores: Vec<String>,
}

impl WatchConfig {
    /// Config for a root with the default 100ms debounce window
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            debounce_window: Duration::from_millis(100),
            extra_ignores: Vec::new(),
        }
    }
}

/// Watches a workspace root and emits normalized change events
///
/// Raw filesystem events are debounced per path, then verified against a
/// stored fingerprint; events that do not change the fingerprint are
/// suppressed so editors that rewrite files in place do not generate
/// spurious invalidations downstream.
pub struct ChangeNotifier {
    config: WatchConfig,
    ignores: GlobSet,
    records: Arc<RwLock<HashMap<PathBuf, WatchedFileRecord>>>,
    events_tx: broadcast::Sender<ChangeEvent>,
    watcher: std::sync::Mutex<Option<RecommendedWatcher>>,
}

impl ChangeNotifier {
    /// Create a notifier for the configured root
    pub fn new(config: WatchConfig) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in DEFAULT_IGNORES {
            builder.add(Glob::new(pattern)?);
        }
        for pattern in &config.extra_ignores {
            builder.add(Glob::new(pattern)?);
        }

        let (events_tx, _) = broadcast::channel(256);
        Ok(Self {
            config,
            ignores: builder.build()?,
            records: Arc::new(RwLock::new(HashMap::new())),
            events_tx,
            watcher: std::sync::Mutex::new(None),
        })
    }

    /// Subscribe to normalized change events
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events_tx.subscribe()
    }

    /// Whether a path is excluded by the ignore set
    pub fn is_ignored(&self, path: &Path) -> bool {
        self.ignores.is_match(path)
    }

    /// Number of paths with a stored record
    pub async fn tracked_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Begin watching; raw events flow until the notifier is dropped
    pub fn start(self: Arc<Self>) -> Result<()> {
        let (raw_tx, mut raw_rx) = mpsc::channel::<PathBuf>(1024);

        let mut watcher = RecommendedWatcher::new(
            move |result: std::result::Result<notify::Event, notify::Error>| match result {
                Ok(event) => {
                    for path in event.paths {
                        let _ = raw_tx.blocking_send(path);
                    }
                }
                Err(error) => warn!(error = %error, "Filesystem watcher error"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(&self.config.root, RecursiveMode::Recursive)?;
        debug!(root = %self.config.root.display(), "Watching workspace root");

        *self.watcher.lock().expect("watcher mutex") = Some(watcher);

        let (debouncer, mut settled_rx) = Debouncer::new(self.config.debounce_window);

        // Raw events feed per-path timers; only settled paths are processed.
        let notifier = Arc::clone(&self);
        tokio::spawn(async move {
            while let Some(path) = raw_rx.recv().await {
                if notifier.is_ignored(&path) {
                    trace!(path = %path.display(), "Ignored filesystem event");
                    continue;
                }
                debouncer.trigger(path).await;
            }
        });

        let notifier = self;
        tokio::spawn(async move {
            while let Some(path) = settled_rx.recv().await {
                if let Some(event) = notifier.process_path(&path).await {
                    let _ = notifier.events_tx.send(event);
                }
            }
        });

        Ok(())
    }

    /// Compare a settled path against its stored record
    ///
    /// Returns `None` when the event should be suppressed: the fingerprint
    /// is unchanged, the path is a directory, or an unknown path vanished.
    pub async fn process_path(&self, path: &Path) -> Option<ChangeEvent> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => {
                // Gone from disk; only report it if we were tracking it.
                let removed = self.records.write().await.remove(path);
                return removed.map(|_| ChangeEvent {
                    path: path.to_path_buf(),
                    kind: ChangeKind::Removed,
                });
            }
        };

        if metadata.is_dir() {
            return None;
        }

        let print = match fingerprint(path) {
            Ok(print) => print,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "Failed to fingerprint file");
                return None;
            }
        };

        let mut records = self.records.write().await;
        let kind = match records.get(path) {
            Some(record) if record.fingerprint == print => {
                trace!(path = %path.display(), "Suppressed no-op change event");
                return None;
            }
            Some(_) => ChangeKind::Modified,
            None => ChangeKind::Added,
        };

        records.insert(
            path.to_path_buf(),
            WatchedFileRecord {
                path: path.to_path_buf(),
                fingerprint: print,
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                last_checked: SystemTime::now(),
            },
        );

        Some(ChangeEvent {
            path: path.to_path_buf(),
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier_for(dir: &Path) -> Arc<ChangeNotifier> {
        Arc::new(ChangeNotifier::new(WatchConfig::new(dir)).unwrap())
    }

    #[tokio::test]
    async fn test_first_observation_is_added() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = notifier_for(dir.path());
        let path = dir.path().join("a.rs");
        std::fs::write(&path, b"fn a() {}").unwrap();

        let event = notifier.process_path(&path).await.unwrap();
        assert_eq!(event.kind, ChangeKind::Added);
        assert_eq!(notifier.tracked_count().await, 1);
    }

    #[tokio::test]
    async fn test_unchanged_content_is_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = notifier_for(dir.path());
        let path = dir.path().join("a.rs");
        std::fs::write(&path, b"fn a() {}").unwrap();

        assert!(notifier.process_path(&path).await.is_some());
        // Touch with identical content: fingerprint unchanged.
        std::fs::write(&path, b"fn a() {}").unwrap();
        assert!(notifier.process_path(&path).await.is_none());
    }

    #[tokio::test]
    async fn test_content_change_is_modified() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = notifier_for(dir.path());
        let path = dir.path().join("a.rs");
        std::fs::write(&path, b"fn a() {}").unwrap();
        assert!(notifier.process_path(&path).await.is_some());

        std::fs::write(&path, b"fn a() { todo!() }").unwrap();
        let event = notifier.process_path(&path).await.unwrap();
        assert_eq!(event.kind, ChangeKind::Modified);
    }

    #[tokio::test]
    async fn test_tracked_deletion_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = notifier_for(dir.path());
        let path = dir.path().join("a.rs");
        std::fs::write(&path, b"fn a() {}").unwrap();
        assert!(notifier.process_path(&path).await.is_some());

        std::fs::remove_file(&path).unwrap();
        let event = notifier.process_path(&path).await.unwrap();
        assert_eq!(event.kind, ChangeKind::Removed);
        assert_eq!(notifier.tracked_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_deletion_is_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = notifier_for(dir.path());

        let event = notifier.process_path(&dir.path().join("never-seen.rs")).await;
        assert!(event.is_none());
    }

    #[tokio::test]
    async fn test_ignore_set_matches_build_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = notifier_for(dir.path());

        assert!(notifier.is_ignored(&dir.path().join("target/debug/app")));
        assert!(notifier.is_ignored(&dir.path().join(".git/HEAD")));
        assert!(notifier.is_ignored(&dir.path().join("node_modules/x/index.js")));
        assert!(!notifier.is_ignored(&dir.path().join("src/main.rs")));
    }

    #[tokio::test]
    async fn test_extra_ignores_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = WatchConfig::new(dir.path());
        config.extra_ignores.push("**/*.generated.rs".to_string());
        let notifier = Arc::new(ChangeNotifier::new(config).unwrap());

        assert!(notifier.is_ignored(&dir.path().join("src/schema.generated.rs")));
        assert!(!notifier.is_ignored(&dir.path().join("src/schema.rs")));
    }

    #[tokio::test]
    async fn test_watch_emits_single_event_for_burst() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = WatchConfig::new(dir.path());
        config.debounce_window = Duration::from_millis(80);
        let notifier = Arc::new(ChangeNotifier::new(config).unwrap());
        let mut events = notifier.subscribe();

        Arc::clone(&notifier).start().unwrap();
        // Give the backend a moment to register the watch.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let path = dir.path().join("burst.rs");
        for i in 0..5 {
            std::fs::write(&path, format!("fn v{i}() {{}}")).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let event = tokio::time::timeout(Duration::from_secs(3), events.recv())
            .await
            .expect("expected a change event")
            .unwrap();
        assert_eq!(event.path, path);
        assert_eq!(event.kind, ChangeKind::Added);

        // The burst must have been coalesced: no immediate second event.
        let extra = tokio::time::timeout(Duration::from_millis(300), events.recv()).await;
        assert!(extra.is_err());
    }
}
