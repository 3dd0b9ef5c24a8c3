//! Per-path debounce timers

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::trace;

/// Coalesces bursts of signals per path into a single notification
///
/// Each `trigger` arms (or re-arms) a cancelable timer for the path; only
/// when the quiet window elapses without another trigger is the path sent
/// to the receiver returned by [`Debouncer::new`]. Five events for the
/// same path inside one window therefore produce exactly one output.
pub struct Debouncer {
    window: Duration,
    timers: Arc<Mutex<HashMap<PathBuf, JoinHandle<()>>>>,
    tx: mpsc::Sender<PathBuf>,
}

impl Debouncer {
    /// Create a debouncer with the given quiet window
    ///
    /// Returns the debouncer and the receiver on which settled paths arrive.
    pub fn new(window: Duration) -> (Self, mpsc::Receiver<PathBuf>) {
        let (tx, rx) = mpsc::channel(256);
        (
            Self {
                window,
                timers: Arc::new(Mutex::new(HashMap::new())),
                tx,
            },
            rx,
        )
    }

    /// Arm or re-arm the timer for a path
    pub async fn trigger(&self, path: PathBuf) {
        let mut timers = self.timers.lock().await;

        if let Some(previous) = timers.remove(&path) {
            previous.abort();
            trace!(path = %path.display(), "Debounce timer re-armed");
        }

        let window = self.window;
        let tx = self.tx.clone();
        let timers_ref = Arc::clone(&self.timers);
        let timer_path = path.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            timers_ref.lock().await.remove(&timer_path);
            let _ = tx.send(timer_path).await;
        });

        timers.insert(path, handle);
    }

    /// Number of paths with an armed timer
    pub async fn pending(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Abort every armed timer without emitting anything
    pub async fn cancel_all(&self) {
        let mut timers = self.timers.lock().await;
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_coalesces_to_one_event() {
        let (debouncer, mut rx) = Debouncer::new(Duration::from_millis(60));
        let path = PathBuf::from("/tmp/file.rs");

        // 5 events inside the window.
        for _ in 0..5 {
            debouncer.trigger(path.clone()).await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let settled = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("debounce window should settle")
            .unwrap();
        assert_eq!(settled, path);

        // No second emission for the same burst.
        let extra = tokio::time::timeout(Duration::from_millis(120), rx.recv()).await;
        assert!(extra.is_err());
    }

    #[tokio::test]
    async fn test_distinct_paths_do_not_interfere() {
        let (debouncer, mut rx) = Debouncer::new(Duration::from_millis(30));
        debouncer.trigger(PathBuf::from("/a")).await;
        debouncer.trigger(PathBuf::from("/b")).await;

        let mut settled = Vec::new();
        for _ in 0..2 {
            let path = tokio::time::timeout(Duration::from_millis(200), rx.recv())
                .await
                .expect("both paths should settle")
                .unwrap();
            settled.push(path);
        }
        settled.sort();
        assert_eq!(settled, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[tokio::test]
    async fn test_cancel_all_suppresses_output() {
        let (debouncer, mut rx) = Debouncer::new(Duration::from_millis(30));
        debouncer.trigger(PathBuf::from("/a")).await;
        debouncer.cancel_all().await;

        assert_eq!(debouncer.pending().await, 0);
        let result = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_pending_drains_after_settle() {
        let (debouncer, mut rx) = Debouncer::new(Duration::from_millis(20));
        debouncer.trigger(PathBuf::from("/a")).await;
        assert_eq!(debouncer.pending().await, 1);

        let _ = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert_eq!(debouncer.pending().await, 0);
    }
}
