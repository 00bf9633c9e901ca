//! Session watchers.
//!
//! Two triggers can reveal that the Host Shell session changed: a storage
//! change on the token key (fires in other tabs / processes) and the window
//! regaining focus (covers the tab that performed the removal itself). Both
//! are adapters behind the same [`SessionWatcher::subscribe`] contract and
//! feed the same callback.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    /// The token key was written with a value.
    TokenSet,
    /// The token key was removed.
    TokenRemoved,
    /// Something may have changed unobserved; re-read the store.
    Recheck,
}

pub type SignalCallback = Arc<dyn Fn(SessionSignal) + Send + Sync>;

pub trait SessionWatcher: Send + Sync {
    /// Start delivering signals to `callback` until the handle is dropped.
    fn subscribe(&self, callback: SignalCallback) -> WatchHandle;
}

/// Keeps a watcher task alive; dropping it stops delivery.
pub struct WatchHandle {
    task: JoinHandle<()>,
}

impl WatchHandle {
    fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Storage-event adapter: translates token-key changes into signals.
pub struct StorageWatcher {
    session: Session,
}

impl StorageWatcher {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl SessionWatcher for StorageWatcher {
    fn subscribe(&self, callback: SignalCallback) -> WatchHandle {
        let mut rx = self.session.on_change();
        let token_key = self.session.token_key().to_string();

        WatchHandle::new(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) if change.key == token_key => {
                        let signal = if change.new_value.is_some() {
                            SessionSignal::TokenSet
                        } else {
                            SessionSignal::TokenRemoved
                        };
                        callback(signal);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!("Session watcher missed {} storage events, rechecking", missed);
                        callback(SessionSignal::Recheck);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }
}

/// Focus adapter. The runtime calls [`FocusWatcher::notify_focus`] whenever
/// the host window regains focus.
pub struct FocusWatcher {
    focus: broadcast::Sender<()>,
}

impl FocusWatcher {
    pub fn new() -> Self {
        let (focus, _) = broadcast::channel(16);
        Self { focus }
    }

    pub fn notify_focus(&self) {
        let _ = self.focus.send(());
    }
}

impl Default for FocusWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionWatcher for FocusWatcher {
    fn subscribe(&self, callback: SignalCallback) -> WatchHandle {
        let mut rx = self.focus.subscribe();

        WatchHandle::new(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    // Several focus events collapse into one recheck either way.
                    Ok(()) | Err(RecvError::Lagged(_)) => callback(SessionSignal::Recheck),
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::session::{MemorySessionStore, SessionCredential, UserProfile};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn channel_callback() -> (SignalCallback, mpsc::UnboundedReceiver<SessionSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: SignalCallback = Arc::new(move |signal| {
            let _ = tx.send(signal);
        });
        (callback, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<SessionSignal>) -> SessionSignal {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no signal delivered")
            .expect("watcher channel closed")
    }

    #[tokio::test]
    async fn test_storage_watcher_reports_token_changes_only() {
        let session = Session::new(Arc::new(MemorySessionStore::new()), StorageConfig::default());
        let watcher = StorageWatcher::new(session.clone());
        let (callback, mut rx) = channel_callback();
        let _handle = watcher.subscribe(callback);

        session
            .set(&SessionCredential {
                token: "abc".to_string(),
                user: UserProfile::new(1),
            })
            .unwrap();
        // The user key change is filtered out.
        assert_eq!(next(&mut rx).await, SessionSignal::TokenSet);

        session.clear().unwrap();
        assert_eq!(next(&mut rx).await, SessionSignal::TokenRemoved);
    }

    #[tokio::test]
    async fn test_focus_watcher_emits_recheck() {
        let watcher = FocusWatcher::new();
        let (callback, mut rx) = channel_callback();
        let _handle = watcher.subscribe(callback);

        watcher.notify_focus();
        assert_eq!(next(&mut rx).await, SessionSignal::Recheck);
    }

    #[tokio::test]
    async fn test_cancelled_handle_stops_delivery() {
        let watcher = FocusWatcher::new();
        let (callback, mut rx) = channel_callback();
        let handle = watcher.subscribe(callback);
        handle.cancel();

        watcher.notify_focus();
        let delivered = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        // Either nothing arrives or the channel closed with the aborted task.
        assert!(matches!(delivered, Err(_) | Ok(None)));
    }
}
