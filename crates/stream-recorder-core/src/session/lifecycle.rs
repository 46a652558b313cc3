//! Set-once "recording has begun" signal.

use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

/// Signals that a session's writer has accepted its first frame.
///
/// Set at most once; any number of clones may wait on it. Waiters return as
/// soon as the event is set, or `false` once their timeout expires.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    tx: Arc<watch::Sender<bool>>,
}

impl LifecycleEvent {
    /// Creates an unset event.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Sets the event. Returns `true` only for the call that set it.
    pub fn set(&self) -> bool {
        self.tx.send_if_modified(|started| {
            if *started {
                false
            } else {
                *started = true;
                true
            }
        })
    }

    /// Whether the event has been set.
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Waits up to `timeout` for the event. Returns whether it is set.
    ///
    /// An already-set event returns `true` even with a zero timeout.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        let set = tokio::time::timeout(timeout, async {
            rx.wait_for(|started| *started).await.is_ok()
        })
        .await;

        matches!(set, Ok(true))
    }
}

impl Default for LifecycleEvent {
    fn default() -> Self {
        Self::new()
    }
}
