use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::trace;

/// Per-user wake registry for long-polling clients.
///
/// A wake carries no payload: whoever is parked for a user re-reads the event
/// log afterwards. Wakes are not queued, so a waiter must arm its handle (see
/// [`Broker::handle`]) before checking state or use the bounded retry in
/// [`crate::longpoll`].
#[derive(Clone, Default)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

#[derive(Default)]
struct BrokerInner {
    /// user_id -> wait handle; created on first use, kept for the process lifetime
    handles: Mutex<HashMap<i64, Arc<Notify>>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait handle for `user_id`, created on demand.
    ///
    /// The table lock is only held for the lookup, never while waiting.
    pub fn handle(&self, user_id: i64) -> Arc<Notify> {
        let mut handles = self
            .inner
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        handles.entry(user_id).or_default().clone()
    }

    /// Release every caller currently parked on `user_id`. Never blocks.
    pub fn wake(&self, user_id: i64) {
        trace!("waking user {}", user_id);
        self.handle(user_id).notify_waiters();
    }

    /// Wake each user in `user_ids`.
    pub fn wake_all(&self, user_ids: &[i64]) {
        for &uid in user_ids {
            self.wake(uid);
        }
    }

    /// Park until `wake(user_id)` or `timeout`, whichever comes first.
    ///
    /// Does not say which one happened. Dropping the returned future abandons
    /// the wait.
    pub async fn await_wake(&self, user_id: i64, timeout: Duration) {
        let handle = self.handle(user_id);
        let _ = tokio::time::timeout(timeout, handle.notified()).await;
    }
}
