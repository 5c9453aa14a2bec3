//! Poll-based expiry notifications for documents carrying a TTL field.

use crate::core::cache::Cache;
use crate::core::document::Document;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, warn};

/// Callback invoked with the id of an expired document and whatever the cache
/// held for it.
pub type ExpireListener = Arc<dyn Fn(&str, Option<&Document>) + Send + Sync>;

struct ExpiryState {
    cache: Arc<Cache<String, Document>>,
    pending: Mutex<Vec<String>>,
    listeners: RwLock<Vec<ExpireListener>>,
}

impl ExpiryState {
    async fn check_expire(&self) -> usize {
        let expired = std::mem::take(&mut *self.pending.lock().await);
        if expired.is_empty() {
            return 0;
        }

        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for id in &expired {
            let document = self.cache.get(id).await;
            for listener in &listeners {
                let notify = AssertUnwindSafe(|| (**listener)(id, document.as_ref()));
                if catch_unwind(notify).is_err() {
                    warn!(id = %id, "expire listener panicked");
                }
            }
            self.cache.remove(id).await;
            debug!(id = %id, "Document expired");
        }
        expired.len()
    }
}

/// Tracks documents that are about to expire and evicts them from the owning
/// model's cache on a fixed interval equal to the TTL.
///
/// Without a TTL no clock is started and nothing is ever evicted on its own;
/// [`ExpiryManager::check_expire`] can still be driven by hand.
pub struct ExpiryManager {
    ttl: Option<Duration>,
    state: Arc<ExpiryState>,
    clock: StdMutex<Option<JoinHandle<()>>>,
}

impl ExpiryManager {
    /// Creates the manager and, when `ttl_seconds` is set, starts its clock on
    /// the current Tokio runtime.
    pub fn new(cache: Arc<Cache<String, Document>>, ttl_seconds: Option<u64>) -> Self {
        let ttl = ttl_seconds.filter(|s| *s > 0).map(Duration::from_secs);
        let state = Arc::new(ExpiryState {
            cache,
            pending: Mutex::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
        });
        let clock = ttl.and_then(|period| start_clock(Arc::downgrade(&state), period));

        ExpiryManager {
            ttl,
            state,
            clock: StdMutex::new(clock),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Adds `id` to the pending set. Returns `false` if it was already pending.
    pub async fn register(&self, id: &str) -> bool {
        let mut pending = self.state.pending.lock().await;
        if pending.iter().any(|p| p == id) {
            return false;
        }
        pending.push(id.to_string());
        debug!(id = %id, "Registered for expiry");
        true
    }

    /// Removes `id` from the pending set. Returns `false` if it was not pending.
    pub async fn remove(&self, id: &str) -> bool {
        let mut pending = self.state.pending.lock().await;
        match pending.iter().position(|p| p == id) {
            Some(index) => {
                pending.remove(index);
                true
            }
            None => false,
        }
    }

    /// Moves `id` to the back of the pending set, registering it if needed.
    pub async fn refresh(&self, id: &str) {
        self.remove(id).await;
        self.register(id).await;
    }

    pub async fn is_pending(&self, id: &str) -> bool {
        self.state.pending.lock().await.iter().any(|p| p == id)
    }

    /// Pending ids in registration order.
    pub async fn pending(&self) -> Vec<String> {
        self.state.pending.lock().await.clone()
    }

    pub fn on_expire<F>(&self, listener: F)
    where
        F: Fn(&str, Option<&Document>) + Send + Sync + 'static,
    {
        self.state
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Runs one check cycle: every pending id is announced to the listeners,
    /// evicted from the cache and dropped from the pending set. Returns the
    /// number of expired ids.
    pub async fn check_expire(&self) -> usize {
        self.state.check_expire().await
    }

    pub fn is_running(&self) -> bool {
        self.clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the clock. Calling it again is a no-op.
    pub fn destroy(&self) {
        let handle = self
            .clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("Expiry clock stopped");
        }
    }
}

impl Drop for ExpiryManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn start_clock(state: Weak<ExpiryState>, period: Duration) -> Option<JoinHandle<()>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("No Tokio runtime available, expiry clock not started");
        return None;
    };

    Some(runtime.spawn(async move {
        let mut clock = interval_at(Instant::now() + period, period);
        clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            clock.tick().await;
            let Some(state) = state.upgrade() else {
                break;
            };
            let expired = state.check_expire().await;
            if expired > 0 {
                debug!(expired, "Expiry check evicted documents");
            }
        }
    }))
}
