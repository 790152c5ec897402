use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, MutexGuard, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::database::{collections, SharedStore, StoreError};

use super::KeyRecord;

/// Increments not yet written to a key record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingUsage {
    pub count: u64,
    pub last_used_at: DateTime<Utc>,
}

impl PendingUsage {
    fn merge(&mut self, other: PendingUsage) {
        self.count += other.count;
        self.last_used_at = self.last_used_at.max(other.last_used_at);
    }
}

/// Deferred usage bookkeeping for API keys.
///
/// Authorizations bump an in-memory counter and wake the worker; the worker folds
/// pending counts into the stored records. A failed write puts the counts back and the
/// worker retries them on its own timer, so every successful authorization is eventually
/// reflected even if no further request arrives.
#[derive(Clone)]
pub struct UsageTracker {
    inner: Arc<UsageInner>,
}

struct UsageInner {
    store: SharedStore,
    pending: Mutex<HashMap<String, PendingUsage>>,
    wake: Notify,
    flush_lock: tokio::sync::Mutex<()>,
    retry_every: Duration,
}

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

impl UsageTracker {
    pub fn new(store: SharedStore) -> Self {
        Self::with_retry_interval(store, DEFAULT_RETRY_INTERVAL)
    }

    pub fn with_retry_interval(store: SharedStore, retry_every: Duration) -> Self {
        Self {
            inner: Arc::new(UsageInner {
                store,
                pending: Mutex::new(HashMap::new()),
                wake: Notify::new(),
                flush_lock: tokio::sync::Mutex::new(()),
                retry_every,
            }),
        }
    }

    /// Never blocks on I/O
    pub fn record(&self, key_id: &str, at: DateTime<Utc>) {
        let usage = PendingUsage {
            count: 1,
            last_used_at: at,
        };
        self.inner
            .pending
            .lock()
            .entry(key_id.to_string())
            .and_modify(|p| p.merge(usage))
            .or_insert(usage);
        self.inner.wake.notify_one();
    }

    pub fn pending_for(&self, key_id: &str) -> Option<PendingUsage> {
        self.inner.pending.lock().get(key_id).copied()
    }

    fn has_pending(&self) -> bool {
        !self.inner.pending.lock().is_empty()
    }

    /// Blocks flushes until the guard is dropped. Stored counts read while holding it,
    /// plus `pending_for`, give the exact number of authorizations so far.
    pub async fn hold_writes(&self) -> MutexGuard<'_, ()> {
        self.inner.flush_lock.lock().await
    }

    /// Write all pending increments; returns how many keys were updated
    pub async fn flush(&self) -> usize {
        let _guard = self.inner.flush_lock.lock().await;
        let batch = std::mem::take(&mut *self.inner.pending.lock());
        let mut written = 0;

        for (key_id, usage) in batch {
            match self.apply(&key_id, usage).await {
                Ok(true) => written += 1,
                Ok(false) => debug!("Dropping usage for deleted key {}", key_id),
                Err(e) => {
                    warn!(key_id = %key_id, error = %e, "Failed to record key usage; will retry");
                    self.inner
                        .pending
                        .lock()
                        .entry(key_id)
                        .and_modify(|p| p.merge(usage))
                        .or_insert(usage);
                }
            }
        }

        written
    }

    async fn apply(&self, key_id: &str, usage: PendingUsage) -> Result<bool, StoreError> {
        let store = &self.inner.store;
        let Some(doc) = store.get(collections::API_KEYS, key_id).await? else {
            return Ok(false);
        };
        let record: KeyRecord = serde_json::from_value(doc)?;
        let last_used_at = record
            .last_used_at
            .map_or(usage.last_used_at, |prev| prev.max(usage.last_used_at));

        store
            .update(
                collections::API_KEYS,
                key_id,
                json!({
                    "usage_count": record.usage_count + usage.count,
                    "last_used_at": last_used_at,
                }),
            )
            .await?;
        Ok(true)
    }

    /// Background writer; retries leftover counts on a timer and drains once more
    /// when shutdown is signalled
    pub fn spawn_worker(&self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut retry = tokio::time::interval(tracker.inner.retry_every);
            retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
            retry.tick().await;

            loop {
                tokio::select! {
                    _ = tracker.inner.wake.notified() => {
                        tracker.flush().await;
                    }
                    _ = retry.tick(), if tracker.has_pending() => {
                        tracker.flush().await;
                    }
                    _ = shutdown.recv() => {
                        let written = tracker.flush().await;
                        debug!("Usage tracker stopped after final flush ({} keys)", written);
                        if tracker.has_pending() {
                            warn!(
                                keys = tracker.inner.pending.lock().len(),
                                "Usage counts could not be written before shutdown"
                            );
                        }
                        break;
                    }
                }
            }
        })
    }
}
