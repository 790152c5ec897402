use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::database::{collections, Query, SharedStore, SortDirection, StoreError};

use super::{Observation, TelemetryBuffer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushOutcome {
    pub flushed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FlushStats {
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub total_flushed: u64,
    pub failed_attempts: u64,
}

/// Writes drained buffer batches to the store and reads persisted observations back.
///
/// Flushes are single-flight. A failed write re-queues the batch at the front of the
/// buffer; observations carry stable ids, so a retried batch overwrites instead of duplicating.
/// While a write is outstanding the batch stays readable through [`unflushed`](Self::unflushed).
pub struct TelemetryPersister {
    buffer: Arc<TelemetryBuffer>,
    store: SharedStore,
    write_timeout: Duration,
    flush_lock: tokio::sync::Mutex<()>,
    /// Batch handed to the store and not yet acknowledged; locked before the buffer
    inflight: Mutex<Vec<Observation>>,
    stats: Mutex<FlushStats>,
}

impl TelemetryPersister {
    pub fn new(buffer: Arc<TelemetryBuffer>, store: SharedStore, write_timeout: Duration) -> Self {
        Self {
            buffer,
            store,
            write_timeout,
            flush_lock: tokio::sync::Mutex::new(()),
            inflight: Mutex::new(Vec::new()),
            stats: Mutex::new(FlushStats::default()),
        }
    }

    pub async fn flush(&self) -> Result<FlushOutcome, StoreError> {
        let _guard = self.flush_lock.lock().await;

        let (count, encoded) = {
            let mut inflight = self.inflight.lock();
            *inflight = self.buffer.drain();
            (inflight.len(), encode_batch(&inflight))
        };
        if count == 0 {
            return Ok(FlushOutcome::default());
        }

        let result = match encoded {
            Ok(docs) => tokio::time::timeout(self.write_timeout, self.store.put_many(collections::REQUESTS, docs))
                .await
                .unwrap_or(Err(StoreError::Timeout)),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.inflight.lock().clear();
                let mut stats = self.stats.lock();
                stats.last_success_at = Some(Utc::now());
                stats.last_error = None;
                stats.total_flushed += count as u64;
                debug!("Flushed {} observations", count);
                Ok(FlushOutcome { flushed: count })
            }
            Err(e) => {
                {
                    let mut inflight = self.inflight.lock();
                    self.buffer.requeue(std::mem::take(&mut *inflight));
                }
                let mut stats = self.stats.lock();
                stats.failed_attempts += 1;
                stats.last_error = Some(e.to_string());
                warn!(error = %e, requeued = count, "Analytics flush failed; batch returned to buffer");
                Err(e)
            }
        }
    }

    /// Everything recorded but not yet acknowledged by the store: the in-flight batch
    /// followed by the buffer, taken as one consistent snapshot
    pub fn unflushed(&self) -> Vec<Observation> {
        let inflight = self.inflight.lock();
        let mut all = inflight.clone();
        all.extend(self.buffer.pending());
        all
    }

    pub fn stats(&self) -> FlushStats {
        self.stats.lock().clone()
    }

    /// Persisted observations with `from <= timestamp < to`, oldest first
    pub async fn load_range(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Observation>, StoreError> {
        let mut query = Query::new()
            .gte("timestamp", from.timestamp_millis())
            .order_by("timestamp", SortDirection::Asc);
        if let Some(to) = to {
            query = query.lt("timestamp", to.timestamp_millis());
        }
        let docs = self.store.query(collections::REQUESTS, &query).await?;
        Ok(decode_observations(docs))
    }
}

fn encode_batch(batch: &[Observation]) -> Result<Vec<(String, serde_json::Value)>, StoreError> {
    batch
        .iter()
        .map(|o| Ok((o.id.to_string(), serde_json::to_value(o)?)))
        .collect()
}

fn decode_observations(docs: Vec<serde_json::Value>) -> Vec<Observation> {
    docs.into_iter()
        .filter_map(|doc| match serde_json::from_value::<Observation>(doc) {
            Ok(obs) => Some(obs),
            Err(e) => {
                warn!("Skipping malformed stored observation: {}", e);
                None
            }
        })
        .collect()
}

/// Periodic flush task owned by the process lifecycle
pub struct FlushScheduler;

impl FlushScheduler {
    /// Flush every `every` until shutdown, then make one final attempt
    pub fn spawn(
        persister: Arc<TelemetryPersister>,
        every: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // failures are already logged and re-buffered
                        let _ = persister.flush().await;
                    }
                    _ = shutdown.recv() => {
                        match persister.flush().await {
                            Ok(outcome) => info!("Final analytics flush wrote {} observations", outcome.flushed),
                            Err(e) => warn!("Final analytics flush failed: {}", e),
                        }
                        break;
                    }
                }
            }
        })
    }
}
