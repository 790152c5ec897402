use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

use super::Observation;

/// Per-minute counters kept for rate calculations
const MINUTE_HISTORY: i64 = 60;

/// Thread-safe accumulator of observations awaiting persistence.
///
/// `record` and `drain` each take the lock once for a constant amount of work,
/// so a drain sees every observation recorded before it and none recorded after.
pub struct TelemetryBuffer {
    state: Mutex<BufferState>,
    max_buffered: usize,
}

#[derive(Default)]
struct BufferState {
    pending: VecDeque<Observation>,
    /// epoch minute -> observations recorded in that minute
    minute_counts: BTreeMap<i64, u64>,
    total_recorded: u64,
    dropped: u64,
}

/// Non-destructive view of the buffer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferSnapshot {
    pub buffered: usize,
    pub total_recorded: u64,
    pub dropped: u64,
    pub window_minutes: u32,
    pub requests_in_window: u64,
    pub requests_per_minute: f64,
}

impl TelemetryBuffer {
    pub fn new(max_buffered: usize) -> Self {
        Self {
            state: Mutex::new(BufferState::default()),
            max_buffered: max_buffered.max(1),
        }
    }

    pub fn record(&self, observation: Observation) {
        let minute = epoch_minute(observation.timestamp);
        let mut guard = self.state.lock();
        let state = &mut *guard;

        state.total_recorded += 1;
        *state.minute_counts.entry(minute).or_default() += 1;
        while let Some((&oldest, _)) = state.minute_counts.first_key_value() {
            if oldest >= minute - MINUTE_HISTORY {
                break;
            }
            state.minute_counts.pop_first();
        }

        state.pending.push_back(observation);
        if state.pending.len() > self.max_buffered {
            state.pending.pop_front();
            state.dropped += 1;
            if state.dropped % 1_000 == 1 {
                tracing::warn!(
                    dropped = state.dropped,
                    max_buffered = self.max_buffered,
                    "Telemetry buffer full; dropping oldest observations"
                );
            }
        }
    }

    /// Remove and return everything buffered, oldest first
    pub fn drain(&self) -> Vec<Observation> {
        let pending = std::mem::take(&mut self.state.lock().pending);
        Vec::from(pending)
    }

    /// Put a batch that failed to persist back in front of anything recorded since
    pub fn requeue(&self, batch: Vec<Observation>) {
        if batch.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        let newer = std::mem::take(&mut state.pending);
        let mut merged = VecDeque::from(batch);
        merged.extend(newer);

        while merged.len() > self.max_buffered {
            merged.pop_front();
            state.dropped += 1;
        }
        state.pending = merged;
    }

    /// Copy of the buffered observations, oldest first
    pub fn pending(&self) -> Vec<Observation> {
        self.state.lock().pending.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffer size and request rate over the trailing `window_minutes` (current minute included)
    pub fn snapshot_counts(&self, now: DateTime<Utc>, window_minutes: u32) -> BufferSnapshot {
        let window = window_minutes.max(1);
        let current = epoch_minute(now);
        let first = current - i64::from(window) + 1;

        let state = self.state.lock();
        let requests_in_window: u64 = state.minute_counts.range(first..=current).map(|(_, n)| n).sum();

        BufferSnapshot {
            buffered: state.pending.len(),
            total_recorded: state.total_recorded,
            dropped: state.dropped,
            window_minutes: window,
            requests_in_window,
            requests_per_minute: requests_in_window as f64 / f64::from(window),
        }
    }
}

fn epoch_minute(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(60)
}
