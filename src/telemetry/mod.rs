//! Request telemetry: every completed request becomes an [`Observation`] recorded into the
//! in-memory [`TelemetryBuffer`]. The [`TelemetryPersister`] drains the buffer into the document
//! store on a timer, and the [`Aggregator`] answers analytics queries from both sources.

pub mod aggregator;
pub mod buffer;
pub mod persister;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub use aggregator::{AnalyticsError, Aggregator, KeyUsage, RealTime, Summary};
pub use buffer::{BufferSnapshot, TelemetryBuffer};
pub use persister::{FlushOutcome, FlushScheduler, TelemetryPersister};

/// One completed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Stable id; persisting the same observation twice overwrites rather than duplicates
    pub id: Uuid,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub key_id: Option<String>,
    pub status: u16,
    pub elapsed_ms: f64,
    pub success: bool,
}

impl Observation {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        status: u16,
        elapsed: Duration,
        key_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            method: method.into(),
            path: path.into(),
            key_id,
            status,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            success: status < 400,
        }
    }
}
