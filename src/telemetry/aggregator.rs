use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::config::AnalyticsConfig;
use crate::database::StoreError;
use crate::keys::{AccessType, KeyError, KeyRecord, KeyService, UsageTracker};

use super::persister::FlushStats;
use super::{BufferSnapshot, Observation, TelemetryBuffer, TelemetryPersister};

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("days must be between 1 and {max}")]
    InvalidWindow { max: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Keys(#[from] KeyError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Percentage, 0 when there were no requests
    pub success_rate: f64,
    pub avg_response_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Period {
    pub days: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyBucket {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub totals: Totals,
}

#[derive(Debug, Clone, Serialize)]
pub struct HourlyBucket {
    pub hour: u32,
    pub requests: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointCount {
    pub path: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub overall: Totals,
    pub period: Period,
    pub methods: BTreeMap<String, u64>,
    pub status_codes: BTreeMap<u16, u64>,
    pub daily: Vec<DailyBucket>,
    pub top_endpoints: Vec<EndpointCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealTime {
    pub today: Totals,
    pub hourly: Vec<HourlyBucket>,
    pub requests_per_minute: f64,
    pub buffer: BufferSnapshot,
    pub persistence: FlushStats,
    pub recent_requests: Vec<Observation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyUsage {
    pub key_id: String,
    pub name: String,
    pub access_type: AccessType,
    pub active: bool,
    pub request_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct Tally {
    total: u64,
    successful: u64,
    elapsed_ms: f64,
}

impl Tally {
    fn add(&mut self, obs: &Observation) {
        self.total += 1;
        if obs.success {
            self.successful += 1;
        }
        self.elapsed_ms += obs.elapsed_ms;
    }

    fn merge(&mut self, other: &Tally) {
        self.total += other.total;
        self.successful += other.successful;
        self.elapsed_ms += other.elapsed_ms;
    }

    fn totals(&self) -> Totals {
        if self.total == 0 {
            return Totals::default();
        }
        let total = self.total as f64;
        Totals {
            total_requests: self.total,
            successful_requests: self.successful,
            failed_requests: self.total - self.successful,
            success_rate: round2(self.successful as f64 * 100.0 / total),
            avg_response_ms: round2(self.elapsed_ms / total),
        }
    }
}

/// Everything `summary` needs from one calendar day
#[derive(Debug, Clone, Default)]
struct DayRollup {
    tally: Tally,
    methods: BTreeMap<String, u64>,
    status_codes: BTreeMap<u16, u64>,
    endpoints: HashMap<String, u64>,
}

impl DayRollup {
    fn add(&mut self, obs: &Observation) {
        self.tally.add(obs);
        *self.methods.entry(obs.method.clone()).or_insert(0) += 1;
        *self.status_codes.entry(obs.status).or_insert(0) += 1;
        *self.endpoints.entry(obs.path.clone()).or_insert(0) += 1;
    }

    fn merge_into(&self, total: &mut DayRollup) {
        total.tally.merge(&self.tally);
        for (method, n) in &self.methods {
            *total.methods.entry(method.clone()).or_insert(0) += n;
        }
        for (status, n) in &self.status_codes {
            *total.status_codes.entry(*status).or_insert(0) += n;
        }
        for (path, n) in &self.endpoints {
            *total.endpoints.entry(path.clone()).or_insert(0) += n;
        }
    }
}

/// A day is rolled up for good once it has been over this long
const CLOSED_DAY_GRACE_MINUTES: i64 = 5;

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Read-only analytics over persisted observations plus the live buffer.
///
/// Finished days are rolled up once and kept in memory, so a summary only scans
/// today's observations and any day it has not seen before.
pub struct Aggregator {
    persister: Arc<TelemetryPersister>,
    buffer: Arc<TelemetryBuffer>,
    keys: KeyService,
    usage: UsageTracker,
    settings: AnalyticsConfig,
    closed_days: Mutex<HashMap<NaiveDate, DayRollup>>,
}

impl Aggregator {
    pub fn new(
        persister: Arc<TelemetryPersister>,
        buffer: Arc<TelemetryBuffer>,
        keys: KeyService,
        usage: UsageTracker,
        settings: AnalyticsConfig,
    ) -> Self {
        Self {
            persister,
            buffer,
            keys,
            usage,
            settings,
            closed_days: Mutex::new(HashMap::new()),
        }
    }

    /// Observations in `[from, to)` from the store and everything not yet flushed, each id once.
    /// The unflushed snapshot is taken first so a batch acknowledged in between is read from the store.
    async fn observations(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Observation>, AnalyticsError> {
        let unflushed = self.persister.unflushed();
        let mut merged = self.persister.load_range(from, Some(to)).await?;
        let mut seen: HashSet<_> = merged.iter().map(|o| o.id).collect();

        for obs in unflushed {
            if obs.timestamp >= from && obs.timestamp < to && seen.insert(obs.id) {
                merged.push(obs);
            }
        }
        Ok(merged)
    }

    /// One rollup per day starting at `start`; cached days are reused, the rest are scanned
    async fn day_rollups(
        &self,
        start: DateTime<Utc>,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<DayRollup>, AnalyticsError> {
        let dates: Vec<NaiveDate> = (0..days)
            .map(|i| (start + Duration::days(i64::from(i))).date_naive())
            .collect();

        let mut rollups: Vec<Option<DayRollup>> = {
            let cache = self.closed_days.lock();
            dates.iter().map(|d| cache.get(d).cloned()).collect()
        };
        let Some(first_missing) = rollups.iter().position(Option::is_none) else {
            return Ok(rollups.into_iter().flatten().collect());
        };

        let scan_from = start + Duration::days(first_missing as i64);
        let end = start + Duration::days(i64::from(days));
        let missing: Vec<bool> = rollups.iter().map(Option::is_none).collect();
        let mut fresh: Vec<DayRollup> = vec![DayRollup::default(); days as usize];
        for obs in self.observations(scan_from, end).await? {
            let index = (obs.timestamp - start).num_days();
            if let Ok(i) = usize::try_from(index) {
                if missing.get(i).copied().unwrap_or(false) {
                    fresh[i].add(&obs);
                }
            }
        }

        let settled_before = now - Duration::minutes(CLOSED_DAY_GRACE_MINUTES);
        let oldest_kept = (now - Duration::days(i64::from(self.settings.max_summary_days))).date_naive();
        let mut cache = self.closed_days.lock();
        for (i, slot) in rollups.iter_mut().enumerate() {
            if slot.is_some() {
                continue;
            }
            let day = std::mem::take(&mut fresh[i]);
            let day_end = start + Duration::days(i as i64 + 1);
            if day_end <= settled_before {
                cache.insert(dates[i], day.clone());
            }
            *slot = Some(day);
        }
        cache.retain(|date, _| *date >= oldest_kept);

        Ok(rollups.into_iter().flatten().collect())
    }

    pub async fn summary(&self, days: u32) -> Result<Summary, AnalyticsError> {
        let max = self.settings.max_summary_days;
        if days == 0 || days > max {
            return Err(AnalyticsError::InvalidWindow { max });
        }

        let now = Utc::now();
        let today = start_of_day(now);
        let start = today - Duration::days(i64::from(days) - 1);
        let end = today + Duration::days(1);
        let rollups = self.day_rollups(start, days, now).await?;

        let mut overall = DayRollup::default();
        for day in &rollups {
            day.merge_into(&mut overall);
        }

        let mut top_endpoints: Vec<EndpointCount> = overall
            .endpoints
            .into_iter()
            .map(|(path, count)| EndpointCount { path, count })
            .collect();
        top_endpoints.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.path.cmp(&b.path)));
        top_endpoints.truncate(self.settings.top_endpoints_limit);

        let daily = rollups
            .iter()
            .enumerate()
            .map(|(i, day)| DailyBucket {
                date: (start + Duration::days(i as i64)).date_naive(),
                totals: day.tally.totals(),
            })
            .collect();

        Ok(Summary {
            overall: overall.tally.totals(),
            period: Period { days, start, end },
            methods: overall.methods,
            status_codes: overall.status_codes,
            daily,
            top_endpoints,
        })
    }

    pub async fn realtime(&self) -> Result<RealTime, AnalyticsError> {
        let now = Utc::now();
        let today = start_of_day(now);
        let mut observations = self.observations(today, today + Duration::days(1)).await?;

        let mut tally = Tally::default();
        let mut hourly: Vec<HourlyBucket> = (0..24)
            .map(|hour| HourlyBucket {
                hour,
                requests: 0,
                failed: 0,
            })
            .collect();
        for obs in &observations {
            tally.add(obs);
            let bucket = &mut hourly[obs.timestamp.hour() as usize];
            bucket.requests += 1;
            if !obs.success {
                bucket.failed += 1;
            }
        }

        observations.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        observations.truncate(self.settings.recent_requests_limit);

        let buffer = self.buffer.snapshot_counts(now, self.settings.rate_window_minutes);
        Ok(RealTime {
            today: tally.totals(),
            hourly,
            requests_per_minute: round2(buffer.requests_per_minute),
            buffer,
            persistence: self.persister.stats(),
            recent_requests: observations,
        })
    }

    /// Usage per key including increments not yet written; unknown id gives an empty list
    pub async fn per_key_stats(&self, key_id: Option<&str>) -> Result<Vec<KeyUsage>, AnalyticsError> {
        // no usage write may land between reading the records and reading what is pending
        let _settled = self.usage.hold_writes().await;
        let records: Vec<KeyRecord> = match key_id {
            Some(id) => self.keys.get_key(id).await?.into_iter().collect(),
            None => self.keys.list_keys().await?,
        };

        let mut stats: Vec<KeyUsage> = records.into_iter().map(|r| self.key_usage(r)).collect();
        stats.sort_by(|a, b| {
            b.request_count
                .cmp(&a.request_count)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(stats)
    }

    fn key_usage(&self, record: KeyRecord) -> KeyUsage {
        let pending = self.usage.pending_for(&record.id);
        let request_count = record.usage_count + pending.map_or(0, |p| p.count);
        let last_used_at = match (record.last_used_at, pending) {
            (Some(stored), Some(p)) => Some(stored.max(p.last_used_at)),
            (None, Some(p)) => Some(p.last_used_at),
            (stored, None) => stored,
        };

        KeyUsage {
            key_id: record.id,
            name: record.name,
            access_type: record.access_type,
            active: record.active,
            request_count,
            last_used_at,
            created_at: record.created_at,
            expires_at: record.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::testing::ControlledStore;
    use crate::database::{collections, DocumentStore};
    use crate::keys::GenerateKeyRequest;

    struct Fixture {
        store: Arc<ControlledStore>,
        buffer: Arc<TelemetryBuffer>,
        persister: Arc<TelemetryPersister>,
        keys: KeyService,
        usage: UsageTracker,
        aggregator: Aggregator,
    }

    fn fixture() -> Fixture {
        let store = ControlledStore::new();
        let settings = AppConfig::development().analytics;
        let buffer = Arc::new(TelemetryBuffer::new(settings.max_buffered));
        let persister = Arc::new(TelemetryPersister::new(
            buffer.clone(),
            store.clone(),
            std::time::Duration::from_secs(2),
        ));
        let keys = KeyService::new(store.clone());
        let usage = UsageTracker::new(store.clone());
        let aggregator = Aggregator::new(
            persister.clone(),
            buffer.clone(),
            keys.clone(),
            usage.clone(),
            settings,
        );
        Fixture {
            store,
            buffer,
            persister,
            keys,
            usage,
            aggregator,
        }
    }

    fn obs(method: &str, path: &str, status: u16, at: DateTime<Utc>) -> Observation {
        let mut o = Observation::new(method, path, status, std::time::Duration::from_millis(10), None);
        o.timestamp = at;
        o
    }

    #[tokio::test]
    async fn summary_has_one_bucket_per_day_summing_to_total() {
        let f = fixture();
        let now = Utc::now();
        f.buffer.record(obs("GET", "/api/media", 200, now - Duration::days(2)));
        f.buffer.record(obs("GET", "/api/media", 200, now - Duration::days(2)));
        f.buffer.record(obs("POST", "/admin/media", 500, now - Duration::days(40)));
        f.persister.flush().await.unwrap();
        f.buffer.record(obs("GET", "/api/settings", 404, now));

        let summary = f.aggregator.summary(7).await.unwrap();
        assert_eq!(summary.daily.len(), 7);
        let bucket_sum: u64 = summary.daily.iter().map(|d| d.totals.total_requests).sum();
        assert_eq!(summary.overall.total_requests, 3);
        assert_eq!(bucket_sum, 3);
        assert_eq!(summary.overall.failed_requests, 1);
        assert_eq!(summary.daily.last().unwrap().date, now.date_naive());
        assert_eq!(summary.methods.get("GET"), Some(&3));
        assert_eq!(summary.status_codes.get(&404), Some(&1));
        assert!(summary.daily.iter().filter(|d| d.totals.total_requests == 0).count() >= 5);
    }

    #[tokio::test]
    async fn summary_does_not_double_count_requeued_observations() {
        let f = fixture();
        let now = Utc::now();
        let o = obs("GET", "/api/media", 200, now);
        f.buffer.record(o.clone());
        f.persister.flush().await.unwrap();
        // simulate a retried batch that had in fact been written
        f.buffer.requeue(vec![o]);

        let summary = f.aggregator.summary(1).await.unwrap();
        assert_eq!(summary.overall.total_requests, 1);
    }

    #[tokio::test]
    async fn summary_rejects_out_of_range_windows() {
        let f = fixture();
        assert!(matches!(
            f.aggregator.summary(0).await,
            Err(AnalyticsError::InvalidWindow { .. })
        ));
        assert!(matches!(
            f.aggregator.summary(10_000).await,
            Err(AnalyticsError::InvalidWindow { .. })
        ));
    }

    #[tokio::test]
    async fn top_endpoints_break_ties_by_path() {
        let f = fixture();
        let now = Utc::now();
        for path in ["/b", "/a", "/c", "/c"] {
            f.buffer.record(obs("GET", path, 200, now));
        }

        let top = f.aggregator.summary(1).await.unwrap().top_endpoints;
        let paths: Vec<_> = top.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/c", "/a", "/b"]);
    }

    #[tokio::test]
    async fn realtime_sees_unflushed_requests_newest_first() {
        let f = fixture();
        let now = Utc::now();
        let earlier = (now - Duration::minutes(1)).max(start_of_day(now));
        f.buffer.record(obs("GET", "/first", 200, earlier));
        f.buffer.record(obs("GET", "/second", 200, now));

        let rt = f.aggregator.realtime().await.unwrap();
        let paths: Vec<_> = rt.recent_requests.iter().map(|o| o.path.as_str()).collect();
        assert_eq!(paths, vec!["/second", "/first"]);
        assert_eq!(rt.today.total_requests, 2);
        assert!(rt.requests_per_minute > 0.0);
        assert_eq!(rt.hourly.len(), 24);
        // read-only
        assert_eq!(f.buffer.len(), 2);
    }

    #[tokio::test]
    async fn per_key_stats_include_pending_usage() {
        let f = fixture();
        let busy = f
            .keys
            .generate_key(GenerateKeyRequest {
                name: "busy".into(),
                description: None,
                access_type: "read_only".into(),
                capabilities: None,
                expires_in_days: None,
            })
            .await
            .unwrap();
        f.keys
            .generate_key(GenerateKeyRequest {
                name: "idle".into(),
                description: None,
                access_type: "read_only".into(),
                capabilities: None,
                expires_in_days: None,
            })
            .await
            .unwrap();

        f.usage.record(&busy.id, Utc::now());
        f.usage.record(&busy.id, Utc::now());

        let all = f.aggregator.per_key_stats(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "busy");
        assert_eq!(all[0].request_count, 2);
        assert!(all[0].last_used_at.is_some());
        assert_eq!(all[1].request_count, 0);

        f.usage.flush().await;
        let one = f.aggregator.per_key_stats(Some(&busy.id)).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].request_count, 2);

        assert!(f.aggregator.per_key_stats(Some("missing")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reads_include_a_batch_that_is_being_written() {
        let f = fixture();
        f.buffer.record(obs("GET", "/api/media", 200, Utc::now()));
        f.store.delay_writes(std::time::Duration::from_millis(400));

        let flushing = tokio::spawn({
            let persister = f.persister.clone();
            async move { persister.flush().await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let rt = f.aggregator.realtime().await.unwrap();
        assert_eq!(rt.today.total_requests, 1);
        assert_eq!(rt.recent_requests.len(), 1);
        assert_eq!(f.aggregator.summary(1).await.unwrap().overall.total_requests, 1);

        flushing.await.unwrap().unwrap();
        assert_eq!(f.aggregator.realtime().await.unwrap().today.total_requests, 1);
    }

    #[tokio::test]
    async fn per_key_stats_count_usage_that_is_being_written() {
        let f = fixture();
        let key = f
            .keys
            .generate_key(GenerateKeyRequest {
                name: "slow".into(),
                description: None,
                access_type: "read_only".into(),
                capabilities: None,
                expires_in_days: None,
            })
            .await
            .unwrap();
        f.usage.record(&key.id, Utc::now());
        f.store.delay_writes(std::time::Duration::from_millis(400));

        let flushing = tokio::spawn({
            let usage = f.usage.clone();
            async move { usage.flush().await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let stats = f.aggregator.per_key_stats(Some(&key.id)).await.unwrap();
        assert_eq!(stats[0].request_count, 1);
        flushing.await.unwrap();
    }

    #[tokio::test]
    async fn finished_days_are_served_from_rollups() {
        let f = fixture();
        let now = Utc::now();
        f.buffer.record(obs("GET", "/api/media", 200, now - Duration::days(2)));
        f.persister.flush().await.unwrap();
        assert_eq!(f.aggregator.summary(3).await.unwrap().daily[0].totals.total_requests, 1);

        // a document written behind the aggregator's back is not rescanned for a closed day
        let late = obs("GET", "/api/media", 200, now - Duration::days(2));
        f.store
            .put(collections::REQUESTS, &late.id.to_string(), serde_json::to_value(&late).unwrap())
            .await
            .unwrap();
        f.buffer.record(obs("GET", "/api/ping", 200, now));

        let summary = f.aggregator.summary(3).await.unwrap();
        assert_eq!(summary.daily[0].totals.total_requests, 1);
        assert_eq!(summary.daily[2].totals.total_requests, 1);
        assert_eq!(summary.overall.total_requests, 2);
        assert_eq!(summary.methods.get("GET"), Some(&2));
    }
}
