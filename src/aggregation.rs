use crate::model::{Category, DiagnosticRecord};
use crate::store::RecordStore;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Days counted as "recent" when classifying a trend.
pub const RECENT_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequentError {
    pub fingerprint: String,
    pub summary: String,
    pub category: Category,
    pub occurrence_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub days: u32,
    pub daily: Vec<DailyCount>,
    pub recent_total: usize,
    pub prior_total: usize,
    /// `None` when the prior period is empty.
    pub ratio: Option<f64>,
    pub direction: TrendDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionRate {
    pub total: usize,
    pub resolved: usize,
    pub rate: f64,
    pub percentage: String,
}

pub fn category_distribution(records: &[DiagnosticRecord]) -> BTreeMap<Category, usize> {
    let mut out = BTreeMap::new();
    for r in records {
        *out.entry(r.category()).or_insert(0) += 1;
    }
    out
}

/// Ranked by occurrence count descending; ties go to the earliest first sighting.
pub fn frequent_errors(records: &[DiagnosticRecord], limit: usize) -> Vec<FrequentError> {
    let mut ranked: Vec<&DiagnosticRecord> = records.iter().collect();
    ranked.sort_by(|a, b| {
        b.occurrence_count()
            .cmp(&a.occurrence_count())
            .then_with(|| a.first_seen().cmp(&b.first_seen()))
            .then_with(|| a.fingerprint().cmp(b.fingerprint()))
    });
    ranked
        .into_iter()
        .take(limit)
        .map(|r| FrequentError {
            fingerprint: r.fingerprint().to_string(),
            summary: r.summary().to_string(),
            category: r.category(),
            occurrence_count: r.occurrence_count(),
            first_seen: r.first_seen(),
            last_seen: r.last_seen(),
        })
        .collect()
}

/// `> 1.2` increasing, `< 0.8` decreasing, otherwise stable. Integer
/// arithmetic keeps the boundaries exact.
pub fn classify_trend(recent: usize, prior: usize) -> TrendDirection {
    if prior == 0 {
        return if recent > 0 { TrendDirection::Increasing } else { TrendDirection::Stable };
    }
    let (r, p) = (recent as u128 * 5, prior as u128);
    if r > p * 6 {
        TrendDirection::Increasing
    } else if r < p * 4 {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    }
}

pub fn trend_from_daily(days: u32, daily: Vec<DailyCount>, today: NaiveDate) -> TrendReport {
    let (mut recent_total, mut prior_total) = (0, 0);
    for d in &daily {
        if (today - d.date).num_days() < RECENT_DAYS {
            recent_total += d.count;
        } else {
            prior_total += d.count;
        }
    }
    let ratio = (prior_total > 0).then(|| recent_total as f64 / prior_total as f64);
    TrendReport {
        days,
        daily,
        recent_total,
        prior_total,
        ratio,
        direction: classify_trend(recent_total, prior_total),
    }
}

/// Daily record counts over the `days` ending at `today`, bucketed by first
/// sighting; re-observing an old record does not make it new.
pub fn trend(records: &[DiagnosticRecord], days: u32, today: NaiveDate) -> TrendReport {
    let days = days.max(1);
    let mut buckets: BTreeMap<NaiveDate, usize> = (0..i64::from(days))
        .map(|offset| (today - Duration::days(offset), 0))
        .collect();
    for r in records {
        if let Some(count) = buckets.get_mut(&r.first_seen().date_naive()) {
            *count += 1;
        }
    }
    let daily = buckets.into_iter().map(|(date, count)| DailyCount { date, count }).collect();
    trend_from_daily(days, daily, today)
}

pub fn percentage(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

pub fn resolution_rate(records: &[DiagnosticRecord]) -> ResolutionRate {
    let total = records.len();
    let resolved = records.iter().filter(|r| r.status().is_resolved()).count();
    let rate = if total == 0 { 0.0 } else { resolved as f64 / total as f64 };
    ResolutionRate { total, resolved, rate, percentage: percentage(rate) }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Distribution { days: u32 },
    Frequent { days: u32, limit: usize },
    Trend { days: u32 },
    Resolution { days: u32 },
}

#[derive(Debug, Clone)]
pub enum CachedValue {
    Distribution(BTreeMap<Category, usize>),
    Frequent(Vec<FrequentError>),
    Trend(TrendReport),
    Resolution(ResolutionRate),
}

#[derive(Debug)]
struct CachedEntry {
    value: CachedValue,
    stored_at: Instant,
}

/// Query results keyed by `(query, parameters)` with a fixed time-to-live.
#[derive(Debug)]
pub struct QueryCache {
    ttl: std::time::Duration,
    entries: RwLock<HashMap<QueryKey, CachedEntry>>,
}

impl QueryCache {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()) }
    }

    pub fn get(&self, key: &QueryKey) -> Option<CachedValue> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &QueryKey, now: Instant) -> Option<CachedValue> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        (now.saturating_duration_since(entry.stored_at) < self.ttl).then(|| entry.value.clone())
    }

    pub fn insert(&self, key: QueryKey, value: CachedValue) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&self, key: QueryKey, value: CachedValue, now: Instant) {
        self.entries.write().insert(key, CachedEntry { value, stored_at: now });
    }

    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Instant::now())
    }

    pub fn evict_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| now.saturating_duration_since(e.stored_at) < self.ttl);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cached read-only queries over the store's recent window.
pub struct Aggregator {
    store: Arc<dyn RecordStore>,
    cache: QueryCache,
}

impl Aggregator {
    pub fn new(store: Arc<dyn RecordStore>, ttl: std::time::Duration) -> Self {
        Self { store, cache: QueryCache::new(ttl) }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    fn cached<T>(
        &self,
        key: QueryKey,
        extract: impl Fn(CachedValue) -> Option<T>,
        compute: impl FnOnce(&[DiagnosticRecord]) -> (T, CachedValue),
    ) -> T {
        if let Some(hit) = self.cache.get(&key).and_then(&extract) {
            return hit;
        }
        let days = match key {
            QueryKey::Distribution { days }
            | QueryKey::Frequent { days, .. }
            | QueryKey::Trend { days }
            | QueryKey::Resolution { days } => days,
        };
        let records = self.store.query_recent(days);
        debug!(?key, records = records.len(), "aggregation cache miss");
        let (value, cached) = compute(&records);
        self.cache.insert(key, cached);
        value
    }

    pub fn category_distribution(&self, days: u32) -> BTreeMap<Category, usize> {
        self.cached(
            QueryKey::Distribution { days },
            |v| match v { CachedValue::Distribution(d) => Some(d), _ => None },
            |records| {
                let d = category_distribution(records);
                (d.clone(), CachedValue::Distribution(d))
            },
        )
    }

    pub fn frequent_errors(&self, days: u32, limit: usize) -> Vec<FrequentError> {
        self.cached(
            QueryKey::Frequent { days, limit },
            |v| match v { CachedValue::Frequent(f) => Some(f), _ => None },
            |records| {
                let f = frequent_errors(records, limit);
                (f.clone(), CachedValue::Frequent(f))
            },
        )
    }

    pub fn trend(&self, days: u32) -> TrendReport {
        self.cached(
            QueryKey::Trend { days },
            |v| match v { CachedValue::Trend(t) => Some(t), _ => None },
            |records| {
                let t = trend(records, days, Utc::now().date_naive());
                (t.clone(), CachedValue::Trend(t))
            },
        )
    }

    pub fn resolution_rate(&self, days: u32) -> ResolutionRate {
        self.cached(
            QueryKey::Resolution { days },
            |v| match v { CachedValue::Resolution(r) => Some(r), _ => None },
            |records| {
                let r = resolution_rate(records);
                (r.clone(), CachedValue::Resolution(r))
            },
        )
    }

    pub fn evict_expired(&self) -> usize {
        self.cache.evict_expired()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}
