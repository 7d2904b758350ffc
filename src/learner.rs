use crate::fingerprint::short_class;
use crate::masking::message_shape;
use crate::model::{Category, DiagnosticRecord};
use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

pub const INITIAL_CONFIDENCE: f64 = 0.5;
const SMOOTHING_OLD: f64 = 0.7;
const SMOOTHING_NEW: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnedPattern {
    pub signature_key: String,
    pub category: Category,
    pub frequency: u64,
    pub confidence: f64,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearnerConfig {
    pub min_samples: usize,
    pub min_frequency: u64,
    pub min_confidence: f64,
    pub expiry: Duration,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self { min_samples: 50, min_frequency: 5, min_confidence: 0.8, expiry: Duration::days(30) }
    }
}

/// What a retrain pass did; `skipped` when there were too few samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetrainSummary {
    pub skipped: bool,
    pub groups: usize,
    pub updated: usize,
    pub expired: usize,
}

/// Coarser than a fingerprint: short class, short module, function, and the
/// message shape.
pub fn signature_key(record: &DiagnosticRecord) -> String {
    let class = record.exception_class().map(short_class).unwrap_or("");
    let site = record
        .top_frame()
        .map(|f| format!("{}.{}", short_class(&f.module), f.function))
        .unwrap_or_default();
    format!("{}|{}|{}", class, site, message_shape(record.message()))
}

#[derive(Debug, Default)]
pub struct PatternLearner {
    config: LearnerConfig,
    patterns: RwLock<HashMap<String, LearnedPattern>>,
}

impl PatternLearner {
    pub fn new(config: LearnerConfig) -> Self {
        Self { config, patterns: RwLock::new(HashMap::new()) }
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    /// Counts one more sighting of the record's signature.
    pub fn observe(&self, record: &DiagnosticRecord) {
        let key = signature_key(record);
        let mut patterns = self.patterns.write();
        let pattern = patterns.entry(key.clone()).or_insert_with(|| LearnedPattern {
            signature_key: key,
            category: record.category(),
            frequency: 0,
            confidence: INITIAL_CONFIDENCE,
            last_seen: record.last_seen(),
        });
        pattern.frequency += 1;
        pattern.last_seen = pattern.last_seen.max(record.last_seen());
    }

    pub fn retrain(&self, records: &[DiagnosticRecord]) -> RetrainSummary {
        self.retrain_at(records, Utc::now())
    }

    pub fn retrain_at(&self, records: &[DiagnosticRecord], now: DateTime<Utc>) -> RetrainSummary {
        if records.len() < self.config.min_samples {
            debug!(samples = records.len(), min = self.config.min_samples, "not enough samples to retrain");
            return RetrainSummary { skipped: true, ..Default::default() };
        }
        let groups = records.iter().into_group_map_by(|r| signature_key(r));
        let mut summary = RetrainSummary { groups: groups.len(), ..Default::default() };

        let mut patterns = self.patterns.write();
        for (key, group) in &groups {
            let Some((majority, votes)) = majority_category(group) else { continue };
            let consistency = votes as f64 / group.len() as f64;
            if let Some(pattern) = patterns.get_mut(key) {
                pattern.confidence = SMOOTHING_OLD * pattern.confidence + SMOOTHING_NEW * consistency;
                pattern.category = majority;
                summary.updated += 1;
            }
        }
        let horizon = now - self.config.expiry;
        let before = patterns.len();
        patterns.retain(|_, p| p.last_seen >= horizon);
        summary.expired = before - patterns.len();

        info!(
            groups = summary.groups,
            updated = summary.updated,
            expired = summary.expired,
            patterns = patterns.len(),
            "pattern learner retrained"
        );
        summary
    }

    /// A category only once the pattern has enough evidence behind it.
    pub fn suggest_category(&self, record: &DiagnosticRecord) -> Option<Category> {
        let patterns = self.patterns.read();
        let pattern = patterns.get(&signature_key(record))?;
        (pattern.frequency >= self.config.min_frequency && pattern.confidence >= self.config.min_confidence)
            .then_some(pattern.category)
    }

    pub fn pattern(&self, key: &str) -> Option<LearnedPattern> {
        self.patterns.read().get(key).cloned()
    }

    pub fn patterns(&self) -> Vec<LearnedPattern> {
        self.patterns
            .read()
            .values()
            .cloned()
            .sorted_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.signature_key.cmp(&b.signature_key)))
            .collect()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.read().len()
    }

    pub fn high_confidence_count(&self) -> usize {
        self.patterns
            .read()
            .values()
            .filter(|p| p.confidence >= self.config.min_confidence)
            .count()
    }
}

// Ties go to the category declared first so the vote is deterministic.
fn majority_category(group: &[&DiagnosticRecord]) -> Option<(Category, usize)> {
    group
        .iter()
        .map(|r| r.category())
        .counts()
        .into_iter()
        .max_by(|(ca, na), (cb, nb)| na.cmp(nb).then_with(|| cb.cmp(ca)))
}
