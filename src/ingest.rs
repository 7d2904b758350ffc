use crate::classifier::Classifier;
use crate::enrichment::{enrich_or_fallback, Enricher};
use crate::learner::PatternLearner;
use crate::model::DiagnosticRecord;
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct IngestStats {
    blocks: AtomicU64,
    created: AtomicU64,
    merged: AtomicU64,
    ignored: AtomicU64,
    overridden: AtomicU64,
    inline_fallbacks: AtomicU64,
    store_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSnapshot {
    pub blocks: u64,
    pub created: u64,
    pub merged: u64,
    pub ignored: u64,
    pub overridden: u64,
    pub inline_fallbacks: u64,
    pub store_failures: u64,
}

impl IngestStats {
    pub fn record_inline_fallback(&self) {
        self.inline_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        IngestSnapshot {
            blocks: get(&self.blocks),
            created: get(&self.created),
            merged: get(&self.merged),
            ignored: get(&self.ignored),
            overridden: get(&self.overridden),
            inline_fallbacks: get(&self.inline_fallbacks),
            store_failures: get(&self.store_failures),
        }
    }
}

#[derive(Debug, Clone)]
pub enum BlockOutcome {
    Created(DiagnosticRecord),
    Merged(DiagnosticRecord),
    Ignored,
    Failed,
}

impl BlockOutcome {
    pub fn record(&self) -> Option<&DiagnosticRecord> {
        match self {
            BlockOutcome::Created(r) | BlockOutcome::Merged(r) => Some(r),
            BlockOutcome::Ignored | BlockOutcome::Failed => None,
        }
    }
}

/// Classify, dedup, learn: everything that happens to one completed block.
pub struct Ingestor {
    classifier: Classifier,
    store: Arc<dyn RecordStore>,
    learner: Arc<PatternLearner>,
    enricher: Option<Arc<dyn Enricher>>,
    enrich_new_records: bool,
    stats: IngestStats,
}

impl Ingestor {
    pub fn new(classifier: Classifier, store: Arc<dyn RecordStore>, learner: Arc<PatternLearner>) -> Self {
        Self { classifier, store, learner, enricher: None, enrich_new_records: false, stats: IngestStats::default() }
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>, enrich_new_records: bool) -> Self {
        self.enricher = Some(enricher);
        self.enrich_new_records = enrich_new_records;
        self
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn process_block(&self, source: &str, text: &str) -> BlockOutcome {
        self.process_block_at(source, text, Utc::now())
    }

    pub fn process_block_at(&self, source: &str, text: &str, at: DateTime<Utc>) -> BlockOutcome {
        self.stats.blocks.fetch_add(1, Ordering::Relaxed);
        let Some(mut candidate) = self.classifier.parse_at(text, source, at) else {
            self.stats.ignored.fetch_add(1, Ordering::Relaxed);
            return BlockOutcome::Ignored;
        };

        if let Some(category) = self.learner.suggest_category(&candidate) {
            if category != candidate.category() {
                debug!(source, from = ?candidate.category(), to = ?category, "learned pattern overrides category");
                self.stats.overridden.fetch_add(1, Ordering::Relaxed);
                candidate = candidate.reclassified(category);
            }
        }

        let upserted = match self.store.upsert(candidate) {
            Ok(u) => u,
            Err(e) => {
                self.stats.store_failures.fetch_add(1, Ordering::Relaxed);
                warn!(source, error = %e, "failed to store diagnostic record");
                return BlockOutcome::Failed;
            }
        };
        self.learner.observe(&upserted.record);

        if !upserted.created {
            self.stats.merged.fetch_add(1, Ordering::Relaxed);
            debug!(
                source,
                fingerprint = upserted.record.fingerprint(),
                occurrences = upserted.record.occurrence_count(),
                "merged into existing record"
            );
            return BlockOutcome::Merged(upserted.record);
        }

        self.stats.created.fetch_add(1, Ordering::Relaxed);
        info!(
            source,
            fingerprint = upserted.record.fingerprint(),
            category = %upserted.record.category(),
            "new diagnostic record"
        );
        BlockOutcome::Created(self.enrich_new(upserted.record))
    }

    fn enrich_new(&self, record: DiagnosticRecord) -> DiagnosticRecord {
        let Some(enricher) = self.enricher.as_ref().filter(|_| self.enrich_new_records) else {
            return record;
        };
        let enrichment = enrich_or_fallback(enricher.as_ref(), &record);
        match self.store.attach_enrichment(record.fingerprint(), enrichment) {
            Ok(enriched) => enriched,
            Err(e) => {
                warn!(fingerprint = record.fingerprint(), error = %e, "could not attach enrichment");
                record
            }
        }
    }
}
