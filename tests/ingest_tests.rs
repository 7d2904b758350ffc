use faultscope::classifier::Classifier;
use faultscope::ingest::{BlockOutcome, Ingestor};
use faultscope::learner::{LearnerConfig, PatternLearner};
use faultscope::model::{Category, DiagnosticRecord, Enrichment, Status};
use faultscope::store::{MemoryStore, RecordStore, StoreError, Upserted};
use std::sync::Arc;

const NPE: &str = "NullPointerException: x is null\n at pkg.Bar.baz(Bar.java:10)\n at pkg.Main.main(Main.java:5)";

fn ingestor(store: Arc<dyn RecordStore>, learner: Arc<PatternLearner>) -> Ingestor {
    Ingestor::new(Classifier::new(), store, learner)
}

fn eager_learner() -> Arc<PatternLearner> {
    Arc::new(PatternLearner::new(LearnerConfig { min_samples: 1, ..LearnerConfig::default() }))
}

#[test]
fn outcomes_and_counters() {
    let store = Arc::new(MemoryStore::new());
    let ing = ingestor(store.clone(), eager_learner());

    assert!(matches!(ing.process_block("app", NPE), BlockOutcome::Created(_)));
    let merged = ing.process_block("app", NPE);
    assert_eq!(merged.record().map(|r| r.occurrence_count()), Some(2));
    assert!(matches!(ing.process_block("app", "all quiet on the western front"), BlockOutcome::Ignored));

    let snap = ing.stats().snapshot();
    assert_eq!((snap.blocks, snap.created, snap.merged, snap.ignored), (3, 1, 1, 1));
    assert_eq!(store.len(), 1);
}

#[test]
fn confident_learned_pattern_overrides_rule_category() {
    let store = Arc::new(MemoryStore::new());
    let learner = eager_learner();
    let seeded = Classifier::new().parse(NPE, "app").unwrap().reclassified(Category::Database);
    for _ in 0..5 {
        learner.observe(&seeded);
    }
    let batch = vec![seeded.clone(); 5];
    for _ in 0..3 {
        learner.retrain(&batch);
    }

    let ing = ingestor(store.clone(), learner);
    let outcome = ing.process_block("app", NPE);
    let rec = outcome.record().unwrap();
    assert_eq!(rec.category(), Category::Database);
    assert_eq!(ing.stats().snapshot().overridden, 1);
    assert!(rec.summary().contains(Category::Database.tag()));
}

struct BrokenStore;

impl RecordStore for BrokenStore {
    fn save(&self, _record: DiagnosticRecord) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk full".into()))
    }
    fn upsert(&self, _candidate: DiagnosticRecord) -> Result<Upserted, StoreError> {
        Err(StoreError::Backend("disk full".into()))
    }
    fn find_by_fingerprint(&self, _fingerprint: &str) -> Option<DiagnosticRecord> {
        None
    }
    fn query_recent(&self, _days: u32) -> Vec<DiagnosticRecord> {
        Vec::new()
    }
    fn cleanup_older_than(&self, _days: u32) -> usize {
        0
    }
    fn transition(&self, fingerprint: &str, _status: Status) -> Result<DiagnosticRecord, StoreError> {
        Err(StoreError::NotFound(fingerprint.to_string()))
    }
    fn attach_enrichment(&self, fingerprint: &str, _enrichment: Enrichment) -> Result<DiagnosticRecord, StoreError> {
        Err(StoreError::NotFound(fingerprint.to_string()))
    }
    fn len(&self) -> usize {
        0
    }
}

#[test]
fn store_failures_are_counted_not_raised() {
    let ing = ingestor(Arc::new(BrokenStore), eager_learner());
    assert!(matches!(ing.process_block("app", NPE), BlockOutcome::Failed));
    let snap = ing.stats().snapshot();
    assert_eq!(snap.store_failures, 1);
    assert_eq!(snap.created, 0);
}
