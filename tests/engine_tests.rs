use faultscope::enrichment::{EnrichmentError, Enricher, FALLBACK_CONFIDENCE, StaticAdvisor};
use faultscope::model::{Category, DiagnosticRecord, Enrichment, Status};
use faultscope::store::{MemoryStore, RecordStore, StoreError};
use faultscope::{Channel, Engine, EngineConfig};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const NPE: &str = "NullPointerException: x is null\n at pkg.Bar.baz(Bar.java:10)\n at pkg.Main.main(Main.java:5)\n";
const WAIT: Duration = Duration::from_secs(5);

fn test_config() -> EngineConfig {
    EngineConfig {
        idle_flush_ms: 200,
        idle_check_interval_ms: 50,
        workers: 2,
        dispose_grace_ms: 500,
        shutdown_grace_ms: 2_000,
        ..EngineConfig::default()
    }
}

fn all_records(engine: &Engine) -> Vec<DiagnosticRecord> {
    engine.store().query_recent(1)
}

fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    cond()
}

#[test]
fn stack_trace_becomes_a_record() {
    let engine = Engine::new(test_config()).unwrap();
    engine.feed("app", "12:00:01 INFO booting\n", Channel::Primary);
    // split mid-line to exercise partial handling
    let (a, b) = NPE.split_at(20);
    engine.feed("app", a, Channel::Primary);
    engine.feed("app", b, Channel::Primary);
    engine.source_ended("app");
    assert!(engine.wait_idle(WAIT));

    let records = all_records(&engine);
    assert_eq!(records.len(), 1);
    let rec = &records[0];
    assert_eq!(rec.category(), Category::Runtime);
    assert_eq!(rec.exception_class(), Some("NullPointerException"));
    assert_eq!(rec.top_frame().map(|f| f.function.as_str()), Some("baz"));
    assert_eq!(rec.source_name(), "app");
    assert_eq!(engine.active_sources(), 0);
}

#[test]
fn repeated_blocks_merge() {
    let engine = Engine::new(test_config()).unwrap();
    engine.feed("app", &format!("{NPE}\n{NPE}\n"), Channel::Primary);
    engine.source_ended("app");
    assert!(engine.wait_idle(WAIT));

    let records = all_records(&engine);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].occurrence_count(), 2);
    let stats = engine.stats();
    assert_eq!(stats.ingest.created, 1);
    assert_eq!(stats.ingest.merged, 1);
    assert_eq!(stats.records, 1);
}

#[test]
fn oversized_block_is_cut_and_tail_skipped() {
    let engine = Engine::new(EngineConfig { max_block_bytes: 512, ..test_config() }).unwrap();
    let mut text = String::from("java.lang.IllegalStateException: boom\n");
    for i in 0..100 {
        text.push_str(&format!("\tat pkg.Worker.step{i}(Worker.java:{i})\n"));
    }
    engine.feed("big", &text, Channel::Primary);
    engine.source_ended("big");
    assert!(engine.wait_idle(WAIT));

    let stats = engine.stats();
    assert_eq!(stats.ingest.blocks, 1);
    let records = all_records(&engine);
    assert_eq!(records.len(), 1);
    assert!(records[0].raw_text().len() <= 512);
    assert_eq!(records[0].exception_class(), Some("java.lang.IllegalStateException"));
}

#[test]
fn idle_sources_flush_on_their_own() {
    let engine = Engine::new(test_config()).unwrap();
    engine.feed("quiet", NPE, Channel::Primary);
    assert!(wait_for(|| engine.store().len() == 1));
    // the source stays registered after an idle flush
    assert_eq!(engine.active_sources(), 1);
}

#[test]
fn secondary_channel_blocks_are_classified_too() {
    let engine = Engine::new(test_config()).unwrap();
    engine.feed("svc", "starting up on port 8080\n", Channel::Secondary);
    engine.source_ended("svc");
    assert!(engine.wait_idle(WAIT));
    let stats = engine.stats();
    assert_eq!(stats.ingest.blocks, 1);
    assert_eq!(stats.ingest.ignored, 1);
    assert!(engine.store().is_empty());
}

#[test]
fn least_recently_fed_source_is_evicted_and_flushed() {
    let engine = Engine::new(EngineConfig { max_sources: 2, ..test_config() }).unwrap();
    for name in ["a", "b", "c"] {
        let block = format!("java.lang.IllegalStateException: failed in {name}\n\tat pkg.S.run(S.java:1)\n");
        engine.feed(name, &block, Channel::Primary);
    }
    assert_eq!(engine.active_sources(), 2);
    assert!(engine.wait_idle(WAIT));
    let records = all_records(&engine);
    assert!(records.iter().any(|r| r.source_name() == "a"));
}

#[test]
fn transitions_invalidate_cached_aggregates() {
    let engine = Engine::new(test_config()).unwrap();
    engine.feed("app", NPE, Channel::Primary);
    engine.source_ended("app");
    assert!(engine.wait_idle(WAIT));
    let fp = all_records(&engine)[0].fingerprint().to_string();

    assert_eq!(engine.aggregator().resolution_rate(7).percentage, "0.0%");
    assert!(matches!(engine.transition(&fp, Status::Resolved), Err(StoreError::Transition(_))));
    engine.transition(&fp, Status::InProgress).unwrap();
    let resolved = engine.transition(&fp, Status::Resolved).unwrap();
    assert_eq!(resolved.status(), Status::Resolved);
    assert_eq!(engine.aggregator().resolution_rate(7).percentage, "100.0%");
}

#[test]
fn on_demand_enrichment_uses_static_advice() {
    let engine = Engine::new(test_config()).unwrap();
    engine.feed("app", NPE, Channel::Primary);
    engine.source_ended("app");
    assert!(engine.wait_idle(WAIT));
    let fp = all_records(&engine)[0].fingerprint().to_string();

    let enriched = engine.enrich(&fp).unwrap();
    let enrichment = enriched.enrichment().unwrap();
    assert_eq!(enrichment.analyzer, StaticAdvisor::NAME);
    assert_eq!(enrichment.confidence, FALLBACK_CONFIDENCE);
    assert!(matches!(engine.enrich("nope"), Err(StoreError::NotFound(_))));
}

struct Unreachable;

impl Enricher for Unreachable {
    fn name(&self) -> &str {
        "unreachable"
    }

    fn analyze(&self, _record: &DiagnosticRecord) -> Result<Enrichment, EnrichmentError> {
        Err(EnrichmentError::Unavailable("connection refused".into()))
    }
}

#[test]
fn failing_enricher_falls_back_for_new_records() {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::builder(EngineConfig { enrich_new_records: true, ..test_config() })
        .store(store.clone())
        .enricher(Arc::new(Unreachable))
        .build()
        .unwrap();
    engine.feed("app", NPE, Channel::Primary);
    engine.source_ended("app");
    assert!(engine.wait_idle(WAIT));

    let rec = &store.all()[0];
    assert_eq!(rec.enrichment().map(|e| e.analyzer.as_str()), Some(StaticAdvisor::NAME));
}

#[test]
fn shutdown_flushes_and_then_refuses_input() {
    let engine = Engine::new(test_config()).unwrap();
    engine.feed("app", NPE, Channel::Primary);
    engine.shutdown();
    assert_eq!(engine.store().len(), 1);
    assert_eq!(engine.active_sources(), 0);

    engine.feed("app", "java.lang.IllegalStateException: late\n", Channel::Primary);
    engine.shutdown();
    assert_eq!(engine.store().len(), 1);
    assert_eq!(engine.active_sources(), 0);
}

#[test]
fn invalid_config_is_rejected_at_build() {
    assert!(Engine::new(EngineConfig { queue_capacity: 0, ..test_config() }).is_err());
}
