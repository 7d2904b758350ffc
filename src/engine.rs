use crate::aggregation::Aggregator;
use crate::boundary::Channel;
use crate::classifier::Classifier;
use crate::config::{ConfigError, EngineConfig};
use crate::enrichment::{enrich_or_fallback, Enricher, StaticAdvisor};
use crate::ingest::{IngestSnapshot, Ingestor};
use crate::learner::PatternLearner;
use crate::model::{DiagnosticRecord, Status};
use crate::monitor::{Dispatch, MonitorConfig, SourceMonitor};
use crate::scheduler::PeriodicTask;
use crate::store::{MemoryStore, RecordStore, StoreError};
use crate::workers::{Handler, Job, PoolConfig, Submitted, WorkerPool};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to start background thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub ingest: IngestSnapshot,
    pub active_sources: usize,
    pub records: usize,
    pub patterns: usize,
    pub high_confidence_patterns: usize,
    pub cached_queries: usize,
}

pub struct EngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn RecordStore>>,
    classifier: Option<Classifier>,
    enricher: Option<Arc<dyn Enricher>>,
}

impl EngineBuilder {
    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        let config = self.config;
        config.validate()?;
        let max_sources = NonZeroUsize::new(config.max_sources)
            .ok_or_else(|| ConfigError::Invalid("max_sources must be greater than zero".into()))?;

        let store: Arc<dyn RecordStore> = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let learner = Arc::new(PatternLearner::new(config.learner()));
        let mut ingestor = Ingestor::new(self.classifier.unwrap_or_default(), store.clone(), learner.clone());
        if let Some(enricher) = self.enricher.clone() {
            ingestor = ingestor.with_enricher(enricher, config.enrich_new_records);
        }
        let ingestor = Arc::new(ingestor);

        let handler_ingestor = ingestor.clone();
        let handler: Handler = Arc::new(move |job: Job| {
            handler_ingestor.process_block(&job.source, &job.text);
        });
        let pool = Arc::new(WorkerPool::new(
            PoolConfig {
                workers: config.workers,
                queue_capacity: config.queue_capacity,
                submit_wait: config.submit_wait(),
            },
            handler,
        )?);
        let aggregator = Arc::new(Aggregator::new(store.clone(), config.cache_ttl()));

        let mut background = Vec::with_capacity(2);
        let refresh_aggregator = aggregator.clone();
        background.push(PeriodicTask::spawn("faultscope-cache-refresh", config.cache_refresh(), move || {
            let evicted = refresh_aggregator.evict_expired();
            if evicted > 0 {
                debug!(evicted, "expired aggregation cache entries");
            }
        })?);
        let (retrain_store, retrain_learner, window) = (store.clone(), learner.clone(), config.learner_window_days);
        background.push(PeriodicTask::spawn("faultscope-retrain", config.retrain_interval(), move || {
            retrain_learner.retrain(&retrain_store.query_recent(window));
        })?);

        info!(workers = config.workers, max_sources = config.max_sources, "engine started");
        Ok(Engine {
            config,
            store,
            learner,
            ingestor,
            pool,
            aggregator,
            enricher: self.enricher,
            sources: Mutex::new(LruCache::new(max_sources)),
            background: Mutex::new(background),
            closed: AtomicBool::new(false),
        })
    }
}

/// The whole pipeline: per-source boundary detection feeding a worker
/// pool that classifies, dedups and learns.
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn RecordStore>,
    learner: Arc<PatternLearner>,
    ingestor: Arc<Ingestor>,
    pool: Arc<WorkerPool>,
    aggregator: Arc<Aggregator>,
    enricher: Option<Arc<dyn Enricher>>,
    sources: Mutex<LruCache<String, Arc<SourceMonitor>>>,
    background: Mutex<Vec<PeriodicTask>>,
    closed: AtomicBool,
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder { config, store: None, classifier: None, enricher: None }
    }

    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn learner(&self) -> &Arc<PatternLearner> {
        &self.learner
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    fn dispatch(&self) -> Dispatch {
        let pool = self.pool.clone();
        let ingestor = self.ingestor.clone();
        Arc::new(move |source: &str, text: String| {
            let job = Job { source: source.to_string(), text };
            if pool.submit(job) == Submitted::Inline {
                ingestor.stats().record_inline_fallback();
            }
        })
    }

    fn monitor_for(&self, source: &str) -> Result<Arc<SourceMonitor>, EngineError> {
        let (monitor, evicted) = {
            let mut sources = self.sources.lock();
            if let Some(m) = sources.get(source) {
                return Ok(m.clone());
            }
            let monitor = Arc::new(SourceMonitor::start(
                source,
                MonitorConfig {
                    max_block_bytes: self.config.max_block_bytes,
                    idle_timeout: self.config.idle_flush(),
                    check_interval: self.config.idle_check_interval(),
                    dispose_grace: self.config.dispose_grace(),
                },
                self.dispatch(),
            )?);
            let evicted = sources.push(source.to_string(), monitor.clone());
            (monitor, evicted)
        };
        if let Some((name, old)) = evicted {
            info!(source = %name, "source limit reached; disposing least recently fed source");
            old.dispose();
        }
        Ok(monitor)
    }

    /// Hands one chunk of output to the source's boundary detector.
    pub fn feed(&self, source: &str, chunk: &str, channel: Channel) {
        if self.closed.load(Ordering::SeqCst) {
            warn!(source, "engine is shut down; chunk ignored");
            return;
        }
        // A monitor evicted between lookup and feed refuses the chunk; retry once on a fresh one.
        for _ in 0..2 {
            match self.monitor_for(source) {
                Ok(monitor) if monitor.feed(chunk, channel) => return,
                Ok(stale) => {
                    let mut sources = self.sources.lock();
                    if sources.peek(source).is_some_and(|m| Arc::ptr_eq(m, &stale)) {
                        sources.pop(source);
                    }
                }
                Err(e) => {
                    warn!(source, error = %e, "could not start source monitor");
                    return;
                }
            }
        }
        warn!(source, "source monitor unavailable; chunk ignored");
    }

    /// The source's stream closed: flush whatever it still holds.
    pub fn source_ended(&self, source: &str) {
        let monitor = self.sources.lock().pop(source);
        if let Some(monitor) = monitor {
            monitor.dispose();
            info!(source, "source ended");
        }
    }

    /// Force-flushes every source's pending text without disposing it.
    pub fn flush(&self) {
        let monitors: Vec<_> = self.sources.lock().iter().map(|(_, m)| m.clone()).collect();
        for m in monitors {
            m.flush();
        }
    }

    pub fn active_sources(&self) -> usize {
        self.sources.lock().len()
    }

    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.pool.wait_idle(timeout)
    }

    pub fn transition(&self, fingerprint: &str, status: Status) -> Result<DiagnosticRecord, StoreError> {
        let record = self.store.transition(fingerprint, status)?;
        self.aggregator.clear();
        info!(fingerprint, ?status, "record status changed");
        Ok(record)
    }

    /// Attaches analysis from the configured enricher, or static advice.
    pub fn enrich(&self, fingerprint: &str) -> Result<DiagnosticRecord, StoreError> {
        let record = self
            .store
            .find_by_fingerprint(fingerprint)
            .ok_or_else(|| StoreError::NotFound(fingerprint.to_string()))?;
        let enrichment = match &self.enricher {
            Some(enricher) => enrich_or_fallback(enricher.as_ref(), &record),
            None => StaticAdvisor.advise(&record),
        };
        self.store.attach_enrichment(fingerprint, enrichment)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            ingest: self.ingestor.stats().snapshot(),
            active_sources: self.active_sources(),
            records: self.store.len(),
            patterns: self.learner.pattern_count(),
            high_confidence_patterns: self.learner.high_confidence_count(),
            cached_queries: self.aggregator.cache().len(),
        }
    }

    /// Flushes and disposes every source, stops background tasks, then
    /// drains the worker pool. Each step is bounded. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let monitors: Vec<_> = {
            let mut sources = self.sources.lock();
            let mut out = Vec::with_capacity(sources.len());
            while let Some((_, m)) = sources.pop_lru() {
                out.push(m);
            }
            out
        };
        for m in monitors {
            m.dispose();
        }
        let grace = self.config.shutdown_grace();
        for mut task in std::mem::take(&mut *self.background.lock()) {
            if !task.stop(grace) {
                warn!(task = task.name(), "background task force-cancelled");
            }
        }
        if !self.pool.shutdown(grace) {
            warn!("worker pool force-cancelled");
        }
        info!(records = self.store.len(), "engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
