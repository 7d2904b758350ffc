use crate::model::{DiagnosticRecord, Enrichment, Status, TransitionError};
use ahash::AHashMap;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no record with fingerprint {0}")]
    NotFound(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Outcome of an upsert: the stored record and whether it was new.
#[derive(Debug, Clone)]
pub struct Upserted {
    pub record: DiagnosticRecord,
    pub created: bool,
}

/// Storage contract consumed by the pipeline. Implementations must make
/// `upsert` atomic per fingerprint.
pub trait RecordStore: Send + Sync {
    fn save(&self, record: DiagnosticRecord) -> Result<(), StoreError>;
    fn upsert(&self, candidate: DiagnosticRecord) -> Result<Upserted, StoreError>;
    fn find_by_fingerprint(&self, fingerprint: &str) -> Option<DiagnosticRecord>;
    fn query_recent(&self, days: u32) -> Vec<DiagnosticRecord>;
    fn cleanup_older_than(&self, days: u32) -> usize;
    fn transition(&self, fingerprint: &str, status: Status) -> Result<DiagnosticRecord, StoreError>;
    fn attach_enrichment(&self, fingerprint: &str, enrichment: Enrichment) -> Result<DiagnosticRecord, StoreError>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<AHashMap<String, DiagnosticRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<DiagnosticRecord> {
        let mut out: Vec<_> = self.records.read().values().cloned().collect();
        out.sort_by(|a, b| b.last_seen().cmp(&a.last_seen()));
        out
    }

    fn recent_since(&self, cutoff: DateTime<Utc>) -> Vec<DiagnosticRecord> {
        let mut out: Vec<_> = self
            .records
            .read()
            .values()
            .filter(|r| r.last_seen() >= cutoff)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.last_seen().cmp(&a.last_seen()).then_with(|| a.fingerprint().cmp(b.fingerprint())));
        out
    }

    fn update<F>(&self, fingerprint: &str, f: F) -> Result<DiagnosticRecord, StoreError>
    where
        F: FnOnce(&DiagnosticRecord) -> Result<DiagnosticRecord, StoreError>,
    {
        let mut map = self.records.write();
        let slot = map
            .get_mut(fingerprint)
            .ok_or_else(|| StoreError::NotFound(fingerprint.to_string()))?;
        let next = f(slot)?;
        *slot = next.clone();
        Ok(next)
    }
}

impl RecordStore for MemoryStore {
    fn save(&self, record: DiagnosticRecord) -> Result<(), StoreError> {
        self.records.write().insert(record.fingerprint().to_string(), record);
        Ok(())
    }

    fn upsert(&self, candidate: DiagnosticRecord) -> Result<Upserted, StoreError> {
        // Read-modify-write under one write guard: no lost increments.
        let mut map = self.records.write();
        match map.get_mut(candidate.fingerprint()) {
            Some(existing) => {
                let merged = existing.with_occurrence(candidate.last_seen());
                *existing = merged.clone();
                Ok(Upserted { record: merged, created: false })
            }
            None => {
                map.insert(candidate.fingerprint().to_string(), candidate.clone());
                Ok(Upserted { record: candidate, created: true })
            }
        }
    }

    fn find_by_fingerprint(&self, fingerprint: &str) -> Option<DiagnosticRecord> {
        self.records.read().get(fingerprint).cloned()
    }

    fn query_recent(&self, days: u32) -> Vec<DiagnosticRecord> {
        self.recent_since(Utc::now() - Duration::days(i64::from(days)))
    }

    fn cleanup_older_than(&self, days: u32) -> usize {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let mut map = self.records.write();
        let before = map.len();
        map.retain(|_, r| r.last_seen() >= cutoff);
        before - map.len()
    }

    fn transition(&self, fingerprint: &str, status: Status) -> Result<DiagnosticRecord, StoreError> {
        self.update(fingerprint, |r| Ok(r.with_status(status)?))
    }

    fn attach_enrichment(&self, fingerprint: &str, enrichment: Enrichment) -> Result<DiagnosticRecord, StoreError> {
        self.update(fingerprint, |r| Ok(r.with_enrichment(enrichment)))
    }

    fn len(&self) -> usize {
        self.records.read().len()
    }
}
