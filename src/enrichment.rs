use crate::model::{Category, DiagnosticRecord, Enrichment};
use chrono::Utc;
use thiserror::Error;
use tracing::warn;

pub const FALLBACK_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("analysis service unavailable: {0}")]
    Unavailable(String),
    #[error("malformed analysis response: {0}")]
    Malformed(String),
}

/// External analysis collaborator. Best effort only.
pub trait Enricher: Send + Sync {
    fn name(&self) -> &str;
    fn analyze(&self, record: &DiagnosticRecord) -> Result<Enrichment, EnrichmentError>;
}

/// Canned per-category advice, used when no analyzer is reachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticAdvisor;

impl StaticAdvisor {
    pub const NAME: &'static str = "static-advisor";

    pub fn advise(&self, record: &DiagnosticRecord) -> Enrichment {
        let subject = record.exception_class().unwrap_or("error");
        Enrichment {
            analysis: format!("{} in {} ({})", subject, record.source_name(), category_hint(record.category())),
            solution: category_solution(record.category()).to_string(),
            confidence: FALLBACK_CONFIDENCE,
            analyzer: Self::NAME.to_string(),
            analyzed_at: Utc::now(),
        }
    }
}

impl Enricher for StaticAdvisor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn analyze(&self, record: &DiagnosticRecord) -> Result<Enrichment, EnrichmentError> {
        Ok(self.advise(record))
    }
}

fn category_hint(category: Category) -> &'static str {
    match category {
        Category::Database => "database access failure",
        Category::Network => "network connectivity failure",
        Category::HttpClient => "outbound HTTP call rejected",
        Category::HttpServer => "remote service returned a server error",
        Category::Framework => "framework startup or wiring failure",
        Category::Validation => "input failed validation",
        Category::DependencyInjection => "bean wiring failure",
        Category::Timeout => "operation exceeded its deadline",
        Category::Cache => "cache backend failure",
        Category::Messaging => "message broker failure",
        Category::Serialization => "payload could not be (de)serialized",
        Category::Security => "authentication or authorization failure",
        Category::Compilation => "build or compilation failure",
        Category::Memory => "memory exhaustion",
        Category::Io => "file or stream I/O failure",
        Category::Concurrency => "thread coordination failure",
        Category::Configuration => "configuration or classpath problem",
        Category::Runtime => "runtime programming error",
        Category::Unknown => "unclassified failure",
    }
}

fn category_solution(category: Category) -> &'static str {
    match category {
        Category::Database => "Check the connection settings and credentials, confirm the database is reachable, then review the failing SQL and schema.",
        Category::Network => "Verify the host and port, DNS resolution, and any firewall or proxy between the services.",
        Category::HttpClient => "Inspect the request URL, headers, and payload; a 4xx status means the caller must change the request.",
        Category::HttpServer => "Check the remote service logs and health; retry with backoff if the failure is transient.",
        Category::Framework => "Read the first error in the startup report and check application properties and auto-configuration.",
        Category::Validation => "Compare the rejected input against the declared constraints and return a clear message to the caller.",
        Category::DependencyInjection => "Make sure the missing bean is declared and scanned, and break any constructor injection cycle.",
        Category::Timeout => "Measure the slow dependency, then raise the timeout or add retries and circuit breaking.",
        Category::Cache => "Confirm the cache server is up and the serializer matches the cached types.",
        Category::Messaging => "Check broker connectivity, topic or queue names, and consumer group configuration.",
        Category::Serialization => "Align the payload with the target type and check field names, date formats, and unknown properties.",
        Category::Security => "Check credentials, token expiry, granted roles, and TLS certificates.",
        Category::Compilation => "Fix the reported source location and rebuild with a clean workspace.",
        Category::Memory => "Capture a heap dump, look for unbounded collections or recursion, and size the heap for the workload.",
        Category::Io => "Check that the path exists and is readable, and that the disk is not full.",
        Category::Concurrency => "Review shared state for unsynchronized mutation and size thread pools for the load.",
        Category::Configuration => "Verify the referenced properties and classpath entries exist for the active profile.",
        Category::Runtime => "Follow the top frame to the failing line and guard the invalid value before it is used.",
        Category::Unknown => "Read the full block and its first cause to locate the failing component.",
    }
}

/// Runs the enricher, falling back to static advice on any failure.
pub fn enrich_or_fallback(enricher: &dyn Enricher, record: &DiagnosticRecord) -> Enrichment {
    match enricher.analyze(record) {
        Ok(enrichment) => enrichment,
        Err(e) => {
            warn!(analyzer = enricher.name(), fingerprint = record.fingerprint(), error = %e, "enrichment failed, using static advice");
            StaticAdvisor.advise(record)
        }
    }
}
