use crate::fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const SUMMARY_LINE_MAX: usize = 200;
const RAW_TEXT_MAX: usize = 8_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Database,
    Network,
    HttpClient,
    HttpServer,
    Framework,
    Validation,
    DependencyInjection,
    Timeout,
    Cache,
    Messaging,
    Serialization,
    Security,
    Compilation,
    Memory,
    Io,
    Concurrency,
    Configuration,
    Runtime,
    Unknown,
}

impl Category {
    pub const ALL: [Category; 19] = [
        Category::Database,
        Category::Network,
        Category::HttpClient,
        Category::HttpServer,
        Category::Framework,
        Category::Validation,
        Category::DependencyInjection,
        Category::Timeout,
        Category::Cache,
        Category::Messaging,
        Category::Serialization,
        Category::Security,
        Category::Compilation,
        Category::Memory,
        Category::Io,
        Category::Concurrency,
        Category::Configuration,
        Category::Runtime,
        Category::Unknown,
    ];

    /// Upper-case tag shown in brackets at the start of a summary.
    pub fn tag(self) -> &'static str {
        match self {
            Category::Database => "DATABASE",
            Category::Network => "NETWORK",
            Category::HttpClient => "HTTP_CLIENT",
            Category::HttpServer => "HTTP_SERVER",
            Category::Framework => "FRAMEWORK",
            Category::Validation => "VALIDATION",
            Category::DependencyInjection => "DEPENDENCY_INJECTION",
            Category::Timeout => "TIMEOUT",
            Category::Cache => "CACHE",
            Category::Messaging => "MESSAGING",
            Category::Serialization => "SERIALIZATION",
            Category::Security => "SECURITY",
            Category::Compilation => "COMPILATION",
            Category::Memory => "MEMORY",
            Category::Io => "IO",
            Category::Concurrency => "CONCURRENCY",
            Category::Configuration => "CONFIGURATION",
            Category::Runtime => "RUNTIME",
            Category::Unknown => "UNKNOWN",
        }
    }

    pub fn is_severe(self) -> bool {
        matches!(
            self,
            Category::Database | Category::Memory | Category::Security | Category::HttpServer
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unknown,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Keyword scan, highest priority first.
    pub fn scan(text: &str) -> Severity {
        let lower = text.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        if has(&["fatal", "outofmemory", "out of memory", "stackoverflow", "critical"]) {
            Severity::Critical
        } else if has(&["error", "exception"]) {
            Severity::Error
        } else if has(&["warning", "warn"]) {
            Severity::Warning
        } else if has(&["info", "debug"]) {
            Severity::Info
        } else {
            Severity::Unknown
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
            Severity::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    New,
    InProgress,
    Resolved,
    Closed,
    Reopened,
    Ignored,
    Duplicate,
    WontFix,
    NeedsReview,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid status transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: Status,
    pub to: Status,
}

impl Status {
    pub fn is_completed(self) -> bool {
        matches!(self, Status::Resolved | Status::Closed | Status::Ignored | Status::WontFix)
    }

    pub fn is_active(self) -> bool {
        matches!(self, Status::New | Status::InProgress | Status::Reopened | Status::NeedsReview)
    }

    pub fn is_terminal(self) -> bool {
        self.is_completed() || self == Status::Duplicate
    }

    pub fn is_resolved(self) -> bool {
        matches!(self, Status::Resolved | Status::Closed)
    }

    pub fn can_transition_to(self, next: Status) -> bool {
        use Status::*;
        if self == next {
            return false;
        }
        match self {
            New => matches!(next, InProgress | NeedsReview),
            // Reopened is worked exactly like InProgress.
            InProgress | Reopened => next.is_terminal() || next == NeedsReview,
            NeedsReview => next == InProgress || next.is_terminal(),
            Resolved | Closed | Ignored | WontFix | Duplicate => next == Reopened,
        }
    }

    pub fn transition(self, next: Status) -> Result<Status, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError { from: self, to: next })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackFrame {
    pub module: String,
    pub function: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

impl StackFrame {
    pub fn new(module: impl Into<String>, function: impl Into<String>, location: impl Into<String>) -> Self {
        Self { module: module.into(), function: function.into(), location: location.into(), artifact: None }
    }

    pub fn is_platform(&self, prefixes: &[&str]) -> bool {
        prefixes.iter().any(|p| self.module.starts_with(p))
    }

    /// `module.function`, the call-site identity used by fingerprints.
    pub fn call_site(&self) -> String {
        format!("{}.{}", self.module, self.function)
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.module, self.function, self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub analysis: String,
    pub solution: String,
    pub confidence: f64,
    pub analyzer: String,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record is missing a source name")]
    MissingSource,
    #[error("record needs an exception class or a message")]
    MissingIdentity,
}

/// One logical error, merged across every occurrence sharing its fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    id: String,
    source_name: String,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    category: Category,
    severity: Severity,
    exception_class: Option<String>,
    message: String,
    summary: String,
    stack_frames: Vec<StackFrame>,
    cause_chain: Vec<String>,
    top_frame: Option<StackFrame>,
    fingerprint: String,
    occurrence_count: u64,
    status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    enrichment: Option<Enrichment>,
    raw_text: String,
}

impl DiagnosticRecord {
    pub fn builder(source_name: impl Into<String>, category: Category) -> DiagnosticRecordBuilder {
        DiagnosticRecordBuilder::new(source_name, category)
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn source_name(&self) -> &str { &self.source_name }
    pub fn first_seen(&self) -> DateTime<Utc> { self.first_seen }
    pub fn last_seen(&self) -> DateTime<Utc> { self.last_seen }
    pub fn category(&self) -> Category { self.category }
    pub fn severity(&self) -> Severity { self.severity }
    pub fn exception_class(&self) -> Option<&str> { self.exception_class.as_deref() }
    pub fn message(&self) -> &str { &self.message }
    pub fn summary(&self) -> &str { &self.summary }
    pub fn stack_frames(&self) -> &[StackFrame] { &self.stack_frames }
    pub fn cause_chain(&self) -> &[String] { &self.cause_chain }
    pub fn top_frame(&self) -> Option<&StackFrame> { self.top_frame.as_ref() }
    pub fn fingerprint(&self) -> &str { &self.fingerprint }
    pub fn occurrence_count(&self) -> u64 { self.occurrence_count }
    pub fn status(&self) -> Status { self.status }
    pub fn enrichment(&self) -> Option<&Enrichment> { self.enrichment.as_ref() }
    pub fn raw_text(&self) -> &str { &self.raw_text }

    pub fn root_cause(&self) -> Option<String> {
        if let Some(last) = self.cause_chain.last() {
            return Some(last.clone());
        }
        self.exception_class.as_ref().map(|c| {
            if self.message.is_empty() { c.clone() } else { format!("{c}: {}", self.message) }
        })
    }

    pub fn with_status(&self, status: Status) -> Result<Self, TransitionError> {
        let next = self.status.transition(status)?;
        Ok(Self { status: next, ..self.clone() })
    }

    /// Re-observation: bumps the count and moves `last_seen` forward, never backward.
    pub fn with_occurrence(&self, at: DateTime<Utc>) -> Self {
        Self {
            occurrence_count: self.occurrence_count.saturating_add(1),
            last_seen: self.last_seen.max(at),
            ..self.clone()
        }
    }

    pub fn with_enrichment(&self, enrichment: Enrichment) -> Self {
        Self { enrichment: Some(enrichment), ..self.clone() }
    }

    /// Candidate-only: swaps the category before the record is first stored.
    pub fn reclassified(self, category: Category) -> Self {
        let summary = build_summary(category, &self.raw_text, &self.message, self.severity);
        Self { category, summary, ..self }
    }
}

pub const DEFAULT_PLATFORM_PREFIXES: &[&str] = &[
    "java.", "javax.", "jdk.", "sun.", "com.sun.", "kotlin.", "scala.", "jakarta.",
    "com.intellij.", "org.jetbrains.", "org.springframework.", "org.apache.", "io.netty.",
    "reactor.", "org.hibernate.", "com.fasterxml.", "okhttp3.", "feign.", "com.zaxxer.",
];

/// First frame outside the platform namespaces, else the first frame overall.
pub fn select_top_frame(frames: &[StackFrame], prefixes: &[&str]) -> Option<StackFrame> {
    frames
        .iter()
        .find(|f| !f.is_platform(prefixes))
        .or_else(|| frames.first())
        .cloned()
}

fn build_summary(category: Category, raw_text: &str, message: &str, severity: Severity) -> String {
    let first_line = raw_text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or(message);
    format!(
        "[{}] {} (Severity: {})",
        category.tag(),
        truncate_chars(first_line, SUMMARY_LINE_MAX),
        severity.label()
    )
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

pub struct DiagnosticRecordBuilder {
    source_name: String,
    category: Category,
    severity: Severity,
    observed_at: DateTime<Utc>,
    exception_class: Option<String>,
    message: String,
    stack_frames: Vec<StackFrame>,
    cause_chain: Vec<String>,
    raw_text: String,
    platform_prefixes: Vec<String>,
}

impl DiagnosticRecordBuilder {
    fn new(source_name: impl Into<String>, category: Category) -> Self {
        Self {
            source_name: source_name.into(),
            category,
            severity: Severity::Unknown,
            observed_at: Utc::now(),
            exception_class: None,
            message: String::new(),
            stack_frames: Vec::new(),
            cause_chain: Vec::new(),
            raw_text: String::new(),
            platform_prefixes: DEFAULT_PLATFORM_PREFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self { self.severity = severity; self }
    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self { self.observed_at = at; self }
    pub fn message(mut self, message: impl Into<String>) -> Self { self.message = message.into(); self }
    pub fn stack_frames(mut self, frames: Vec<StackFrame>) -> Self { self.stack_frames = frames; self }
    pub fn cause_chain(mut self, causes: Vec<String>) -> Self { self.cause_chain = causes; self }

    pub fn exception_class(mut self, class: impl Into<String>) -> Self {
        let class = class.into();
        self.exception_class = if class.trim().is_empty() { None } else { Some(class) };
        self
    }

    pub fn raw_text(mut self, text: &str) -> Self {
        self.raw_text = truncate_chars(text.trim(), RAW_TEXT_MAX);
        self
    }

    pub fn platform_prefixes(mut self, prefixes: &[&str]) -> Self {
        self.platform_prefixes = prefixes.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn build(self) -> Result<DiagnosticRecord, RecordError> {
        if self.source_name.trim().is_empty() {
            return Err(RecordError::MissingSource);
        }
        let message = self.message.trim().to_string();
        if self.exception_class.is_none() && message.is_empty() {
            return Err(RecordError::MissingIdentity);
        }
        let prefixes: Vec<&str> = self.platform_prefixes.iter().map(String::as_str).collect();
        let top_frame = select_top_frame(&self.stack_frames, &prefixes);
        let fingerprint = fingerprint::compute(self.exception_class.as_deref(), top_frame.as_ref(), &message);
        let raw_text = if self.raw_text.is_empty() { message.clone() } else { self.raw_text };
        let summary = build_summary(self.category, &raw_text, &message, self.severity);
        Ok(DiagnosticRecord {
            id: uuid::Uuid::new_v4().to_string(),
            source_name: self.source_name,
            first_seen: self.observed_at,
            last_seen: self.observed_at,
            category: self.category,
            severity: self.severity,
            exception_class: self.exception_class,
            message,
            summary,
            stack_frames: self.stack_frames,
            cause_chain: self.cause_chain,
            top_frame,
            fingerprint,
            occurrence_count: 1,
            status: Status::New,
            enrichment: None,
            raw_text,
        })
    }
}
