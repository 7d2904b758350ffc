use crate::model::{Category, DiagnosticRecord, Status};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Conjunctive record filter. Empty criteria match everything.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    categories: HashSet<Category>,
    statuses: HashSet<Status>,
    sources: HashSet<String>,
    keywords: Vec<String>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    min_occurrences: u64,
    active_only: bool,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: Category) -> Self {
        self.categories.insert(category);
        self
    }

    pub fn categories(mut self, categories: impl IntoIterator<Item = Category>) -> Self {
        self.categories.extend(categories);
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.statuses.insert(status);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.sources.insert(source.into());
        self
    }

    /// Case-insensitive; every keyword must appear somewhere in the record.
    pub fn keyword(mut self, keyword: impl AsRef<str>) -> Self {
        let kw = keyword.as_ref().trim().to_lowercase();
        if !kw.is_empty() {
            self.keywords.push(kw);
        }
        self
    }

    pub fn since(mut self, at: DateTime<Utc>) -> Self {
        self.since = Some(at);
        self
    }

    pub fn until(mut self, at: DateTime<Utc>) -> Self {
        self.until = Some(at);
        self
    }

    pub fn min_occurrences(mut self, n: u64) -> Self {
        self.min_occurrences = n;
        self
    }

    pub fn active_only(mut self) -> Self {
        self.active_only = true;
        self
    }

    pub fn accept(&self, record: &DiagnosticRecord) -> bool {
        if !self.categories.is_empty() && !self.categories.contains(&record.category()) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&record.status()) {
            return false;
        }
        if !self.sources.is_empty() && !self.sources.contains(record.source_name()) {
            return false;
        }
        if self.since.is_some_and(|t| record.last_seen() < t) || self.until.is_some_and(|t| record.last_seen() > t) {
            return false;
        }
        if record.occurrence_count() < self.min_occurrences {
            return false;
        }
        if self.active_only && !record.status().is_active() {
            return false;
        }
        if self.keywords.is_empty() {
            return true;
        }
        let haystack = [
            record.summary(),
            record.message(),
            record.exception_class().unwrap_or_default(),
            record.raw_text(),
        ]
        .join("\n")
        .to_lowercase();
        self.keywords.iter().all(|kw| haystack.contains(kw.as_str()))
    }

    pub fn apply(&self, records: &[DiagnosticRecord]) -> Vec<DiagnosticRecord> {
        records.iter().filter(|r| self.accept(r)).cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    LastSeen,
    FirstSeen,
    Occurrences,
    Severity,
}

/// Stable sort; equal keys fall back to fingerprint order.
pub fn sort_records(records: &mut [DiagnosticRecord], key: SortKey, descending: bool) {
    records.sort_by(|a, b| {
        let ord = match key {
            SortKey::LastSeen => a.last_seen().cmp(&b.last_seen()),
            SortKey::FirstSeen => a.first_seen().cmp(&b.first_seen()),
            SortKey::Occurrences => a.occurrence_count().cmp(&b.occurrence_count()),
            SortKey::Severity => a.severity().cmp(&b.severity()),
        };
        let ord = if descending { ord.reverse() } else { ord };
        ord.then_with(|| a.fingerprint().cmp(b.fingerprint()))
    });
}
