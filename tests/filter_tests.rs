use chrono::{Duration, Utc};
use faultscope::filter::{sort_records, RecordFilter, SortKey};
use faultscope::model::{Category, DiagnosticRecord, Severity, Status};

fn rec(source: &str, class: &str, category: Category, hours_ago: i64) -> DiagnosticRecord {
    DiagnosticRecord::builder(source, category)
        .exception_class(class)
        .message("Request to payments failed")
        .severity(Severity::Error)
        .observed_at(Utc::now() - Duration::hours(hours_ago))
        .build()
        .unwrap()
}

fn sample() -> Vec<DiagnosticRecord> {
    vec![
        rec("api", "a.DbException", Category::Database, 1),
        rec("api", "a.NetException", Category::Network, 30).with_occurrence(Utc::now()),
        rec("worker", "a.CacheException", Category::Cache, 5)
            .with_status(Status::InProgress)
            .unwrap()
            .with_status(Status::Resolved)
            .unwrap(),
    ]
}

#[test]
fn empty_filter_accepts_everything() {
    assert_eq!(RecordFilter::new().apply(&sample()).len(), 3);
}

#[test]
fn criteria_combine_conjunctively() {
    let records = sample();
    let by_source = RecordFilter::new().source("api").apply(&records);
    assert_eq!(by_source.len(), 2);

    let db_api = RecordFilter::new().source("api").category(Category::Database).apply(&records);
    assert_eq!(db_api.len(), 1);
    assert_eq!(db_api[0].exception_class(), Some("a.DbException"));

    let active = RecordFilter::new().active_only().apply(&records);
    assert!(active.iter().all(|r| r.status() != Status::Resolved));
    assert_eq!(active.len(), 2);

    let resolved = RecordFilter::new().status(Status::Resolved).apply(&records);
    assert_eq!(resolved.len(), 1);
}

#[test]
fn keywords_are_case_insensitive() {
    let records = sample();
    assert_eq!(RecordFilter::new().keyword("PAYMENTS").apply(&records).len(), 3);
    assert_eq!(RecordFilter::new().keyword("netexception").apply(&records).len(), 1);
    assert_eq!(RecordFilter::new().keyword("payments").keyword("nothing-like-this").apply(&records).len(), 0);
}

#[test]
fn time_window_and_occurrences() {
    let records = sample();
    // the network record was merged just now, so its last sighting is recent
    let last_day = RecordFilter::new().since(Utc::now() - Duration::hours(24)).apply(&records);
    assert_eq!(last_day.len(), 3);
    let older = RecordFilter::new().until(Utc::now() - Duration::hours(2)).apply(&records);
    assert_eq!(older.len(), 1);
    assert_eq!(older[0].category(), Category::Cache);
    assert_eq!(RecordFilter::new().min_occurrences(2).apply(&records).len(), 1);
}

#[test]
fn sorting_by_occurrences_and_first_seen() {
    let mut records = sample();
    sort_records(&mut records, SortKey::Occurrences, true);
    assert_eq!(records[0].occurrence_count(), 2);

    sort_records(&mut records, SortKey::FirstSeen, false);
    assert_eq!(records[0].exception_class(), Some("a.NetException"));
    assert_eq!(records[2].exception_class(), Some("a.DbException"));
}
