use std::fs;
use std::path::Path;

use logstore::{scan_with_dates, EventPayload, StoreError};

fn write_session(root: &Path, project: &str, session: &str, lines: &[&str]) {
    let dir = root.join(project);
    fs::create_dir_all(&dir).expect("create project dir");
    fs::write(dir.join(format!("{session}.jsonl")), lines.join("\n")).expect("write session file");
}

fn dates(list: &[&str]) -> Vec<String> {
    list.iter().map(|d| d.to_string()).collect()
}

#[test]
fn missing_root_is_fatal() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let missing = tmp.path().join("does-not-exist");
    let err = scan_with_dates(&missing, &dates(&["2025-01-01"]), None)
        .expect_err("missing root should fail");
    assert!(matches!(err, StoreError::Unreadable { .. }));
}

#[test]
fn empty_store_is_a_valid_empty_result() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let outcome = scan_with_dates(tmp.path(), &dates(&["2025-01-01"]), None).expect("scan");
    assert!(outcome.events.is_empty());
    assert_eq!(outcome.stats.files_scanned, 0);
    assert_eq!(outcome.stats.records_scanned, 0);
}

#[test]
fn malformed_lines_are_counted_not_fatal() {
    let tmp = tempfile::tempdir().expect("tempdir");
    write_session(
        tmp.path(),
        "proj-a",
        "s1",
        &[
            r#"{"timestamp":"2025-01-01T10:00:00Z","type":"assistant","message":{"usage":{"input_tokens":10,"output_tokens":5}}}"#,
            "this is not json",
            r#"{"type":"assistant","message":{"usage":{"input_tokens":1}}}"#,
            "",
        ],
    );
    let outcome = scan_with_dates(tmp.path(), &dates(&["2025-01-01"]), None).expect("scan");
    assert_eq!(outcome.stats.files_scanned, 1);
    assert_eq!(outcome.stats.records_scanned, 1);
    assert_eq!(outcome.stats.records_skipped, 2);
    assert_eq!(outcome.events.len(), 1);
}

#[test]
fn window_filters_by_calendar_date() {
    let tmp = tempfile::tempdir().expect("tempdir");
    write_session(
        tmp.path(),
        "proj-a",
        "s1",
        &[
            r#"{"timestamp":"2025-01-01T10:00:00Z","type":"assistant","message":{"usage":{"output_tokens":5}}}"#,
            r#"{"timestamp":"2025-01-02T10:00:00Z","type":"assistant","message":{"usage":{"output_tokens":7}}}"#,
        ],
    );
    let outcome = scan_with_dates(tmp.path(), &dates(&["2025-01-02"]), None).expect("scan");
    assert_eq!(outcome.events.len(), 1);
    match &outcome.events[0].payload {
        EventPayload::TokenUsage { usage } => assert_eq!(usage.output_tokens, 7),
        other => panic!("unexpected payload: {:?}", other),
    }
    // The out-of-window record is valid, so it is not counted as skipped.
    assert_eq!(outcome.stats.records_skipped, 0);
}

#[test]
fn timezone_offsets_land_on_the_utc_date() {
    let tmp = tempfile::tempdir().expect("tempdir");
    write_session(
        tmp.path(),
        "proj-a",
        "s1",
        &[r#"{"timestamp":"2025-01-02T01:30:00+02:00","type":"assistant","message":{"usage":{"output_tokens":3}}}"#],
    );
    let outcome = scan_with_dates(tmp.path(), &dates(&["2025-01-01"]), None).expect("scan");
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].ts, "2025-01-01T23:30:00.000Z");
}

#[test]
fn duplicate_records_are_dropped_across_files() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let record = r#"{"timestamp":"2025-01-01T10:00:00Z","type":"assistant","requestId":"req_1","message":{"id":"msg_1","usage":{"output_tokens":5}}}"#;
    write_session(tmp.path(), "proj-a", "s1", &[record]);
    write_session(tmp.path(), "proj-a", "s2", &[record]);
    let outcome = scan_with_dates(tmp.path(), &dates(&["2025-01-01"]), None).expect("scan");
    assert_eq!(outcome.stats.records_scanned, 2);
    assert_eq!(outcome.events.len(), 1);
}

#[test]
fn records_without_ids_are_never_deduplicated() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let record = r#"{"timestamp":"2025-01-01T10:00:00Z","type":"assistant","message":{"usage":{"output_tokens":5}}}"#;
    write_session(tmp.path(), "proj-a", "s1", &[record, record]);
    let outcome = scan_with_dates(tmp.path(), &dates(&["2025-01-01"]), None).expect("scan");
    assert_eq!(outcome.events.len(), 2);
}

#[test]
fn project_filter_limits_the_scan() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let record = r#"{"timestamp":"2025-01-01T10:00:00Z","type":"assistant","message":{"usage":{"output_tokens":5}}}"#;
    write_session(tmp.path(), "proj-a", "s1", &[record]);
    write_session(tmp.path(), "proj-b", "s2", &[record]);
    let outcome =
        scan_with_dates(tmp.path(), &dates(&["2025-01-01"]), Some("proj-b")).expect("scan");
    assert_eq!(outcome.stats.files_scanned, 1);
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].project, "proj-b");
    assert_eq!(outcome.events[0].session_id, "s2");
}

#[test]
fn non_jsonl_files_are_ignored() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path().join("proj-a");
    fs::create_dir_all(&dir).expect("create project dir");
    fs::write(dir.join("notes.txt"), "not a session").expect("write");
    let outcome = scan_with_dates(tmp.path(), &dates(&["2025-01-01"]), None).expect("scan");
    assert_eq!(outcome.stats.files_scanned, 0);
    assert!(outcome.events.is_empty());
}
