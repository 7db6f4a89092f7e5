use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::Utc;
use rayon::prelude::*;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::parser::{dedup_key, entry_timestamp, events_from_entry, parse_json_line};
use crate::types::{Event, Result, ScanIssue, ScanOutcome, ScanStats, StoreError, Window};

struct FileTask {
    path: PathBuf,
    file_path: String,
    project: String,
    session_id: String,
}

struct ParsedRecord {
    key: Option<String>,
    events: Vec<Event>,
}

struct ParsedFile {
    records: Vec<ParsedRecord>,
    records_scanned: usize,
    records_skipped: usize,
    issues: Vec<ScanIssue>,
    skipped: bool,
}

fn parse_session_file(task: &FileTask, target_dates: &[String]) -> ParsedFile {
    let mut parsed = ParsedFile {
        records: Vec::new(),
        records_scanned: 0,
        records_skipped: 0,
        issues: Vec::new(),
        skipped: false,
    };

    let file = match File::open(&task.path) {
        Ok(file) => file,
        Err(err) => {
            parsed.issues.push(ScanIssue {
                file_path: task.file_path.clone(),
                message: err.to_string(),
            });
            parsed.skipped = true;
            return parsed;
        }
    };

    let mut reader = BufReader::new(file);
    let mut buf = String::new();
    loop {
        buf.clear();
        match reader.read_line(&mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = buf.trim();
                if line.is_empty() {
                    continue;
                }
                let Some(entry) = parse_json_line(line) else {
                    parsed.records_skipped += 1;
                    continue;
                };
                let Some(ts) = entry_timestamp(&entry) else {
                    parsed.records_skipped += 1;
                    continue;
                };
                // Out-of-window records are valid, just not requested.
                if !target_dates.iter().any(|date| ts.starts_with(date.as_str())) {
                    continue;
                }
                parsed.records_scanned += 1;
                parsed.records.push(ParsedRecord {
                    key: dedup_key(&entry),
                    events: events_from_entry(&entry, &ts, &task.session_id, &task.project),
                });
            }
            Err(err) => {
                parsed.issues.push(ScanIssue {
                    file_path: task.file_path.clone(),
                    message: err.to_string(),
                });
                break;
            }
        }
    }

    parsed
}

/// Scan the log store for events on the given target dates.
///
/// Layout is `<root>/<project>/<session-id>.jsonl`. Files are parsed in
/// parallel; malformed lines and unreadable files are counted, never fatal.
/// Only a missing or unreadable root aborts the scan.
pub fn scan_with_dates(
    data_path: &Path,
    target_dates: &[String],
    project_filter: Option<&str>,
) -> Result<ScanOutcome> {
    std::fs::read_dir(data_path).map_err(|source| StoreError::Unreadable {
        path: data_path.to_path_buf(),
        source,
    })?;
    debug!(path = %data_path.display(), dates = target_dates.len(), "scanning log store");

    let mut stats = ScanStats::default();
    let mut tasks = Vec::new();
    for entry in WalkDir::new(data_path)
        .min_depth(2)
        .max_depth(2)
        .follow_links(false)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let file_path = err
                    .path()
                    .map(|path| path.to_string_lossy().to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                stats.issues.push(ScanIssue {
                    file_path,
                    message: err.to_string(),
                });
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|value| value.to_str()) != Some("jsonl")
        {
            continue;
        }
        let project = path
            .parent()
            .and_then(|parent| parent.file_name())
            .and_then(|name| name.to_str())
            .unwrap_or("unknown")
            .to_string();
        if let Some(filter) = project_filter
            && project != filter
        {
            continue;
        }
        let session_id = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("unknown")
            .to_string();
        stats.files_scanned += 1;
        tasks.push(FileTask {
            path: path.to_path_buf(),
            file_path: path.to_string_lossy().to_string(),
            project,
            session_id,
        });
    }

    let parsed_files = tasks
        .par_iter()
        .map(|task| parse_session_file(task, target_dates))
        .collect::<Vec<_>>();

    let mut events = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for parsed in parsed_files {
        stats.records_scanned += parsed.records_scanned;
        stats.records_skipped += parsed.records_skipped;
        stats.issues.extend(parsed.issues);
        if parsed.skipped {
            stats.files_skipped += 1;
            continue;
        }
        for record in parsed.records {
            if let Some(key) = record.key
                && !seen.insert(key)
            {
                continue;
            }
            events.extend(record.events);
        }
    }

    if stats.records_skipped > 0 || !stats.issues.is_empty() {
        warn!(
            skipped = stats.records_skipped,
            issues = stats.issues.len(),
            "scan finished with skipped records"
        );
    }
    Ok(ScanOutcome { events, stats })
}

/// Convenience wrapper resolving target dates from the current UTC day.
pub fn scan(data_path: &Path, window: &Window, project_filter: Option<&str>) -> Result<ScanOutcome> {
    let dates = window.target_dates(Utc::now().date_naive());
    scan_with_dates(data_path, &dates, project_filter)
}
