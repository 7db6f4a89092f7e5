//! Read-only access to Claude Code session logs.
//!
//! The store is a directory tree of `<project>/<session-id>.jsonl` files.
//! Scanning normalizes each line into [`Event`]s and reports what it could
//! not parse through [`ScanStats`] instead of failing.

mod parser;
mod paths;
mod scanner;
mod types;

pub use paths::default_data_path;
pub use scanner::{scan, scan_with_dates};
pub use types::{
    Event, EventPayload, Result, ScanIssue, ScanOutcome, ScanStats, StoreError, Window,
};
