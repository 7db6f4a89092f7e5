use std::io;
use std::path::PathBuf;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use insights_core::TokenUsage;

/// One normalized record extracted from a session log line. Immutable once
/// produced by the reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// RFC3339 UTC timestamp with millisecond precision.
    pub ts: String,
    pub session_id: String,
    pub project: String,
    pub model: Option<String>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    ToolCall { tool: String },
    FileAccess { path: String },
    SqlQuery { tool: String },
    CacheCreate { tokens: u64, key: Option<String> },
    CacheRead { tokens: u64, key: Option<String> },
    AgentSpawn,
    TokenUsage { usage: TokenUsage },
    SkillUse { skill: String },
    UserMessage { text: String },
}

/// Requested time window: an explicit calendar date or a trailing day count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Window {
    TrailingDays(u32),
    Date(String),
}

impl Default for Window {
    fn default() -> Self {
        Window::TrailingDays(7)
    }
}

impl Window {
    /// Target dates (YYYY-MM-DD, newest first) relative to `today`.
    pub fn target_dates(&self, today: NaiveDate) -> Vec<String> {
        match self {
            Window::Date(date) => vec![date.clone()],
            Window::TrailingDays(days) => (0..(*days).max(1))
                .map(|back| (today - Duration::days(back as i64)).format("%Y-%m-%d").to_string())
                .collect(),
        }
    }
}

/// Non-fatal problem encountered while reading one file or directory entry.
#[derive(Debug, Clone, Serialize)]
pub struct ScanIssue {
    pub file_path: String,
    pub message: String,
}

/// Scan summary returned next to the event stream. Malformed records are
/// counted here, never surfaced as errors.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub records_scanned: usize,
    pub records_skipped: usize,
    pub issues: Vec<ScanIssue>,
}

#[derive(Debug)]
pub struct ScanOutcome {
    pub events: Vec<Event>,
    pub stats: ScanStats,
}

/// Fatal reader errors. Only an unreadable store root aborts a scan; an
/// existing-but-empty store is a valid empty result.
#[derive(Debug)]
pub enum StoreError {
    Unreadable { path: PathBuf, source: io::Error },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreadable { path, source } => {
                write!(f, "log store unreadable at {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Unreadable { source, .. } => Some(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
