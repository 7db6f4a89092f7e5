//! Analysis engine over the session log store.
//!
//! Every report is recomputed from the raw logs on demand; nothing derived
//! is persisted. [`build_report`] scans the requested window, folds the
//! events into per-session and per-day statistics, and runs the analyzers
//! the report kind asks for.

mod aggregate;
mod anomaly;
mod cache;
mod config;
mod error;
mod forecast;
mod render;
mod report;
mod roi;
mod skills;
mod tools;

pub use aggregate::{aggregate_events, Aggregate, CacheEvent, DayStats, ProjectDay, SessionStats};
pub use anomaly::{detect_anomalies, Anomaly, AnomalyKind, AnomalyReport, Severity};
pub use cache::{analyze_cache, CacheReport, DayCache, ProjectCache, SessionCache};
pub use config::{AnomalyThresholds, CacheRetention, EngineConfig};
pub use error::{EngineError, Result};
pub use forecast::{forecast_usage, Confidence, DayProjection, Forecast, Trend};
pub use render::render_text;
pub use report::{build_report, report_from_outcome, Period, Report, ReportKind};
pub use roi::{analyze_roi, classify_tool, DomainStats, ProjectRoi, RoiReport};
pub use skills::{analyze_skills, SkillReport, SkillStats};
pub use tools::{analyze_tools, McpServerStats, ToolReport, ToolStats};
