use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::debug;

use insights_core::TokenUsage;
use logstore::{default_data_path, scan_with_dates, ScanOutcome, ScanStats, Window};

use crate::aggregate::{aggregate_events, Aggregate};
use crate::anomaly::{detect_anomalies, AnomalyReport};
use crate::cache::{analyze_cache, CacheReport};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::forecast::{forecast_usage, Forecast};
use crate::roi::{analyze_roi, RoiReport};
use crate::skills::{analyze_skills, SkillReport};
use crate::tools::{analyze_tools, ToolReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Anomalies,
    Tools,
    Cache,
    Skills,
    Predict,
    Roi,
    Full,
}

impl ReportKind {
    pub fn parse(name: &str) -> Option<ReportKind> {
        Some(match name {
            "anomalies" => ReportKind::Anomalies,
            "tools" => ReportKind::Tools,
            "cache" => ReportKind::Cache,
            "skills" => ReportKind::Skills,
            "predict" => ReportKind::Predict,
            "roi" => ReportKind::Roi,
            "full" => ReportKind::Full,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Period {
    pub start: Option<String>,
    pub end: Option<String>,
    pub days: usize,
}

/// One finished analysis run. Sections are present when the kind asked for
/// them; `Full` carries all of them.
#[derive(Debug, Serialize)]
pub struct Report {
    pub kind: ReportKind,
    pub period: Period,
    pub scan: ScanStats,
    pub sessions: usize,
    pub totals: TokenUsage,
    pub total_cost_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomalies: Option<AnomalyReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<SkillReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<Forecast>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roi: Option<RoiReport>,
}

impl Report {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Default)]
struct Sections {
    anomalies: Option<AnomalyReport>,
    tools: Option<ToolReport>,
    cache: Option<CacheReport>,
    skills: Option<SkillReport>,
    forecast: Option<Forecast>,
    roi: Option<RoiReport>,
}

fn run_sections(kind: ReportKind, aggregate: &Aggregate, config: &EngineConfig) -> Sections {
    let pricing = config.pricing_rules();
    match kind {
        ReportKind::Anomalies => Sections {
            anomalies: Some(detect_anomalies(aggregate, &config.thresholds)),
            ..Sections::default()
        },
        ReportKind::Tools => Sections {
            tools: Some(analyze_tools(aggregate)),
            ..Sections::default()
        },
        ReportKind::Cache => Sections {
            cache: Some(analyze_cache(aggregate, &pricing, config)),
            ..Sections::default()
        },
        ReportKind::Skills => Sections {
            skills: Some(analyze_skills(aggregate)),
            ..Sections::default()
        },
        ReportKind::Predict => Sections {
            forecast: Some(forecast_usage(aggregate, config)),
            ..Sections::default()
        },
        ReportKind::Roi => Sections {
            roi: Some(analyze_roi(aggregate)),
            ..Sections::default()
        },
        ReportKind::Full => {
            // Every analyzer reads the same frozen aggregate, so they can
            // run in parallel once aggregation is done.
            let ((anomalies, tools), ((cache, skills), (forecast, roi))) = rayon::join(
                || {
                    rayon::join(
                        || detect_anomalies(aggregate, &config.thresholds),
                        || analyze_tools(aggregate),
                    )
                },
                || {
                    rayon::join(
                        || {
                            rayon::join(
                                || analyze_cache(aggregate, &pricing, config),
                                || analyze_skills(aggregate),
                            )
                        },
                        || {
                            rayon::join(
                                || forecast_usage(aggregate, config),
                                || analyze_roi(aggregate),
                            )
                        },
                    )
                },
            );
            Sections {
                anomalies: Some(anomalies),
                tools: Some(tools),
                cache: Some(cache),
                skills: Some(skills),
                forecast: Some(forecast),
                roi: Some(roi),
            }
        }
    }
}

/// Assemble a report from an already-scanned window. Pure apart from the
/// clock used upstream to pick the window.
pub fn report_from_outcome(
    kind: ReportKind,
    config: &EngineConfig,
    target_dates: &[String],
    outcome: ScanOutcome,
) -> Report {
    let pricing = config.pricing_rules();
    let aggregate = aggregate_events(&outcome.events, &pricing, config.utc_offset_minutes);
    let sections = run_sections(kind, &aggregate, config);
    Report {
        kind,
        period: Period {
            start: target_dates.last().cloned(),
            end: target_dates.first().cloned(),
            days: target_dates.len(),
        },
        scan: outcome.stats,
        sessions: aggregate.sessions.len(),
        totals: aggregate.totals,
        total_cost_usd: aggregate.total_cost_usd,
        anomalies: sections.anomalies,
        tools: sections.tools,
        cache: sections.cache,
        skills: sections.skills,
        forecast: sections.forecast,
        roi: sections.roi,
    }
}

/// Scan the log store and build the requested report.
pub fn build_report(kind: ReportKind, config: &EngineConfig) -> Result<Report> {
    config.validate()?;
    let data_path = config
        .data_path
        .clone()
        .unwrap_or_else(default_data_path);
    // Forecasts need more history than the default window carries.
    let window = match (kind, &config.window) {
        (ReportKind::Predict, Window::TrailingDays(days)) => {
            Window::TrailingDays((*days).max(config.forecast_lookback_days))
        }
        (_, window) => window.clone(),
    };
    let today = (Utc::now() + Duration::minutes(config.utc_offset_minutes as i64)).date_naive();
    let target_dates = window.target_dates(today);
    debug!(kind = ?kind, days = target_dates.len(), path = %data_path.display(), "building report");
    let outcome = scan_with_dates(&data_path, &target_dates, config.project.as_deref())?;
    Ok(report_from_outcome(kind, config, &target_dates, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use logstore::ScanStats;

    fn empty_outcome() -> ScanOutcome {
        ScanOutcome {
            events: Vec::new(),
            stats: ScanStats::default(),
        }
    }

    #[test]
    fn full_report_carries_every_section() {
        let config = EngineConfig::default();
        let dates = vec!["2025-01-02".to_string(), "2025-01-01".to_string()];
        let report = report_from_outcome(ReportKind::Full, &config, &dates, empty_outcome());
        assert!(report.anomalies.is_some());
        assert!(report.tools.is_some());
        assert!(report.cache.is_some());
        assert!(report.skills.is_some());
        assert!(report.forecast.is_some());
        assert!(report.roi.is_some());
        assert_eq!(report.period.start.as_deref(), Some("2025-01-01"));
        assert_eq!(report.period.end.as_deref(), Some("2025-01-02"));
    }

    #[test]
    fn single_kind_reports_carry_only_their_section() {
        let config = EngineConfig::default();
        let dates = vec!["2025-01-01".to_string()];
        let report = report_from_outcome(ReportKind::Cache, &config, &dates, empty_outcome());
        assert!(report.cache.is_some());
        assert!(report.anomalies.is_none());
        assert!(report.forecast.is_none());
    }

    #[test]
    fn kind_parses_from_cli_names() {
        assert_eq!(ReportKind::parse("full"), Some(ReportKind::Full));
        assert_eq!(ReportKind::parse("predict"), Some(ReportKind::Predict));
        assert_eq!(ReportKind::parse("bogus"), None);
    }

    #[test]
    fn empty_window_serializes_without_sections_it_lacks() {
        let config = EngineConfig::default();
        let dates = vec!["2025-01-01".to_string()];
        let report = report_from_outcome(ReportKind::Roi, &config, &dates, empty_outcome());
        let json = report.to_json().expect("json");
        assert!(json.contains("\"roi\""));
        assert!(!json.contains("\"anomalies\""));
    }
}
