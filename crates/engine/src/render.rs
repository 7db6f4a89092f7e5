use std::fmt::Write;

use insights_core::{format_cost, format_tokens};

use crate::anomaly::{AnomalyReport, Severity};
use crate::cache::CacheReport;
use crate::forecast::{Confidence, Forecast, Trend};
use crate::report::Report;
use crate::roi::RoiReport;
use crate::skills::SkillReport;
use crate::tools::ToolReport;

const RULE: &str = "==========================================================================================";

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::High => "HIGH",
        Severity::Medium => "MEDIUM",
        Severity::Low => "LOW",
    }
}

fn push_header(out: &mut String, title: &str, report: &Report) {
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "  {}", title);
    let _ = writeln!(
        out,
        "  Period: {} to {} ({} days)",
        report.period.start.as_deref().unwrap_or("-"),
        report.period.end.as_deref().unwrap_or("-"),
        report.period.days
    );
    let _ = writeln!(out, "{}", RULE);
}

fn push_summary(out: &mut String, report: &Report) {
    let _ = writeln!(out, "\n  Sessions:      {:>10}", report.sessions);
    let _ = writeln!(
        out,
        "  Total Tokens:  {:>10}",
        format_tokens(report.totals.total_tokens())
    );
    let _ = writeln!(
        out,
        "  Output Tokens: {:>10}",
        format_tokens(report.totals.output_tokens)
    );
    let _ = writeln!(
        out,
        "  Total Cost:    {:>10}",
        format_cost(report.total_cost_usd)
    );
    if report.scan.records_skipped > 0 || report.scan.files_skipped > 0 {
        let _ = writeln!(
            out,
            "  Skipped:       {} records, {} files",
            report.scan.records_skipped, report.scan.files_skipped
        );
    }
}

fn push_anomalies(out: &mut String, anomalies: &AnomalyReport) {
    let _ = writeln!(out, "\n  ANOMALIES");
    if anomalies.anomalies.is_empty() {
        let _ = writeln!(out, "  No anomalies detected.");
        return;
    }
    let _ = writeln!(
        out,
        "  {} findings across {} sessions ({} high / {} medium / {} low)",
        anomalies.anomalies.len(),
        anomalies.sessions_flagged,
        anomalies.high,
        anomalies.medium,
        anomalies.low
    );
    for anomaly in &anomalies.anomalies {
        let _ = writeln!(
            out,
            "  [{:<6}] {} | session {} | {} (observed {}, threshold {})",
            severity_label(anomaly.severity),
            anomaly.project,
            anomaly.session_id,
            anomaly.detail,
            anomaly.observed,
            anomaly.threshold
        );
        if let Some(task) = &anomaly.task {
            let _ = writeln!(out, "           task: {}", task);
        }
    }
}

fn push_tools(out: &mut String, tools: &ToolReport) {
    let _ = writeln!(out, "\n  TOP TOOLS BY CALL COUNT");
    for tool in tools.tools.iter().take(15) {
        let _ = writeln!(
            out,
            "  {:<40} | {:>8} calls | {:>8} sessions | {:>10} est. tokens",
            tool.name,
            tool.calls,
            tool.sessions,
            format_tokens(tool.est_output_tokens)
        );
    }
    if !tools.mcp_servers.is_empty() {
        let _ = writeln!(out, "\n  MCP SERVERS");
        for server in tools.mcp_servers.iter().take(10) {
            let _ = writeln!(out, "  {} ({} calls)", server.server, server.total_calls);
            for op in server.operations.iter().take(5) {
                let _ = writeln!(out, "    - {}: {} calls", op.name, op.calls);
            }
        }
    }
    let _ = writeln!(out, "\n  OPERATIONS");
    for (category, count) in &tools.categories {
        let _ = writeln!(out, "  {:<20} | {:>6}", category, count);
    }
}

fn push_cache(out: &mut String, cache: &CacheReport) {
    let _ = writeln!(out, "\n  CACHE EFFICIENCY");
    match cache.overall_hit_rate {
        Some(rate) => {
            let _ = writeln!(out, "  Overall hit rate:  {:>6.1}%", rate * 100.0);
        }
        None => {
            let _ = writeln!(out, "  Overall hit rate:       n/a");
        }
    }
    let _ = writeln!(
        out,
        "  Cache reads:       {:>10}",
        format_tokens(cache.total_read_tokens)
    );
    let _ = writeln!(
        out,
        "  Cache writes:      {:>10}",
        format_tokens(cache.total_creation_tokens)
    );
    let _ = writeln!(
        out,
        "  Wasted writes:     {:>10} ({})",
        format_tokens(cache.total_wasted_tokens),
        format_cost(cache.total_wasted_cost_usd)
    );
    let _ = writeln!(
        out,
        "  Estimated savings: {:>10}",
        format_cost(cache.total_savings_usd)
    );
    if cache.flagged_sessions > 0 {
        let _ = writeln!(
            out,
            "\n  {} large sessions below the {:.0}% hit-rate floor:",
            cache.flagged_sessions,
            cache.warn_rate * 100.0
        );
        for session in cache.sessions.iter().filter(|s| s.flagged_low_hit) {
            let rate = session.hit_rate.unwrap_or(0.0);
            let _ = writeln!(
                out,
                "  {} | {} | {:>5.1}% hit rate",
                session.project, session.session_id, rate * 100.0
            );
        }
    }
}

fn push_skills(out: &mut String, skills: &SkillReport) {
    let _ = writeln!(out, "\n  SKILLS");
    if skills.skills.is_empty() {
        let _ = writeln!(out, "  No skill invocations in this period.");
        return;
    }
    let _ = writeln!(
        out,
        "  {} skills, {} invocations across {} sessions",
        skills.total_skills, skills.total_invocations, skills.sessions_with_skills
    );
    for skill in skills.skills.iter().take(15) {
        let _ = writeln!(
            out,
            "  {:<35} | {:>5} invocations | {:>8} sessions | {:>10} avg tokens",
            skill.name,
            skill.invocations,
            skill.sessions,
            format_tokens(skill.avg_tokens_per_invocation() as u64)
        );
    }
    if !skills.by_efficiency.is_empty() {
        let _ = writeln!(out, "\n  MOST EFFICIENT (lowest tokens per invocation)");
        for (rank, skill) in skills.by_efficiency.iter().take(5).enumerate() {
            let _ = writeln!(
                out,
                "  {}. {}: {} avg, {} invocations",
                rank + 1,
                skill.name,
                format_tokens(skill.avg_tokens_per_invocation() as u64),
                skill.invocations
            );
        }
    }
}

fn push_forecast(out: &mut String, forecast: &Forecast) {
    let _ = writeln!(out, "\n  USAGE FORECAST");
    let confidence = match forecast.confidence {
        Confidence::High => "high",
        Confidence::Medium => "medium",
        Confidence::Low => "low",
    };
    let trend = match forecast.trend {
        Trend::Increasing => "increasing",
        Trend::Decreasing => "decreasing",
        Trend::Stable => "stable",
    };
    let _ = writeln!(
        out,
        "  {} days observed | trend {} | confidence {}",
        forecast.days_observed, trend, confidence
    );
    let _ = writeln!(
        out,
        "  Daily average: {} output tokens",
        format_tokens(forecast.daily_avg_output as u64)
    );
    if forecast.projections.is_empty() {
        let _ = writeln!(out, "  Not enough history to project.");
        return;
    }
    for projection in &forecast.projections {
        let _ = writeln!(
            out,
            "  {} | {:>10}",
            projection.date,
            format_tokens(projection.output_tokens)
        );
    }
    let _ = writeln!(
        out,
        "  Projected total: {} ({})",
        format_tokens(forecast.projected_total_output),
        format_cost(forecast.projected_cost_usd)
    );
}

fn push_roi(out: &mut String, roi: &RoiReport) {
    let _ = writeln!(out, "\n  VALUE DISTRIBUTION");
    let _ = writeln!(out, "  High-value work: {:>6.1}%", roi.high_value_pct);
    let _ = writeln!(out, "  Support work:    {:>6.1}%", roi.support_pct);
    let _ = writeln!(out, "  Balance score:   {:>6.0}/100", roi.balance_score);
    if !roi.by_domain.is_empty() {
        let _ = writeln!(out, "\n  TOKENS BY DOMAIN");
        for domain in &roi.by_domain {
            let _ = writeln!(
                out,
                "  {:<15} | {:>10} | {:>8} calls | {}",
                domain.name,
                format_tokens(domain.output_tokens),
                domain.tool_calls,
                format_cost(domain.cost_usd)
            );
        }
    }
    if !roi.by_project.is_empty() {
        let _ = writeln!(out, "\n  TOP PROJECTS BY COST");
        for project in roi.by_project.iter().take(10) {
            let domains: Vec<&str> = project
                .primary_domains
                .iter()
                .map(|(name, _)| name.as_str())
                .collect();
            let _ = writeln!(
                out,
                "  {:<40} | {:>4} sessions | {:>10} | {}",
                project.name,
                project.sessions,
                format_cost(project.cost_usd),
                domains.join(", ")
            );
        }
    }
}

/// Render a report as plain text, one block per populated section.
pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    push_header(&mut out, "CLAUDE USAGE INSIGHTS", report);
    push_summary(&mut out, report);
    if let Some(anomalies) = &report.anomalies {
        push_anomalies(&mut out, anomalies);
    }
    if let Some(tools) = &report.tools {
        push_tools(&mut out, tools);
    }
    if let Some(cache) = &report.cache {
        push_cache(&mut out, cache);
    }
    if let Some(skills) = &report.skills {
        push_skills(&mut out, skills);
    }
    if let Some(forecast) = &report.forecast {
        push_forecast(&mut out, forecast);
    }
    if let Some(roi) = &report.roi {
        push_roi(&mut out, roi);
    }
    let _ = writeln!(out, "{}", RULE);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::report::{report_from_outcome, ReportKind};
    use logstore::{ScanOutcome, ScanStats};

    fn empty_outcome() -> ScanOutcome {
        ScanOutcome {
            events: Vec::new(),
            stats: ScanStats::default(),
        }
    }

    #[test]
    fn empty_full_report_renders_every_section() {
        let config = EngineConfig::default();
        let dates = vec!["2025-01-01".to_string()];
        let report = report_from_outcome(ReportKind::Full, &config, &dates, empty_outcome());
        let text = render_text(&report);
        assert!(text.contains("CLAUDE USAGE INSIGHTS"));
        assert!(text.contains("No anomalies detected."));
        assert!(text.contains("No skill invocations in this period."));
        assert!(text.contains("Not enough history to project."));
        assert!(text.contains("Overall hit rate:       n/a"));
    }

    #[test]
    fn single_section_report_renders_only_its_block() {
        let config = EngineConfig::default();
        let dates = vec!["2025-01-01".to_string()];
        let report = report_from_outcome(ReportKind::Cache, &config, &dates, empty_outcome());
        let text = render_text(&report);
        assert!(text.contains("CACHE EFFICIENCY"));
        assert!(!text.contains("USAGE FORECAST"));
    }
}
