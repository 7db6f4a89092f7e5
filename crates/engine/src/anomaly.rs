use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::aggregate::{Aggregate, SessionStats};
use crate::config::AnomalyThresholds;

/// Rule identity, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    ToolLoop,
    FileLoop,
    SqlLoop,
    TokenSpike,
    AgentStorm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub session_id: String,
    pub project: String,
    /// What the rule fired on: a tool name, a file path, or a stream label.
    pub subject: String,
    pub observed: u64,
    pub threshold: u64,
    /// Observed over threshold. Monotonic in the observed value, used only
    /// for ranking.
    pub score: f64,
    pub session_output_tokens: u64,
    pub session_cost_usd: f64,
    pub detail: String,
    /// First user message of the session, when one was logged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnomalyReport {
    pub anomalies: Vec<Anomaly>,
    pub total_sessions: usize,
    pub sessions_flagged: usize,
    /// Flagged sessions over total sessions, 0 when the window is empty.
    pub anomaly_rate: f64,
    /// Output tokens across flagged sessions.
    pub token_impact: u64,
    pub projects_affected: usize,
    pub by_kind: Vec<(AnomalyKind, usize)>,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

fn score(observed: u64, threshold: u64) -> f64 {
    observed as f64 / threshold as f64
}

// Two-step buckets per rule: the factor over threshold picks the level.
fn bucket(observed: u64, threshold: u64, factor: u64, above: Severity, below: Severity) -> Severity {
    if observed > threshold.saturating_mul(factor) {
        above
    } else {
        below
    }
}

fn make(
    session: &SessionStats,
    kind: AnomalyKind,
    severity: Severity,
    subject: String,
    observed: u64,
    threshold: u64,
    detail: String,
) -> Anomaly {
    Anomaly {
        kind,
        severity,
        session_id: session.session_id.clone(),
        project: session.project.clone(),
        subject,
        observed,
        threshold,
        score: score(observed, threshold),
        session_output_tokens: session.usage.output_tokens,
        session_cost_usd: session.cost_usd,
        detail,
        task: session.task_description().map(str::to_string),
    }
}

/// Run every rule over the aggregated sessions. A value fires its rule only
/// when strictly greater than the threshold, so observed == threshold is
/// never anomalous.
pub fn detect_anomalies(aggregate: &Aggregate, thresholds: &AnomalyThresholds) -> AnomalyReport {
    let mut anomalies = Vec::new();

    for session in &aggregate.sessions {
        for (tool, &count) in &session.tool_counts {
            if count > thresholds.tool_loop {
                anomalies.push(make(
                    session,
                    AnomalyKind::ToolLoop,
                    bucket(count, thresholds.tool_loop, 3, Severity::High, Severity::Medium),
                    tool.clone(),
                    count,
                    thresholds.tool_loop,
                    format!("{} called {} times in one session", tool, count),
                ));
            }
        }

        for (path, &count) in &session.file_counts {
            if count > thresholds.file_loop {
                anomalies.push(make(
                    session,
                    AnomalyKind::FileLoop,
                    bucket(count, thresholds.file_loop, 2, Severity::Medium, Severity::Low),
                    path.clone(),
                    count,
                    thresholds.file_loop,
                    format!("{} accessed {} times in one session", path, count),
                ));
            }
        }

        let sql_total = session.sql_queries();
        if sql_total > thresholds.sql_loop {
            let top_tool = session
                .sql_counts
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(tool, _)| tool.clone())
                .unwrap_or_default();
            anomalies.push(make(
                session,
                AnomalyKind::SqlLoop,
                bucket(sql_total, thresholds.sql_loop, 5, Severity::High, Severity::Medium),
                top_tool.clone(),
                sql_total,
                thresholds.sql_loop,
                format!(
                    "{} database queries in one session (mostly {})",
                    sql_total, top_tool
                ),
            ));
        }

        if session.usage.output_tokens > thresholds.token_spike {
            anomalies.push(make(
                session,
                AnomalyKind::TokenSpike,
                bucket(
                    session.usage.output_tokens,
                    thresholds.token_spike,
                    2,
                    Severity::High,
                    Severity::Medium,
                ),
                "output_tokens".to_string(),
                session.usage.output_tokens,
                thresholds.token_spike,
                format!(
                    "{} output tokens generated in one session",
                    session.usage.output_tokens
                ),
            ));
        }

        if session.agent_spawns > thresholds.agent_storm {
            anomalies.push(make(
                session,
                AnomalyKind::AgentStorm,
                bucket(
                    session.agent_spawns,
                    thresholds.agent_storm,
                    2,
                    Severity::Medium,
                    Severity::Low,
                ),
                "Task".to_string(),
                session.agent_spawns,
                thresholds.agent_storm,
                format!("{} sub-agents spawned in one session", session.agent_spawns),
            ));
        }
    }

    anomalies.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.kind.cmp(&b.kind))
            .then_with(|| a.session_id.cmp(&b.session_id))
            .then_with(|| a.subject.cmp(&b.subject))
    });

    let flagged_ids: BTreeSet<&str> = anomalies
        .iter()
        .map(|anomaly| anomaly.session_id.as_str())
        .collect();
    let sessions_flagged = flagged_ids.len();
    let token_impact: u64 = aggregate
        .sessions
        .iter()
        .filter(|session| flagged_ids.contains(session.session_id.as_str()))
        .map(|session| session.usage.output_tokens)
        .sum();
    let projects_affected = anomalies
        .iter()
        .map(|anomaly| anomaly.project.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    let mut by_kind: Vec<(AnomalyKind, usize)> = Vec::new();
    for kind in [
        AnomalyKind::ToolLoop,
        AnomalyKind::FileLoop,
        AnomalyKind::SqlLoop,
        AnomalyKind::TokenSpike,
        AnomalyKind::AgentStorm,
    ] {
        let count = anomalies.iter().filter(|a| a.kind == kind).count();
        if count > 0 {
            by_kind.push((kind, count));
        }
    }
    let count_level = |level: Severity| {
        anomalies
            .iter()
            .filter(|anomaly| anomaly.severity == level)
            .count()
    };
    let total_sessions = aggregate.sessions.len();
    debug!(total = anomalies.len(), sessions_flagged, "anomaly pass done");
    AnomalyReport {
        total_sessions,
        anomaly_rate: if total_sessions > 0 {
            sessions_flagged as f64 / total_sessions as f64
        } else {
            0.0
        },
        token_impact,
        projects_affected,
        by_kind,
        high: count_level(Severity::High),
        medium: count_level(Severity::Medium),
        low: count_level(Severity::Low),
        sessions_flagged,
        anomalies,
    }
}
