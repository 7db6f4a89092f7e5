use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use insights_core::{compute_cost_usd, rule_for_model, PricingRule, TokenUsage};
use logstore::{Event, EventPayload};

/// One cache event inside a session, in log order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEvent {
    pub tokens: u64,
    pub key: Option<String>,
}

/// Everything the analyzers need about one session, folded from its events.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub session_id: String,
    pub project: String,
    /// Most recent model seen on the session's usage records.
    pub model: Option<String>,
    /// True for sub-agent sessions spawned by another session.
    pub is_agent: bool,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub tool_counts: BTreeMap<String, u64>,
    pub file_counts: BTreeMap<String, u64>,
    pub sql_counts: BTreeMap<String, u64>,
    pub skill_counts: BTreeMap<String, u64>,
    pub agent_spawns: u64,
    pub user_messages: u64,
    pub user_text: Vec<String>,
    pub cache_creates: Vec<CacheEvent>,
    pub cache_reads: Vec<CacheEvent>,
    pub first_ts: String,
    pub last_ts: String,
}

impl SessionStats {
    pub fn tool_calls(&self) -> u64 {
        self.tool_counts.values().sum()
    }

    pub fn sql_queries(&self) -> u64 {
        self.sql_counts.values().sum()
    }

    /// The session's first user message, which usually states the task.
    pub fn task_description(&self) -> Option<&str> {
        self.user_text.first().map(String::as_str)
    }
}

/// Token usage and cost bucketed onto one local calendar day. A session
/// lands on the day of its first timestamp.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DayStats {
    pub date: String,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub sessions: u64,
}

/// One (project, day) bucket. Its totals are exactly the sum of the
/// sessions that started on that day.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectDay {
    pub project: String,
    pub date: String,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub sessions: u64,
}

/// Aggregated view of one scan window. Sessions are ordered by id and days
/// by date so downstream output is deterministic.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregate {
    pub sessions: Vec<SessionStats>,
    pub days: Vec<DayStats>,
    pub project_days: Vec<ProjectDay>,
    pub totals: TokenUsage,
    pub total_cost_usd: f64,
}

impl Aggregate {
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session(&self, session_id: &str) -> Option<&SessionStats> {
        self.sessions
            .iter()
            .find(|session| session.session_id == session_id)
    }
}

fn local_date(ts: &str, utc_offset_minutes: i32) -> Option<String> {
    let parsed = DateTime::parse_from_rfc3339(ts).ok()?;
    let shifted = parsed.with_timezone(&Utc) + Duration::minutes(utc_offset_minutes as i64);
    Some(shifted.date_naive().format("%Y-%m-%d").to_string())
}

/// Fold a scan's event stream into per-session and per-day statistics.
pub fn aggregate_events(
    events: &[Event],
    pricing: &[PricingRule],
    utc_offset_minutes: i32,
) -> Aggregate {
    let mut sessions: BTreeMap<String, SessionStats> = BTreeMap::new();

    for event in events {
        let session = sessions
            .entry(event.session_id.clone())
            .or_insert_with(|| SessionStats {
                session_id: event.session_id.clone(),
                project: event.project.clone(),
                is_agent: event.session_id.starts_with("agent-"),
                first_ts: event.ts.clone(),
                last_ts: event.ts.clone(),
                ..SessionStats::default()
            });
        if event.ts < session.first_ts {
            session.first_ts = event.ts.clone();
        }
        if event.ts > session.last_ts {
            session.last_ts = event.ts.clone();
        }

        match &event.payload {
            EventPayload::ToolCall { tool } => {
                *session.tool_counts.entry(tool.clone()).or_insert(0) += 1;
            }
            EventPayload::FileAccess { path } => {
                *session.file_counts.entry(path.clone()).or_insert(0) += 1;
            }
            EventPayload::SqlQuery { tool } => {
                *session.sql_counts.entry(tool.clone()).or_insert(0) += 1;
            }
            EventPayload::SkillUse { skill } => {
                *session.skill_counts.entry(skill.clone()).or_insert(0) += 1;
            }
            EventPayload::AgentSpawn => session.agent_spawns += 1,
            EventPayload::UserMessage { text } => {
                session.user_messages += 1;
                session.user_text.push(text.clone());
            }
            EventPayload::CacheCreate { tokens, key } => session.cache_creates.push(CacheEvent {
                tokens: *tokens,
                key: key.clone(),
            }),
            EventPayload::CacheRead { tokens, key } => session.cache_reads.push(CacheEvent {
                tokens: *tokens,
                key: key.clone(),
            }),
            EventPayload::TokenUsage { usage } => {
                let rule = rule_for_model(pricing, event.model.as_deref().unwrap_or(""));
                let cost = rule.map(|r| compute_cost_usd(*usage, r)).unwrap_or(0.0);
                session.usage = session.usage.add(*usage);
                session.cost_usd += cost;
                if event.model.is_some() {
                    session.model = event.model.clone();
                }
            }
        }
    }

    let mut days: BTreeMap<String, DayStats> = BTreeMap::new();
    let mut project_days: BTreeMap<(String, String), ProjectDay> = BTreeMap::new();
    let mut totals = TokenUsage::default();
    let mut total_cost_usd = 0.0;
    for session in sessions.values() {
        totals = totals.add(session.usage);
        total_cost_usd += session.cost_usd;
        let Some(date) = local_date(&session.first_ts, utc_offset_minutes) else {
            continue;
        };
        let day = days.entry(date.clone()).or_insert_with(|| DayStats {
            date: date.clone(),
            ..DayStats::default()
        });
        day.usage = day.usage.add(session.usage);
        day.cost_usd += session.cost_usd;
        day.sessions += 1;
        let key = (session.project.clone(), date.clone());
        let project_day = project_days.entry(key).or_insert_with(|| ProjectDay {
            project: session.project.clone(),
            date,
            ..ProjectDay::default()
        });
        project_day.usage = project_day.usage.add(session.usage);
        project_day.cost_usd += session.cost_usd;
        project_day.sessions += 1;
    }

    debug!(
        sessions = sessions.len(),
        days = days.len(),
        "aggregated scan window"
    );
    Aggregate {
        sessions: sessions.into_values().collect(),
        days: days.into_values().collect(),
        project_days: project_days.into_values().collect(),
        totals,
        total_cost_usd,
    }
}
