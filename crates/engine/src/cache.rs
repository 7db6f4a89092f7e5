use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use insights_core::{rule_for_model, PricingRule};

use crate::aggregate::{Aggregate, SessionStats};
use crate::config::{CacheRetention, EngineConfig};

/// Cache efficiency for one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionCache {
    pub session_id: String,
    pub project: String,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    pub fresh_input_tokens: u64,
    /// Reads over reads plus fresh input, clamped to [0, 1]. `None` when the
    /// session had no input at all, which is distinct from a true zero rate.
    pub hit_rate: Option<f64>,
    /// Created cache tokens that were never read back.
    pub wasted_tokens: u64,
    pub wasted_cost_usd: f64,
    /// What the read stream saved versus paying fresh-input rates for it.
    pub savings_usd: f64,
    pub flagged_low_hit: bool,
}

/// Hit rate of one local calendar day.
#[derive(Debug, Clone, Serialize)]
pub struct DayCache {
    pub date: String,
    pub hit_rate: Option<f64>,
    pub cache_read_tokens: u64,
    pub fresh_input_tokens: u64,
}

/// Cache rollup for one project.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectCache {
    pub project: String,
    pub hit_rate: Option<f64>,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    pub fresh_input_tokens: u64,
    pub sessions: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheReport {
    /// Worst hit rate first; sessions without input sort last.
    pub sessions: Vec<SessionCache>,
    /// Per-day hit rates, oldest first.
    pub daily: Vec<DayCache>,
    /// Projects by cache-read volume, descending.
    pub projects: Vec<ProjectCache>,
    pub overall_hit_rate: Option<f64>,
    pub total_read_tokens: u64,
    pub total_creation_tokens: u64,
    pub total_wasted_tokens: u64,
    pub total_savings_usd: f64,
    pub total_wasted_cost_usd: f64,
    pub flagged_sessions: usize,
    pub warn_rate: f64,
}

fn hit_rate(read: u64, fresh_input: u64) -> Option<f64> {
    let denominator = read.saturating_add(fresh_input);
    if denominator == 0 {
        return None;
    }
    Some((read as f64 / denominator as f64).clamp(0.0, 1.0))
}

/// Keyed creates are wasted when their key is never read back within the
/// retention scope. Creates with no key fall back to the overhang of
/// unkeyed creation over unkeyed reads.
fn wasted_tokens(session: &SessionStats, window_read_keys: Option<&HashSet<String>>) -> u64 {
    let session_read_keys: HashSet<&str> = session
        .cache_reads
        .iter()
        .filter_map(|event| event.key.as_deref())
        .collect();
    let redeemed = |key: &str| {
        session_read_keys.contains(key)
            || window_read_keys.is_some_and(|keys| keys.contains(key))
    };
    let mut wasted = 0u64;
    let mut unkeyed_create = 0u64;
    for event in &session.cache_creates {
        match event.key.as_deref() {
            Some(key) if !redeemed(key) => wasted = wasted.saturating_add(event.tokens),
            Some(_) => {}
            None => unkeyed_create = unkeyed_create.saturating_add(event.tokens),
        }
    }
    let unkeyed_read: u64 = session
        .cache_reads
        .iter()
        .filter(|event| event.key.is_none())
        .map(|event| event.tokens)
        .sum();
    wasted.saturating_add(unkeyed_create.saturating_sub(unkeyed_read))
}

/// Compute per-session and overall cache efficiency for the window.
pub fn analyze_cache(
    aggregate: &Aggregate,
    pricing: &[PricingRule],
    config: &EngineConfig,
) -> CacheReport {
    let window_read_keys: Option<HashSet<String>> = match config.cache_retention {
        CacheRetention::EndOfSession => None,
        CacheRetention::WholeWindow => Some(
            aggregate
                .sessions
                .iter()
                .flat_map(|session| session.cache_reads.iter())
                .filter_map(|event| event.key.clone())
                .collect(),
        ),
    };

    let mut sessions = Vec::new();
    for stats in &aggregate.sessions {
        if stats.usage.is_empty() {
            continue;
        }
        let read = stats.usage.cache_read_tokens;
        let creation = stats.usage.cache_creation_tokens;
        let fresh = stats.usage.input_tokens;
        let rate = hit_rate(read, fresh);
        let wasted = wasted_tokens(stats, window_read_keys.as_ref());
        let rule = rule_for_model(pricing, stats.model.as_deref().unwrap_or(""));
        let (savings_usd, wasted_cost_usd) = match rule {
            Some(rule) => (
                (read as f64 / 1_000_000.0) * (rule.input_per_1m - rule.cache_read_per_1m),
                (wasted as f64 / 1_000_000.0) * rule.cache_create_per_1m,
            ),
            None => (0.0, 0.0),
        };
        let significant = stats.usage.total_input_context() >= config.significant_context_tokens;
        let flagged = significant && rate.is_some_and(|r| r < config.cache_warn_rate);
        sessions.push(SessionCache {
            session_id: stats.session_id.clone(),
            project: stats.project.clone(),
            cache_read_tokens: read,
            cache_creation_tokens: creation,
            fresh_input_tokens: fresh,
            hit_rate: rate,
            wasted_tokens: wasted,
            wasted_cost_usd,
            savings_usd,
            flagged_low_hit: flagged,
        });
    }

    sessions.sort_by(|a, b| match (a.hit_rate, b.hit_rate) {
        (Some(x), Some(y)) => x
            .partial_cmp(&y)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.session_id.cmp(&b.session_id)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.session_id.cmp(&b.session_id),
    });

    let daily: Vec<DayCache> = aggregate
        .days
        .iter()
        .map(|day| DayCache {
            date: day.date.clone(),
            hit_rate: hit_rate(day.usage.cache_read_tokens, day.usage.input_tokens),
            cache_read_tokens: day.usage.cache_read_tokens,
            fresh_input_tokens: day.usage.input_tokens,
        })
        .collect();

    let mut project_map: BTreeMap<String, ProjectCache> = BTreeMap::new();
    for session in &sessions {
        let entry = project_map
            .entry(session.project.clone())
            .or_insert_with(|| ProjectCache {
                project: session.project.clone(),
                hit_rate: None,
                cache_read_tokens: 0,
                cache_creation_tokens: 0,
                fresh_input_tokens: 0,
                sessions: 0,
            });
        entry.cache_read_tokens += session.cache_read_tokens;
        entry.cache_creation_tokens += session.cache_creation_tokens;
        entry.fresh_input_tokens += session.fresh_input_tokens;
        entry.sessions += 1;
    }
    let mut projects: Vec<ProjectCache> = project_map
        .into_values()
        .map(|mut project| {
            project.hit_rate = hit_rate(project.cache_read_tokens, project.fresh_input_tokens);
            project
        })
        .collect();
    projects.sort_by(|a, b| {
        b.cache_read_tokens
            .cmp(&a.cache_read_tokens)
            .then_with(|| a.project.cmp(&b.project))
    });

    let total_read: u64 = sessions.iter().map(|s| s.cache_read_tokens).sum();
    let total_creation: u64 = sessions.iter().map(|s| s.cache_creation_tokens).sum();
    let total_fresh: u64 = sessions.iter().map(|s| s.fresh_input_tokens).sum();
    CacheReport {
        daily,
        projects,
        overall_hit_rate: hit_rate(total_read, total_fresh),
        total_read_tokens: total_read,
        total_creation_tokens: total_creation,
        total_wasted_tokens: sessions.iter().map(|s| s.wasted_tokens).sum(),
        total_savings_usd: sessions.iter().map(|s| s.savings_usd).sum(),
        total_wasted_cost_usd: sessions.iter().map(|s| s.wasted_cost_usd).sum(),
        flagged_sessions: sessions.iter().filter(|s| s.flagged_low_hit).count(),
        warn_rate: config.cache_warn_rate,
        sessions,
    }
}
