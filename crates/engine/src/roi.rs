use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::aggregate::Aggregate;

/// Activity domains, in display order. Tool names are classified by
/// substring match; the first matching domain wins.
pub const DOMAIN_TABLE: &[(&str, &[&str])] = &[
    ("coding", &["edit", "write", "bash", "grep", "glob", "read"]),
    ("research", &["websearch", "webfetch"]),
    ("communication", &["mcp__outlook", "email"]),
    ("crm", &["mcp__pipedrive"]),
    ("meetings", &["mcp__ask-maia", "maia"]),
    ("automation", &["n8n", "workflow"]),
    ("data", &["sql", "database", "supabase"]),
    ("agents", &["task", "agent"]),
];

const HIGH_VALUE_DOMAINS: &[&str] = &["coding", "automation", "data"];
const SUPPORT_DOMAINS: &[&str] = &["research", "communication", "meetings"];

pub fn classify_tool(tool: &str) -> &'static str {
    let lower = tool.to_ascii_lowercase();
    for (domain, patterns) in DOMAIN_TABLE {
        if patterns.iter().any(|pattern| lower.contains(pattern)) {
            return domain;
        }
    }
    "other"
}

/// Per-domain totals. Output tokens and cost are attributed to domains
/// proportionally to each domain's share of the session's tool calls.
#[derive(Debug, Clone, Serialize)]
pub struct DomainStats {
    pub name: String,
    pub sessions: usize,
    pub tool_calls: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

impl DomainStats {
    pub fn tokens_per_call(&self) -> f64 {
        if self.tool_calls > 0 {
            self.output_tokens as f64 / self.tool_calls as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectRoi {
    pub name: String,
    pub sessions: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    /// Top domains by tool-call count, at most three.
    pub primary_domains: Vec<(String, u64)>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RoiReport {
    pub total_sessions: usize,
    pub total_output_tokens: u64,
    pub total_cost_usd: f64,
    pub avg_cost_per_session: f64,
    /// Domains sorted by attributed output tokens, descending.
    pub by_domain: Vec<DomainStats>,
    /// Projects sorted by cost, descending.
    pub by_project: Vec<ProjectRoi>,
    pub high_value_pct: f64,
    pub support_pct: f64,
    pub balance_score: f64,
}

#[derive(Default)]
struct DomainAccum {
    sessions: BTreeSet<String>,
    tool_calls: u64,
    output_tokens: f64,
    cost_usd: f64,
}

#[derive(Default)]
struct ProjectAccum {
    sessions: u64,
    output_tokens: u64,
    cost_usd: f64,
    domains: BTreeMap<String, u64>,
}

// Penalties away from a roughly 50/30/20 high-value/support/other split.
fn balance_score(high_value_pct: f64, support_pct: f64) -> f64 {
    let mut score: f64 = 100.0;
    if high_value_pct < 30.0 {
        score -= 20.0;
    }
    if high_value_pct > 80.0 {
        score -= 10.0;
    }
    if support_pct > 50.0 {
        score -= 15.0;
    }
    score.clamp(0.0, 100.0)
}

/// Attribute the window's output tokens and cost to activity domains and
/// projects.
pub fn analyze_roi(aggregate: &Aggregate) -> RoiReport {
    let mut domains: BTreeMap<&'static str, DomainAccum> = BTreeMap::new();
    let mut projects: BTreeMap<String, ProjectAccum> = BTreeMap::new();

    for session in &aggregate.sessions {
        let project = projects.entry(session.project.clone()).or_default();
        project.sessions += 1;
        project.output_tokens += session.usage.output_tokens;
        project.cost_usd += session.cost_usd;

        let total_calls = session.tool_calls();
        if total_calls == 0 {
            continue;
        }
        for (tool, &count) in &session.tool_counts {
            let domain = classify_tool(tool);
            let share = count as f64 / total_calls as f64;
            let accum = domains.entry(domain).or_default();
            accum.sessions.insert(session.session_id.clone());
            accum.tool_calls += count;
            accum.output_tokens += session.usage.output_tokens as f64 * share;
            accum.cost_usd += session.cost_usd * share;
            *project.domains.entry(domain.to_string()).or_insert(0) += count;
        }
    }

    let mut by_domain: Vec<DomainStats> = domains
        .into_iter()
        .map(|(name, accum)| DomainStats {
            name: name.to_string(),
            sessions: accum.sessions.len(),
            tool_calls: accum.tool_calls,
            output_tokens: accum.output_tokens.round() as u64,
            cost_usd: accum.cost_usd,
        })
        .collect();
    by_domain.sort_by(|a, b| {
        b.output_tokens
            .cmp(&a.output_tokens)
            .then_with(|| a.name.cmp(&b.name))
    });

    let attributed_total: u64 = by_domain.iter().map(|d| d.output_tokens).sum();
    let domain_pct = |name: &str| -> f64 {
        if attributed_total == 0 {
            return 0.0;
        }
        by_domain
            .iter()
            .filter(|d| d.name == name)
            .map(|d| d.output_tokens as f64 / attributed_total as f64 * 100.0)
            .sum()
    };
    let high_value_pct: f64 = HIGH_VALUE_DOMAINS.iter().map(|d| domain_pct(d)).sum();
    let support_pct: f64 = SUPPORT_DOMAINS.iter().map(|d| domain_pct(d)).sum();

    let mut by_project: Vec<ProjectRoi> = projects
        .into_iter()
        .map(|(name, accum)| {
            let mut primary: Vec<(String, u64)> = accum.domains.into_iter().collect();
            primary.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            primary.truncate(3);
            ProjectRoi {
                name,
                sessions: accum.sessions,
                output_tokens: accum.output_tokens,
                cost_usd: accum.cost_usd,
                primary_domains: primary,
            }
        })
        .collect();
    by_project.sort_by(|a, b| {
        b.cost_usd
            .partial_cmp(&a.cost_usd)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    by_project.truncate(15);

    let total_sessions = aggregate.sessions.len();
    RoiReport {
        total_sessions,
        total_output_tokens: aggregate.totals.output_tokens,
        total_cost_usd: aggregate.total_cost_usd,
        avg_cost_per_session: if total_sessions > 0 {
            aggregate.total_cost_usd / total_sessions as f64
        } else {
            0.0
        },
        by_domain,
        by_project,
        high_value_pct,
        support_pct,
        balance_score: balance_score(high_value_pct, support_pct),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::SessionStats;
    use insights_core::TokenUsage;

    fn session(id: &str, project: &str, tools: &[(&str, u64)], output: u64) -> SessionStats {
        let mut stats = SessionStats {
            session_id: id.to_string(),
            project: project.to_string(),
            usage: TokenUsage {
                output_tokens: output,
                ..TokenUsage::default()
            },
            cost_usd: output as f64 / 1_000_000.0 * 15.0,
            ..SessionStats::default()
        };
        for (tool, count) in tools {
            stats.tool_counts.insert(tool.to_string(), *count);
        }
        stats
    }

    fn run(sessions: Vec<SessionStats>) -> RoiReport {
        let totals = sessions
            .iter()
            .fold(TokenUsage::default(), |acc, s| acc.add(s.usage));
        let total_cost_usd = sessions.iter().map(|s| s.cost_usd).sum();
        analyze_roi(&Aggregate {
            sessions,
            totals,
            total_cost_usd,
            ..Aggregate::default()
        })
    }

    #[test]
    fn tools_classify_into_domains() {
        assert_eq!(classify_tool("Edit"), "coding");
        assert_eq!(classify_tool("WebSearch"), "research");
        assert_eq!(classify_tool("mcp__supabase__execute_sql"), "data");
        assert_eq!(classify_tool("Task"), "agents");
        assert_eq!(classify_tool("SomethingNew"), "other");
    }

    #[test]
    fn first_matching_domain_wins() {
        // "mcp__outlook__read_email" contains both "read" and "mcp__outlook";
        // table order puts it in coding.
        assert_eq!(classify_tool("mcp__outlook__read_email"), "coding");
        assert_eq!(classify_tool("mcp__outlook__send"), "communication");
    }

    #[test]
    fn tokens_split_proportionally_across_domains() {
        let report = run(vec![session(
            "s1",
            "proj",
            &[("Edit", 6), ("WebSearch", 4)],
            100_000,
        )]);
        let coding = report.by_domain.iter().find(|d| d.name == "coding").expect("coding");
        let research = report
            .by_domain
            .iter()
            .find(|d| d.name == "research")
            .expect("research");
        assert_eq!(coding.output_tokens, 60_000);
        assert_eq!(research.output_tokens, 40_000);
    }

    #[test]
    fn projects_rank_by_cost_with_primary_domains() {
        let report = run(vec![
            session("s1", "alpha", &[("Edit", 10)], 2_000_000),
            session("s2", "beta", &[("WebSearch", 5)], 100_000),
        ]);
        assert_eq!(report.by_project[0].name, "alpha");
        assert_eq!(
            report.by_project[0].primary_domains,
            vec![("coding".to_string(), 10)]
        );
    }

    #[test]
    fn balance_score_penalizes_low_value_mix() {
        // 0% high-value loses 20 points and 100% support loses another 15.
        let all_support = run(vec![session("s1", "p", &[("WebSearch", 10)], 100_000)]);
        assert!((all_support.balance_score - 65.0).abs() < 1e-9);

        let all_coding = run(vec![session("s1", "p", &[("Edit", 10)], 100_000)]);
        assert!((all_coding.balance_score - 90.0).abs() < 1e-9);
    }

    #[test]
    fn balance_score_stays_within_bounds() {
        assert_eq!(balance_score(50.0, 30.0), 100.0);
        assert_eq!(balance_score(0.0, 100.0), 65.0);
        assert_eq!(balance_score(100.0, 0.0), 90.0);
    }

    #[test]
    fn empty_window_is_a_zeroed_report() {
        let report = run(Vec::new());
        assert_eq!(report.total_sessions, 0);
        assert!(report.by_domain.is_empty());
        assert_eq!(report.avg_cost_per_session, 0.0);
    }
}
