use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::aggregate::Aggregate;

/// Usage of one skill across the window. Token and cost figures are
/// estimates split evenly over a session's skill invocations.
#[derive(Debug, Clone, Serialize)]
pub struct SkillStats {
    pub name: String,
    pub invocations: u64,
    pub sessions: usize,
    pub projects: Vec<String>,
    pub est_output_tokens: u64,
    pub est_cost_usd: f64,
}

impl SkillStats {
    pub fn avg_tokens_per_invocation(&self) -> f64 {
        if self.invocations > 0 {
            self.est_output_tokens as f64 / self.invocations as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SkillReport {
    pub total_skills: usize,
    pub total_invocations: u64,
    pub sessions_with_skills: usize,
    /// Skills sorted by invocation count, descending.
    pub skills: Vec<SkillStats>,
    /// Skills with at least three invocations, cheapest per invocation
    /// first.
    pub by_efficiency: Vec<SkillStats>,
}

#[derive(Default)]
struct Accum {
    invocations: u64,
    sessions: BTreeSet<String>,
    projects: BTreeSet<String>,
    output_tokens: f64,
    cost_usd: f64,
}

pub fn analyze_skills(aggregate: &Aggregate) -> SkillReport {
    let mut skills: BTreeMap<String, Accum> = BTreeMap::new();
    let mut sessions_with_skills = 0usize;

    for session in &aggregate.sessions {
        let session_invocations: u64 = session.skill_counts.values().sum();
        if session_invocations == 0 {
            continue;
        }
        sessions_with_skills += 1;
        let tokens_per = session.usage.output_tokens as f64 / session_invocations as f64;
        let cost_per = session.cost_usd / session_invocations as f64;
        for (skill, &count) in &session.skill_counts {
            let accum = skills.entry(skill.clone()).or_default();
            accum.invocations += count;
            accum.sessions.insert(session.session_id.clone());
            accum.projects.insert(session.project.clone());
            accum.output_tokens += tokens_per * count as f64;
            accum.cost_usd += cost_per * count as f64;
        }
    }

    let mut list: Vec<SkillStats> = skills
        .into_iter()
        .map(|(name, accum)| SkillStats {
            name,
            invocations: accum.invocations,
            sessions: accum.sessions.len(),
            projects: accum.projects.into_iter().collect(),
            est_output_tokens: accum.output_tokens.round() as u64,
            est_cost_usd: accum.cost_usd,
        })
        .collect();
    list.sort_by(|a, b| {
        b.invocations
            .cmp(&a.invocations)
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut by_efficiency: Vec<SkillStats> = list
        .iter()
        .filter(|skill| skill.invocations >= 3)
        .cloned()
        .collect();
    by_efficiency.sort_by(|a, b| {
        a.avg_tokens_per_invocation()
            .partial_cmp(&b.avg_tokens_per_invocation())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });

    SkillReport {
        total_skills: list.len(),
        total_invocations: list.iter().map(|skill| skill.invocations).sum(),
        sessions_with_skills,
        skills: list,
        by_efficiency,
    }
}
