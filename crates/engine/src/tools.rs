use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::aggregate::Aggregate;

/// Per-tool totals. Token and cost figures are estimates split evenly over
/// a session's calls.
#[derive(Debug, Clone, Serialize)]
pub struct ToolStats {
    pub name: String,
    pub calls: u64,
    pub sessions: usize,
    pub est_output_tokens: u64,
    pub est_cost_usd: f64,
}

impl ToolStats {
    pub fn avg_tokens_per_call(&self) -> f64 {
        if self.calls > 0 {
            self.est_output_tokens as f64 / self.calls as f64
        } else {
            0.0
        }
    }
}

/// One MCP server with its operations. Tool names follow the
/// `mcp__<server>__<operation>` convention.
#[derive(Debug, Clone, Serialize)]
pub struct McpServerStats {
    pub server: String,
    pub total_calls: u64,
    pub est_output_tokens: u64,
    pub est_cost_usd: f64,
    /// Operations sorted by call count, descending.
    pub operations: Vec<ToolStats>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolReport {
    pub total_sessions: usize,
    pub total_calls: u64,
    /// Tools sorted by call count, descending, top 20.
    pub tools: Vec<ToolStats>,
    /// Servers sorted by call count, descending.
    pub mcp_servers: Vec<McpServerStats>,
    /// Operation category totals, sorted by count descending.
    pub categories: Vec<(String, u64)>,
}

fn category(tool: &str) -> &'static str {
    match tool {
        "Read" | "Write" | "Edit" | "Glob" | "Grep" => "File Operations",
        "Bash" => "Shell Commands",
        "Task" | "TaskOutput" => "Agent Spawning",
        "Skill" => "Skill Invocations",
        "WebSearch" | "WebFetch" => "Web Operations",
        "TodoWrite" => "Task Management",
        _ if tool.starts_with("mcp__") => "MCP Calls",
        _ => "Other",
    }
}

fn split_mcp(tool: &str) -> Option<(&str, &str)> {
    let rest = tool.strip_prefix("mcp__")?;
    Some(match rest.split_once("__") {
        Some((server, operation)) => (server, operation),
        None => (rest, "unknown"),
    })
}

#[derive(Default)]
struct Accum {
    calls: u64,
    sessions: BTreeSet<String>,
    output_tokens: f64,
    cost_usd: f64,
}

/// Break the window's tool calls down by tool, MCP server, and operation
/// category.
pub fn analyze_tools(aggregate: &Aggregate) -> ToolReport {
    let mut tools: BTreeMap<String, Accum> = BTreeMap::new();
    let mut servers: BTreeMap<String, BTreeMap<String, Accum>> = BTreeMap::new();
    let mut categories: BTreeMap<&'static str, u64> = BTreeMap::new();
    let mut total_calls = 0u64;

    for session in &aggregate.sessions {
        let session_calls = session.tool_calls();
        if session_calls == 0 {
            continue;
        }
        let tokens_per_call = session.usage.output_tokens as f64 / session_calls as f64;
        let cost_per_call = session.cost_usd / session_calls as f64;
        for (tool, &count) in &session.tool_counts {
            total_calls += count;
            let accum = tools.entry(tool.clone()).or_default();
            accum.calls += count;
            accum.sessions.insert(session.session_id.clone());
            accum.output_tokens += tokens_per_call * count as f64;
            accum.cost_usd += cost_per_call * count as f64;
            *categories.entry(category(tool)).or_insert(0) += count;
            if let Some((server, operation)) = split_mcp(tool) {
                let op = servers
                    .entry(server.to_string())
                    .or_default()
                    .entry(operation.to_string())
                    .or_default();
                op.calls += count;
                op.sessions.insert(session.session_id.clone());
                op.output_tokens += tokens_per_call * count as f64;
                op.cost_usd += cost_per_call * count as f64;
            }
        }
    }

    let to_stats = |name: String, accum: Accum| ToolStats {
        name,
        calls: accum.calls,
        sessions: accum.sessions.len(),
        est_output_tokens: accum.output_tokens.round() as u64,
        est_cost_usd: accum.cost_usd,
    };

    let mut tool_list: Vec<ToolStats> = tools.into_iter().map(|(n, a)| to_stats(n, a)).collect();
    tool_list.sort_by(|a, b| b.calls.cmp(&a.calls).then_with(|| a.name.cmp(&b.name)));
    tool_list.truncate(20);

    let mut mcp_servers: Vec<McpServerStats> = servers
        .into_iter()
        .map(|(server, ops)| {
            let mut operations: Vec<ToolStats> =
                ops.into_iter().map(|(n, a)| to_stats(n, a)).collect();
            operations.sort_by(|a, b| b.calls.cmp(&a.calls).then_with(|| a.name.cmp(&b.name)));
            McpServerStats {
                server,
                total_calls: operations.iter().map(|op| op.calls).sum(),
                est_output_tokens: operations.iter().map(|op| op.est_output_tokens).sum(),
                est_cost_usd: operations.iter().map(|op| op.est_cost_usd).sum(),
                operations,
            }
        })
        .collect();
    mcp_servers.sort_by(|a, b| {
        b.total_calls
            .cmp(&a.total_calls)
            .then_with(|| a.server.cmp(&b.server))
    });

    let mut category_list: Vec<(String, u64)> = categories
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect();
    category_list.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ToolReport {
        total_sessions: aggregate.sessions.len(),
        total_calls,
        tools: tool_list,
        mcp_servers,
        categories: category_list,
    }
}
