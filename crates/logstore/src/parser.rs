use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use insights_core::TokenUsage;

use crate::types::{Event, EventPayload};

pub(crate) fn parse_json_line(line: &str) -> Option<Value> {
    serde_json::from_str(line).ok()
}

fn normalize_timestamp(raw: &str) -> Option<String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(
            parsed
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    }
    if let Ok(parsed) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        let dt = DateTime::<Utc>::from_naive_utc_and_offset(parsed, Utc);
        return Some(dt.to_rfc3339_opts(SecondsFormat::Millis, true));
    }
    if let Ok(parsed) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        let dt = DateTime::<Utc>::from_naive_utc_and_offset(parsed, Utc);
        return Some(dt.to_rfc3339_opts(SecondsFormat::Millis, true));
    }
    None
}

/// Normalized record timestamp. Records without one are skipped upstream.
pub(crate) fn entry_timestamp(entry: &Value) -> Option<String> {
    entry
        .get("timestamp")
        .and_then(|value| value.as_str())
        .and_then(normalize_timestamp)
}

/// Deduplication key matching the upstream writer: `message.id:requestId`.
/// Records replayed across files carry the same pair.
pub(crate) fn dedup_key(entry: &Value) -> Option<String> {
    let message = entry.get("message");
    let message_id = entry
        .get("message_id")
        .and_then(|value| value.as_str())
        .or_else(|| message.and_then(|m| m.get("id")).and_then(|value| value.as_str()))?;
    let request_id = entry
        .get("requestId")
        .or_else(|| entry.get("request_id"))
        .and_then(|value| value.as_str())?;
    Some(format!("{}:{}", message_id, request_id))
}

fn extract_model(entry: &Value) -> Option<String> {
    entry
        .get("message")
        .and_then(|message| message.get("model"))
        .and_then(|value| value.as_str())
        .map(str::to_string)
}

fn is_sql_tool(tool: &str) -> bool {
    if !tool.starts_with("mcp__") {
        return false;
    }
    let lower = tool.to_ascii_lowercase();
    lower.contains("sql") || lower.contains("query") || lower.contains("execute")
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// All events carried by one log record. A single assistant record can yield
/// a token-usage event, cache events, and several tool events.
pub(crate) fn events_from_entry(
    entry: &Value,
    ts: &str,
    session_id: &str,
    project: &str,
) -> Vec<Event> {
    let mut events = Vec::new();
    let model = extract_model(entry);
    let make = |payload: EventPayload| Event {
        ts: ts.to_string(),
        session_id: session_id.to_string(),
        project: project.to_string(),
        model: model.clone(),
        payload,
    };

    let entry_type = entry.get("type").and_then(|value| value.as_str());
    let message = entry.get("message");

    if let Some(usage) = message.and_then(|m| m.get("usage")) {
        let field = |key: &str| usage.get(key).and_then(|value| value.as_u64()).unwrap_or(0);
        let tokens = TokenUsage {
            input_tokens: field("input_tokens"),
            output_tokens: field("output_tokens"),
            cache_creation_tokens: field("cache_creation_input_tokens"),
            cache_read_tokens: field("cache_read_input_tokens"),
        };
        if !tokens.is_empty() {
            let key = usage
                .get("cache_key")
                .and_then(|value| value.as_str())
                .map(str::to_string);
            events.push(make(EventPayload::TokenUsage { usage: tokens }));
            if tokens.cache_creation_tokens > 0 {
                events.push(make(EventPayload::CacheCreate {
                    tokens: tokens.cache_creation_tokens,
                    key: key.clone(),
                }));
            }
            if tokens.cache_read_tokens > 0 {
                events.push(make(EventPayload::CacheRead {
                    tokens: tokens.cache_read_tokens,
                    key,
                }));
            }
        }
    }

    if entry_type == Some("assistant")
        && let Some(content) = message.and_then(|m| m.get("content")).and_then(|c| c.as_array())
    {
        for block in content {
            if block.get("type").and_then(|value| value.as_str()) != Some("tool_use") {
                continue;
            }
            let tool = block
                .get("name")
                .and_then(|value| value.as_str())
                .unwrap_or("unknown")
                .to_string();
            events.push(make(EventPayload::ToolCall { tool: tool.clone() }));
            if tool == "Task" {
                events.push(make(EventPayload::AgentSpawn));
            }
            if is_sql_tool(&tool) {
                events.push(make(EventPayload::SqlQuery { tool: tool.clone() }));
            }
            let input = block.get("input");
            if tool == "Skill"
                && let Some(skill) = input
                    .and_then(|i| i.get("skill"))
                    .and_then(|value| value.as_str())
            {
                events.push(make(EventPayload::SkillUse {
                    skill: skill.to_string(),
                }));
            }
            if let Some(path) = input.and_then(|i| {
                i.get("file_path")
                    .or_else(|| i.get("path"))
                    .and_then(|value| value.as_str())
            }) && !path.is_empty()
            {
                events.push(make(EventPayload::FileAccess {
                    path: path.to_string(),
                }));
            }
        }
    }

    if entry_type == Some("user")
        && let Some(content) = message.and_then(|m| m.get("content"))
    {
        if let Some(text) = content.as_str() {
            if !text.is_empty() {
                events.push(make(EventPayload::UserMessage {
                    text: truncate_chars(text, 200),
                }));
            }
        } else if let Some(blocks) = content.as_array() {
            for block in blocks {
                if block.get("type").and_then(|value| value.as_str()) == Some("text")
                    && let Some(text) = block.get("text").and_then(|value| value.as_str())
                    && !text.is_empty()
                {
                    events.push(make(EventPayload::UserMessage {
                        text: truncate_chars(text, 200),
                    }));
                    break;
                }
            }
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(line: &str) -> Value {
        parse_json_line(line).expect("json")
    }

    #[test]
    fn normalizes_offset_timestamps_to_utc() {
        let value = entry(r#"{"timestamp":"2025-12-19T21:31:36+02:00"}"#);
        assert_eq!(
            entry_timestamp(&value).as_deref(),
            Some("2025-12-19T19:31:36.000Z")
        );
    }

    #[test]
    fn missing_timestamp_yields_none() {
        let value = entry(r#"{"type":"assistant"}"#);
        assert!(entry_timestamp(&value).is_none());
    }

    #[test]
    fn dedup_key_needs_both_ids() {
        let value = entry(r#"{"message":{"id":"msg_1"},"requestId":"req_1"}"#);
        assert_eq!(dedup_key(&value).as_deref(), Some("msg_1:req_1"));
        let value = entry(r#"{"message":{"id":"msg_1"}}"#);
        assert!(dedup_key(&value).is_none());
    }

    #[test]
    fn usage_record_yields_token_and_cache_events() {
        let value = entry(
            r#"{"timestamp":"2025-01-01T00:00:00Z","type":"assistant","message":{"model":"claude-3-5-sonnet","usage":{"input_tokens":10,"output_tokens":5,"cache_creation_input_tokens":100,"cache_read_input_tokens":200,"cache_key":"k1"}}}"#,
        );
        let ts = entry_timestamp(&value).expect("ts");
        let events = events_from_entry(&value, &ts, "s1", "proj");
        assert_eq!(events.len(), 3);
        match &events[0].payload {
            EventPayload::TokenUsage { usage } => {
                assert_eq!(usage.input_tokens, 10);
                assert_eq!(usage.cache_read_tokens, 200);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        assert!(matches!(
            &events[1].payload,
            EventPayload::CacheCreate { tokens: 100, key: Some(k) } if k == "k1"
        ));
        assert!(matches!(
            &events[2].payload,
            EventPayload::CacheRead { tokens: 200, key: Some(k) } if k == "k1"
        ));
        assert_eq!(events[0].model.as_deref(), Some("claude-3-5-sonnet"));
    }

    #[test]
    fn tool_use_blocks_fan_out() {
        let value = entry(
            r#"{"timestamp":"2025-01-01T00:00:00Z","type":"assistant","message":{"content":[
                {"type":"tool_use","name":"Read","input":{"file_path":"/tmp/a.rs"}},
                {"type":"tool_use","name":"Task","input":{}},
                {"type":"tool_use","name":"Skill","input":{"skill":"review"}},
                {"type":"tool_use","name":"mcp__supabase__execute_sql","input":{}}
            ]}}"#,
        );
        let events = events_from_entry(&value, "2025-01-01T00:00:00.000Z", "s1", "proj");
        let tools: Vec<_> = events
            .iter()
            .filter_map(|event| match &event.payload {
                EventPayload::ToolCall { tool } => Some(tool.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(tools, vec!["Read", "Task", "Skill", "mcp__supabase__execute_sql"]);
        assert!(events.iter().any(|e| matches!(&e.payload, EventPayload::FileAccess { path } if path == "/tmp/a.rs")));
        assert!(events.iter().any(|e| matches!(e.payload, EventPayload::AgentSpawn)));
        assert!(events.iter().any(|e| matches!(&e.payload, EventPayload::SkillUse { skill } if skill == "review")));
        assert!(events.iter().any(|e| matches!(&e.payload, EventPayload::SqlQuery { tool } if tool.contains("execute_sql"))));
    }

    #[test]
    fn non_mcp_query_tool_is_not_sql() {
        assert!(!is_sql_tool("WebSearch"));
        assert!(!is_sql_tool("query_runner"));
        assert!(is_sql_tool("mcp__db__run_query"));
    }

    #[test]
    fn user_message_is_truncated() {
        let long = "x".repeat(500);
        let raw = format!(
            r#"{{"timestamp":"2025-01-01T00:00:00Z","type":"user","message":{{"content":"{}"}}}}"#,
            long
        );
        let value = entry(&raw);
        let events = events_from_entry(&value, "2025-01-01T00:00:00.000Z", "s1", "proj");
        match &events[0].payload {
            EventPayload::UserMessage { text } => assert_eq!(text.len(), 200),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn user_message_from_text_block() {
        let value = entry(
            r#"{"timestamp":"2025-01-01T00:00:00Z","type":"user","message":{"content":[{"type":"text","text":"fix the build"}]}}"#,
        );
        let events = events_from_entry(&value, "2025-01-01T00:00:00.000Z", "s1", "proj");
        assert!(matches!(
            &events[0].payload,
            EventPayload::UserMessage { text } if text == "fix the build"
        ));
    }
}
