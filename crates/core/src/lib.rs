use serde::{Deserialize, Serialize};

/// Token counts for one usage record or one aggregated scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

impl TokenUsage {
    /// Full context volume: fresh input plus both cache streams plus output.
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_creation_tokens)
            .saturating_add(self.cache_read_tokens)
    }

    pub fn total_input_context(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.cache_creation_tokens)
            .saturating_add(self.cache_read_tokens)
    }

    pub fn add(self, other: TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens.saturating_add(other.input_tokens),
            output_tokens: self.output_tokens.saturating_add(other.output_tokens),
            cache_creation_tokens: self
                .cache_creation_tokens
                .saturating_add(other.cache_creation_tokens),
            cache_read_tokens: self.cache_read_tokens.saturating_add(other.cache_read_tokens),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens() == 0
    }
}

/// Pricing for one model family, USD per million tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingRule {
    pub model_pattern: String,
    pub input_per_1m: f64,
    pub output_per_1m: f64,
    pub cache_create_per_1m: f64,
    pub cache_read_per_1m: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_cost_usd: f64,
    pub output_cost_usd: f64,
    pub cache_create_cost_usd: f64,
    pub cache_read_cost_usd: f64,
    pub total_cost_usd: f64,
}

pub fn compute_cost_breakdown(usage: TokenUsage, rule: &PricingRule) -> CostBreakdown {
    let per_m = |tokens: u64, rate: f64| (tokens as f64 / 1_000_000.0) * rate;
    let input_cost = per_m(usage.input_tokens, rule.input_per_1m);
    let output_cost = per_m(usage.output_tokens, rule.output_per_1m);
    let create_cost = per_m(usage.cache_creation_tokens, rule.cache_create_per_1m);
    let read_cost = per_m(usage.cache_read_tokens, rule.cache_read_per_1m);
    CostBreakdown {
        input_cost_usd: input_cost,
        output_cost_usd: output_cost,
        cache_create_cost_usd: create_cost,
        cache_read_cost_usd: read_cost,
        total_cost_usd: input_cost + output_cost + create_cost + read_cost,
    }
}

pub fn compute_cost_usd(usage: TokenUsage, rule: &PricingRule) -> f64 {
    compute_cost_breakdown(usage, rule).total_cost_usd
}

/// Case-insensitive glob match with `*` wildcards only.
pub fn model_matches_pattern(model: &str, pattern: &str) -> bool {
    let model = model.to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return model == pattern;
    }
    let anchored_start = !pattern.starts_with('*');
    let anchored_end = !pattern.ends_with('*');
    let mut remainder = model.as_str();
    for (index, part) in pattern.split('*').filter(|part| !part.is_empty()).enumerate() {
        match remainder.find(part) {
            Some(at) => {
                if index == 0 && anchored_start && at != 0 {
                    return false;
                }
                remainder = &remainder[at + part.len()..];
            }
            None => return false,
        }
    }
    !anchored_end || remainder.is_empty()
}

/// Select the pricing rule for a model, preferring the first specific match
/// over a trailing catch-all.
pub fn rule_for_model<'a>(rules: &'a [PricingRule], model: &str) -> Option<&'a PricingRule> {
    rules
        .iter()
        .find(|rule| rule.model_pattern != "*" && model_matches_pattern(model, &rule.model_pattern))
        .or_else(|| rules.iter().find(|rule| rule.model_pattern == "*"))
}

/// Built-in per-1M USD rates. The catch-all mirrors Sonnet, the model the
/// loader assumes when a record carries no model field.
pub fn default_pricing_rules() -> Vec<PricingRule> {
    vec![
        PricingRule {
            model_pattern: "*opus*".to_string(),
            input_per_1m: 15.0,
            output_per_1m: 75.0,
            cache_create_per_1m: 18.75,
            cache_read_per_1m: 1.50,
        },
        PricingRule {
            model_pattern: "*haiku*".to_string(),
            input_per_1m: 0.80,
            output_per_1m: 4.0,
            cache_create_per_1m: 1.0,
            cache_read_per_1m: 0.08,
        },
        PricingRule {
            model_pattern: "*sonnet*".to_string(),
            input_per_1m: 3.0,
            output_per_1m: 15.0,
            cache_create_per_1m: 3.75,
            cache_read_per_1m: 0.30,
        },
        PricingRule {
            model_pattern: "*".to_string(),
            input_per_1m: 3.0,
            output_per_1m: 15.0,
            cache_create_per_1m: 3.75,
            cache_read_per_1m: 0.30,
        },
    ]
}

/// Format a token count with K/M suffix for human-facing summaries.
pub fn format_tokens(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

pub fn format_cost(cost: f64) -> String {
    if cost >= 1.0 {
        format!("${:.2}", cost)
    } else {
        format!("${:.4}", cost)
    }
}
