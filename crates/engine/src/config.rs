use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use insights_core::PricingRule;
use logstore::Window;

use crate::error::{EngineError, Result};

/// Per-rule anomaly thresholds. A count or total is anomalous only when it
/// is strictly greater than its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    pub tool_loop: u64,
    pub file_loop: u64,
    pub sql_loop: u64,
    pub token_spike: u64,
    pub agent_storm: u64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            tool_loop: 20,
            file_loop: 10,
            sql_loop: 10,
            token_spike: 500_000,
            agent_storm: 10,
        }
    }
}

/// How long a cache creation stays eligible to be read back before it
/// counts as wasted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheRetention {
    /// Reads only count within the creating session.
    #[default]
    EndOfSession,
    /// A key read anywhere in the scanned window redeems its creation.
    WholeWindow,
}

/// Analysis settings. `Default` gives a runnable configuration; callers
/// override fields and then call [`EngineConfig::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log store root. `None` resolves through [`logstore::default_data_path`].
    pub data_path: Option<PathBuf>,
    pub window: Window,
    pub project: Option<String>,
    pub thresholds: AnomalyThresholds,
    /// Hit rate below which a session is flagged, on [0, 1].
    pub cache_warn_rate: f64,
    /// Sessions with less total input context than this are ignored when
    /// flagging low cache hit rates.
    pub significant_context_tokens: u64,
    pub cache_retention: CacheRetention,
    pub forecast_lookback_days: u32,
    pub forecast_horizon_days: u32,
    /// Local-day offset from UTC, in minutes, used when bucketing by date.
    pub utc_offset_minutes: i32,
    /// Pricing override. `None` uses the built-in rate table.
    pub pricing: Option<Vec<PricingRule>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            window: Window::default(),
            project: None,
            thresholds: AnomalyThresholds::default(),
            cache_warn_rate: 0.60,
            significant_context_tokens: 100_000,
            cache_retention: CacheRetention::default(),
            forecast_lookback_days: 30,
            forecast_horizon_days: 7,
            utc_offset_minutes: 0,
            pricing: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if t.tool_loop == 0 || t.file_loop == 0 || t.sql_loop == 0 || t.token_spike == 0
            || t.agent_storm == 0
        {
            return Err(EngineError::Config(
                "anomaly thresholds must be nonzero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.cache_warn_rate) {
            return Err(EngineError::Config(format!(
                "cache_warn_rate must be within [0, 1], got {}",
                self.cache_warn_rate
            )));
        }
        if !(7..=90).contains(&self.forecast_lookback_days) {
            return Err(EngineError::Config(format!(
                "forecast_lookback_days must be within [7, 90], got {}",
                self.forecast_lookback_days
            )));
        }
        if self.forecast_horizon_days == 0 {
            return Err(EngineError::Config(
                "forecast_horizon_days must be nonzero".to_string(),
            ));
        }
        if self.utc_offset_minutes.abs() > 14 * 60 {
            return Err(EngineError::Config(format!(
                "utc_offset_minutes must be within +/-840, got {}",
                self.utc_offset_minutes
            )));
        }
        if let Some(rules) = &self.pricing {
            if rules.is_empty() {
                return Err(EngineError::Config(
                    "pricing override must list at least one rule".to_string(),
                ));
            }
            for rule in rules {
                if rule.model_pattern.is_empty() {
                    return Err(EngineError::Config(
                        "pricing rule has an empty model pattern".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn pricing_rules(&self) -> Vec<PricingRule> {
        self.pricing
            .clone()
            .unwrap_or_else(insights_core::default_pricing_rules)
    }
}
