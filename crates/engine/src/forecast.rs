use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tracing::debug;

use crate::aggregate::Aggregate;
use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayProjection {
    pub date: String,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

/// Usage forecast for the coming horizon. Always produced; sparse history
/// lowers the confidence instead of failing.
#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub days_observed: usize,
    pub confidence: Confidence,
    pub trend: Trend,
    pub daily_avg_output: f64,
    /// Fitted change in daily output tokens per day.
    pub slope_per_day: f64,
    pub residual_cv: Option<f64>,
    pub projections: Vec<DayProjection>,
    pub projected_total_output: u64,
    pub projected_cost_usd: f64,
}

fn parse_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Weighted least squares with a linear recency ramp: the newest sample
/// weighs `n` times the oldest.
fn weighted_fit(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    let n = xs.len();
    let mut sw = 0.0;
    let mut swx = 0.0;
    let mut swy = 0.0;
    let mut swxx = 0.0;
    let mut swxy = 0.0;
    for i in 0..n {
        let w = (i + 1) as f64;
        sw += w;
        swx += w * xs[i];
        swy += w * ys[i];
        swxx += w * xs[i] * xs[i];
        swxy += w * xs[i] * ys[i];
    }
    let denom = sw * swxx - swx * swx;
    if denom.abs() < f64::EPSILON {
        return (swy / sw, 0.0);
    }
    let slope = (sw * swxy - swx * swy) / denom;
    let intercept = (swy - slope * swx) / sw;
    (intercept, slope)
}

fn trend_direction(ys: &[f64]) -> Trend {
    if ys.len() < 2 {
        return Trend::Stable;
    }
    let half = ys.len() / 2;
    let first: f64 = ys[..half].iter().sum::<f64>() / half as f64;
    let second: f64 = ys[half..].iter().sum::<f64>() / (ys.len() - half) as f64;
    if first <= f64::EPSILON {
        return if second > f64::EPSILON {
            Trend::Increasing
        } else {
            Trend::Stable
        };
    }
    let change = (second - first) / first;
    if change > 0.10 {
        Trend::Increasing
    } else if change < -0.10 {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

/// Project daily output tokens over the configured horizon.
pub fn forecast_usage(aggregate: &Aggregate, config: &EngineConfig) -> Forecast {
    // Newest `lookback` days with recorded usage, oldest first.
    let mut observed: Vec<(NaiveDate, f64)> = aggregate
        .days
        .iter()
        .filter_map(|day| parse_date(&day.date).map(|d| (d, day.usage.output_tokens as f64)))
        .collect();
    observed.sort_by_key(|(date, _)| *date);
    let lookback = config.forecast_lookback_days as usize;
    if observed.len() > lookback {
        observed.drain(..observed.len() - lookback);
    }

    let days_observed = observed.len();
    let ys: Vec<f64> = observed.iter().map(|(_, y)| *y).collect();
    let daily_avg_output = if ys.is_empty() {
        0.0
    } else {
        ys.iter().sum::<f64>() / ys.len() as f64
    };

    if days_observed < 3 {
        debug!(days_observed, "too little history to project");
        return Forecast {
            days_observed,
            confidence: Confidence::Low,
            trend: trend_direction(&ys),
            daily_avg_output,
            slope_per_day: 0.0,
            residual_cv: None,
            projections: Vec::new(),
            projected_total_output: 0,
            projected_cost_usd: 0.0,
        };
    }

    let first_date = observed[0].0;
    let xs: Vec<f64> = observed
        .iter()
        .map(|(date, _)| (*date - first_date).num_days() as f64)
        .collect();
    let (intercept, slope) = weighted_fit(&xs, &ys);

    let residual_cv = if daily_avg_output > f64::EPSILON {
        let variance = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| {
                let r = y - (intercept + slope * x);
                r * r
            })
            .sum::<f64>()
            / xs.len() as f64;
        Some(variance.sqrt() / daily_avg_output)
    } else {
        None
    };

    let confidence = match residual_cv {
        Some(cv) if cv < 0.3 && days_observed >= 5 => Confidence::High,
        Some(cv) if cv < 0.6 => Confidence::Medium,
        _ => Confidence::Low,
    };

    // Cost scales with the window's realized cost per output token.
    let cost_per_output = if aggregate.totals.output_tokens > 0 {
        aggregate.total_cost_usd / aggregate.totals.output_tokens as f64
    } else {
        0.0
    };

    let last_date = observed[days_observed - 1].0;
    let last_x = xs[days_observed - 1];
    let mut projections = Vec::new();
    let mut projected_total = 0u64;
    for ahead in 1..=config.forecast_horizon_days {
        let date = last_date + Duration::days(ahead as i64);
        let predicted = (intercept + slope * (last_x + ahead as f64)).max(0.0);
        let tokens = predicted.round() as u64;
        projected_total = projected_total.saturating_add(tokens);
        projections.push(DayProjection {
            date: date.format("%Y-%m-%d").to_string(),
            output_tokens: tokens,
            cost_usd: tokens as f64 * cost_per_output,
        });
    }

    Forecast {
        days_observed,
        confidence,
        trend: trend_direction(&ys),
        daily_avg_output,
        slope_per_day: slope,
        residual_cv,
        projections,
        projected_total_output: projected_total,
        projected_cost_usd: projected_total as f64 * cost_per_output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DayStats;
    use insights_core::TokenUsage;

    fn day(date: &str, output: u64) -> DayStats {
        DayStats {
            date: date.to_string(),
            usage: TokenUsage {
                output_tokens: output,
                ..TokenUsage::default()
            },
            cost_usd: 0.0,
            sessions: 1,
        }
    }

    fn run(days: Vec<DayStats>) -> Forecast {
        let aggregate = Aggregate {
            days,
            ..Aggregate::default()
        };
        forecast_usage(&aggregate, &EngineConfig::default())
    }

    #[test]
    fn sparse_history_is_low_confidence_with_no_projection() {
        let forecast = run(vec![day("2025-01-01", 100), day("2025-01-02", 200)]);
        assert_eq!(forecast.days_observed, 2);
        assert_eq!(forecast.confidence, Confidence::Low);
        assert!(forecast.projections.is_empty());
    }

    #[test]
    fn empty_window_still_yields_a_forecast() {
        let forecast = run(Vec::new());
        assert_eq!(forecast.days_observed, 0);
        assert_eq!(forecast.confidence, Confidence::Low);
        assert_eq!(forecast.projected_total_output, 0);
    }

    #[test]
    fn steady_week_is_high_confidence_and_stable() {
        let days = (1..=7)
            .map(|d| day(&format!("2025-01-{:02}", d), 100_000))
            .collect();
        let forecast = run(days);
        assert_eq!(forecast.confidence, Confidence::High);
        assert_eq!(forecast.trend, Trend::Stable);
        assert_eq!(forecast.projections.len(), 7);
        assert_eq!(forecast.projections[0].date, "2025-01-08");
        // A flat series projects itself.
        assert!(forecast.projections.iter().all(|p| {
            (p.output_tokens as f64 - 100_000.0).abs() < 1.0
        }));
    }

    #[test]
    fn growing_week_trends_increasing() {
        let days = (1..=7)
            .map(|d| day(&format!("2025-01-{:02}", d), 50_000 * d as u64))
            .collect();
        let forecast = run(days);
        assert_eq!(forecast.trend, Trend::Increasing);
        assert!(forecast.slope_per_day > 0.0);
        assert!(forecast.projections[0].output_tokens > 350_000);
    }

    #[test]
    fn gently_rising_week_projects_the_trend() {
        let series = [100_000u64, 110_000, 105_000, 120_000, 115_000, 130_000, 125_000];
        let days = series
            .iter()
            .enumerate()
            .map(|(i, &output)| day(&format!("2025-01-{:02}", i + 1), output))
            .collect();
        let forecast = run(days);
        assert!(matches!(
            forecast.confidence,
            Confidence::High | Confidence::Medium
        ));
        assert_eq!(forecast.trend, Trend::Increasing);
        assert!(forecast.slope_per_day > 0.0);
        let next = forecast.projections[0].output_tokens;
        assert!(next > 120_000 && next < 160_000, "next = {}", next);
    }

    #[test]
    fn noisy_history_drops_confidence() {
        let days = vec![
            day("2025-01-01", 10_000),
            day("2025-01-02", 900_000),
            day("2025-01-03", 5_000),
            day("2025-01-04", 700_000),
            day("2025-01-05", 20_000),
        ];
        let forecast = run(days);
        assert_eq!(forecast.confidence, Confidence::Low);
    }

    #[test]
    fn declining_slope_never_projects_negative_tokens() {
        let days = vec![
            day("2025-01-01", 300_000),
            day("2025-01-02", 200_000),
            day("2025-01-03", 100_000),
            day("2025-01-04", 10_000),
        ];
        let forecast = run(days);
        assert_eq!(forecast.trend, Trend::Decreasing);
        assert!(forecast.slope_per_day < 0.0);
        // The fitted line goes negative on day one of the horizon.
        assert!(forecast.projections.iter().all(|p| p.output_tokens == 0));
    }
}
