//! Account baseline computation.
//!
//! For each monitored metric: mean (spend-weighted for ratio metrics,
//! unweighted for spend itself), population standard deviation, median, and
//! the contributing-ad count. A baseline is sufficient only when at least
//! `min_sample_size` ads contribute; detection emits nothing for a metric
//! whose baseline is insufficient or uniform.

use crate::stats;
use adpulse_core::config::AnomalyConfig;
use adpulse_core::types::{AccountBaseline, AdSummary, Metric, MetricBaseline};
use std::collections::HashMap;
use tracing::debug;

/// Standard deviation at or below this means the metric is uniform across
/// the account and no anomalies are emitted for it
pub const UNIFORM_EPSILON: f64 = 1e-6;

/// Computes per-metric account baselines over frozen ad summaries
#[derive(Debug)]
pub struct BaselineEngine;

impl BaselineEngine {
    /// Compute baselines for every monitored metric.
    ///
    /// Ads missing a value for one metric are excluded from that metric's
    /// baseline but still contribute to the others.
    pub fn compute(summaries: &[AdSummary], config: &AnomalyConfig) -> AccountBaseline {
        let mut metrics = HashMap::new();

        for metric in Metric::ALL {
            let mut values = Vec::with_capacity(summaries.len());
            let mut weights = Vec::with_capacity(summaries.len());
            for summary in summaries {
                if let Some(value) = summary.metric_value(metric) {
                    values.push(value);
                    weights.push(summary.spend);
                }
            }

            if values.is_empty() {
                continue;
            }

            let mean = match metric {
                Metric::Spend => stats::mean(&values),
                _ => stats::weighted_mean(&values, &weights),
            };
            let Some(mean) = mean else { continue };

            let count = values.len();
            let baseline = MetricBaseline {
                metric,
                mean,
                stddev: stats::population_stddev(&values, mean),
                median: stats::median(&values).unwrap_or(mean),
                count,
                sufficient: count >= config.min_sample_size,
            };
            debug!(
                metric = %metric,
                mean = baseline.mean,
                stddev = baseline.stddev,
                count,
                sufficient = baseline.sufficient,
                "Baseline computed"
            );
            metrics.insert(metric, baseline);
        }

        AccountBaseline {
            metrics,
            min_sample_size: config.min_sample_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adpulse_core::types::Provider;
    use chrono::NaiveDate;

    fn summary(ad_id: &str, spend: f64, roas: f64) -> AdSummary {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        AdSummary {
            ad_id: ad_id.to_string(),
            ad_name: format!("{ad_id} name"),
            provider: Provider::Meta,
            spend,
            roas,
            ctr: Some(0.02),
            cpm: None,
            cpa: None,
            conversions: 10,
            days_active: 30,
            first_active: date,
            last_active: date,
        }
    }

    #[test]
    fn test_sufficient_flag_iff_min_sample_size() {
        let config = AnomalyConfig {
            min_sample_size: 3,
            ..Default::default()
        };

        let two: Vec<AdSummary> = (0..2).map(|i| summary(&format!("ad-{i}"), 100.0, 2.0)).collect();
        let baseline = BaselineEngine::compute(&two, &config);
        assert!(!baseline.get(Metric::Roas).unwrap().sufficient);

        let three: Vec<AdSummary> =
            (0..3).map(|i| summary(&format!("ad-{i}"), 100.0, 2.0)).collect();
        let baseline = BaselineEngine::compute(&three, &config);
        assert!(baseline.get(Metric::Roas).unwrap().sufficient);
        assert_eq!(baseline.get(Metric::Roas).unwrap().count, 3);
    }

    #[test]
    fn test_roas_mean_is_spend_weighted() {
        let config = AnomalyConfig::default();
        let summaries = vec![
            summary("ad-1", 100.0, 2.0),
            summary("ad-2", 300.0, 6.0),
        ];
        let baseline = BaselineEngine::compute(&summaries, &config);
        // (2*100 + 6*300) / 400 = 5.0, not the unweighted 4.0
        assert!((baseline.get(Metric::Roas).unwrap().mean - 5.0).abs() < 1e-9);
        // spend itself stays unweighted
        assert!((baseline.get(Metric::Spend).unwrap().mean - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_values_excluded_per_metric() {
        let config = AnomalyConfig::default();
        let mut with_cpa = summary("ad-1", 100.0, 2.0);
        with_cpa.cpa = Some(10.0);
        let without_cpa = summary("ad-2", 100.0, 3.0);

        let baseline = BaselineEngine::compute(&[with_cpa, without_cpa], &config);
        assert_eq!(baseline.get(Metric::Cpa).unwrap().count, 1);
        assert_eq!(baseline.get(Metric::Roas).unwrap().count, 2);
    }

    #[test]
    fn test_uniform_metric_has_zero_stddev() {
        let config = AnomalyConfig::default();
        let summaries: Vec<AdSummary> =
            (0..12).map(|i| summary(&format!("ad-{i}"), 100.0, 4.0)).collect();
        let baseline = BaselineEngine::compute(&summaries, &config);
        assert!(baseline.get(Metric::Roas).unwrap().stddev <= UNIFORM_EPSILON);
    }
}
