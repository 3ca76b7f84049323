//! Statistical anomaly detector for ad metrics.
//!
//! Z-score based detection against the account baseline:
//! - severity banded on |z| (mild / significant / extreme)
//! - only deviations in a metric's examined directions are considered
//! - the bad-only filter drops business-positive deviations; CTR spikes
//!   surface with unknown polarity (possible click fraud)
//!
//! An ad exceeding thresholds on several metrics yields one anomaly per
//! metric; de-duplication by ad identity happens downstream when grouping
//! final output.

use crate::baseline::UNIFORM_EPSILON;
use adpulse_core::config::AnomalyConfig;
use adpulse_core::types::{
    AccountBaseline, AdSummary, Anomaly, Direction, Metric, Polarity, Severity,
};
use std::collections::HashMap;
use tracing::{debug, info};

/// Classifies ad summaries into bad-polarity anomalies
#[derive(Debug)]
pub struct AnomalyDetector;

impl AnomalyDetector {
    /// Detect anomalies across all summaries and monitored metrics.
    ///
    /// Output is sorted by descending |z|, then ascending ad identifier -
    /// the stable rendering key. Per metric, at most `max_per_metric`
    /// anomalies survive, strongest first.
    pub fn detect(
        summaries: &[AdSummary],
        baseline: &AccountBaseline,
        config: &AnomalyConfig,
    ) -> Vec<Anomaly> {
        let mut by_metric: HashMap<Metric, Vec<Anomaly>> = HashMap::new();

        for metric in Metric::ALL {
            let Some(stats) = baseline.get(metric) else {
                continue;
            };
            if !stats.sufficient {
                debug!(metric = %metric, count = stats.count, "Baseline insufficient, skipping metric");
                continue;
            }
            if stats.stddev <= UNIFORM_EPSILON {
                debug!(metric = %metric, "Metric uniform across account, skipping");
                continue;
            }

            for summary in summaries {
                if summary.spend < config.min_spend {
                    continue;
                }
                let Some(observed) = summary.metric_value(metric) else {
                    continue;
                };

                let z = (observed - stats.mean) / stats.stddev;
                let Some(severity) = severity_for(z.abs(), config) else {
                    continue;
                };

                let direction = if z > 0.0 { Direction::High } else { Direction::Low };
                if !metric.directions().contains(&direction) {
                    continue;
                }

                let polarity = polarity_for(metric, direction, summary, baseline);

                // bad-only filter: severity >= significant and not business-good
                if severity < Severity::Significant || polarity == Polarity::Good {
                    continue;
                }

                let pct_change = if stats.mean != 0.0 {
                    (observed - stats.mean) / stats.mean * 100.0
                } else {
                    0.0
                };

                by_metric.entry(metric).or_default().push(Anomaly {
                    ad_id: summary.ad_id.clone(),
                    ad_name: summary.ad_name.clone(),
                    provider: summary.provider,
                    metric,
                    observed,
                    baseline_mean: stats.mean,
                    baseline_stddev: stats.stddev,
                    z_score: z,
                    direction,
                    severity,
                    polarity,
                    pct_change,
                    spend: summary.spend,
                });
            }
        }

        let mut anomalies = Vec::new();
        for (_, mut group) in by_metric {
            // strongest deviation first; equal |z| ordered by spend
            // (cost of inaction)
            group.sort_by(|a, b| {
                b.z_score
                    .abs()
                    .partial_cmp(&a.z_score.abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        b.spend
                            .partial_cmp(&a.spend)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
            });
            group.truncate(config.max_per_metric);
            anomalies.extend(group);
        }

        anomalies.sort_by(|a, b| {
            b.z_score
                .abs()
                .partial_cmp(&a.z_score.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.ad_id.cmp(&b.ad_id))
                .then_with(|| a.metric.as_str().cmp(b.metric.as_str()))
        });

        info!(count = anomalies.len(), "Anomaly detection complete");
        ::metrics::counter!("adpulse_anomalies_detected_total").increment(anomalies.len() as u64);
        anomalies
    }
}

fn severity_for(abs_z: f64, config: &AnomalyConfig) -> Option<Severity> {
    if abs_z >= config.extreme_sigma {
        Some(Severity::Extreme)
    } else if abs_z >= config.threshold_sigma {
        Some(Severity::Significant)
    } else if abs_z >= config.mild_sigma {
        Some(Severity::Mild)
    } else {
        None
    }
}

/// Fixed direction/polarity table.
///
/// A spend spike is waste only when the ad's window ROAS sits below the
/// account mean; otherwise the extra spend is earning and the deviation is
/// good.
fn polarity_for(
    metric: Metric,
    direction: Direction,
    summary: &AdSummary,
    baseline: &AccountBaseline,
) -> Polarity {
    match (metric, direction) {
        (Metric::Roas, Direction::Low) => Polarity::Bad,
        (Metric::Roas, Direction::High) => Polarity::Good,
        (Metric::Cpa, Direction::High) => Polarity::Bad,
        (Metric::Cpa, Direction::Low) => Polarity::Good,
        (Metric::Cpm, Direction::High) => Polarity::Bad,
        (Metric::Cpm, Direction::Low) => Polarity::Good,
        (Metric::Ctr, Direction::Low) => Polarity::Bad,
        (Metric::Ctr, Direction::High) => Polarity::Unknown,
        (Metric::Spend, Direction::Low) => Polarity::Bad,
        (Metric::Spend, Direction::High) => {
            let account_roas = baseline.get(Metric::Roas).map(|b| b.mean).unwrap_or(0.0);
            if summary.roas < account_roas {
                Polarity::Bad
            } else {
                Polarity::Good
            }
        }
    }
}
