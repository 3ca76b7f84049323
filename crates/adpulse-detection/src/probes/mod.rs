//! Diagnostic probes.
//!
//! Six side-effect-free checks over warehouse series. Each probe is a pure
//! function of (tenant, ad identity, window): it reads through the metric
//! store, never mutates state, and emits structured [`Evidence`]. A probe
//! raises only on upstream unavailability; a business-level "can't decide"
//! is recorded as inconclusive evidence, never an error.
//!
//! The probe set is a closed catalog - part of the contract the model is
//! steered against via the decision-table hint - so dispatch is a match on
//! [`ProbeKind`], not a plugin registry.

mod budget_exhaustion;
mod cpm_spike;
mod creative_fatigue;
mod landing_page;
mod seasonality;
mod tracking;

use adpulse_core::config::ProbeConfig;
use adpulse_core::types::{Evidence, Metric, ProbeKind, Severity};
use adpulse_core::{Error, Result};
use adpulse_warehouse::MetricStore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Catalog entry presented to the model for one probe
#[derive(Debug, Clone, Serialize)]
pub struct ProbeSpec {
    /// Probe name
    pub name: &'static str,
    /// One-sentence description
    pub description: &'static str,
    /// Input parameter names
    pub parameters: &'static [&'static str],
    /// Output schema sketch
    pub output: &'static str,
}

/// The fixed six-probe catalog presented to the model
pub fn catalog() -> Vec<ProbeSpec> {
    ProbeKind::ALL
        .iter()
        .map(|kind| ProbeSpec {
            name: kind.as_str(),
            description: describe(*kind),
            parameters: &["ad_id", "window_days", "tenant"],
            output: "{ fired: bool, measurements: map<string, number>, interpretation: string }",
        })
        .collect()
}

fn describe(kind: ProbeKind) -> &'static str {
    match kind {
        ProbeKind::CpmSpike => {
            "Compares mean CPM of the last 3 days against the prior 7 days; a rise above 25% means auction costs spiked"
        }
        ProbeKind::CreativeFatigue => {
            "Fits a linear trend to the daily CTR series; a decline above 15% with stable impressions means the creative is worn out"
        }
        ProbeKind::LandingPage => {
            "Looks for stable CTR paired with a conversion-rate drop beyond 30%; clicks arriving but not converting points at the landing page"
        }
        ProbeKind::Tracking => {
            "Checks the trailing 48 hours for clicks without any reported conversions on an ad that historically converted"
        }
        ProbeKind::BudgetExhaustion => {
            "Compares recent daily spend against the configured daily budget; utilization above 95% means delivery is budget-capped"
        }
        ProbeKind::Seasonality => {
            "Compares the current value against the same metric 7 and 364 days ago; a match within 25% means the deviation is an expected seasonal pattern"
        }
    }
}

/// One probe invocation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRequest {
    /// Which probe to run
    pub kind: ProbeKind,
    /// Tenant short code
    pub tenant: String,
    /// Ad under diagnosis
    pub ad_id: String,
    /// Analysis window in days
    pub window_days: u32,
    /// Metric whose anomaly is being diagnosed (seasonality compares it)
    pub metric: Metric,
}

/// Execute one probe under the per-probe deadline.
///
/// Errors out only for upstream unavailability or deadline expiry; the
/// orchestrator records either as inconclusive evidence.
pub async fn run_probe(
    store: &dyn MetricStore,
    config: &ProbeConfig,
    request: &ProbeRequest,
) -> Result<Evidence> {
    let deadline = Duration::from_millis(config.timeout_ms);
    let fut = async {
        match request.kind {
            ProbeKind::CpmSpike => {
                cpm_spike::check(store, config, &request.tenant, &request.ad_id).await
            }
            ProbeKind::CreativeFatigue => {
                creative_fatigue::check(
                    store,
                    config,
                    &request.tenant,
                    &request.ad_id,
                    request.window_days,
                )
                .await
            }
            ProbeKind::LandingPage => {
                landing_page::check(store, config, &request.tenant, &request.ad_id).await
            }
            ProbeKind::Tracking => {
                tracking::check(
                    store,
                    config,
                    &request.tenant,
                    &request.ad_id,
                    request.window_days,
                )
                .await
            }
            ProbeKind::BudgetExhaustion => {
                budget_exhaustion::check(store, config, &request.tenant, &request.ad_id).await
            }
            ProbeKind::Seasonality => {
                seasonality::check(
                    store,
                    config,
                    &request.tenant,
                    &request.ad_id,
                    request.metric,
                )
                .await
            }
        }
    };

    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(format!("probe {}", request.kind))),
    }
}

/// Severity of a probe's own measurement: the threshold itself is
/// significant, twice the threshold is extreme.
pub(crate) fn measurement_severity(magnitude: f64, threshold: f64) -> Severity {
    if magnitude >= threshold * 2.0 {
        Severity::Extreme
    } else if magnitude >= threshold {
        Severity::Significant
    } else {
        Severity::Mild
    }
}

/// Evidence recorded when a probe invocation itself failed (upstream error
/// or deadline); the orchestrator treats either as inconclusive
pub(crate) fn inconclusive_for_failure(probe: ProbeKind, err: &Error) -> Evidence {
    let anchor = chrono::Utc::now().date_naive();
    inconclusive(probe, &format!("probe did not complete: {err}"), anchor, anchor)
}

/// Evidence for a probe that ran but could not decide
pub(crate) fn inconclusive(
    probe: ProbeKind,
    reason: &str,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Evidence {
    Evidence {
        probe,
        fired: false,
        inconclusive: true,
        measurements: HashMap::new(),
        interpretation: reason.to_string(),
        window_start,
        window_end,
        severity: None,
    }
}

/// Date range covered by a slice of daily points, falling back to `anchor`
pub(crate) fn span_of<T, F>(points: &[T], date: F, anchor: NaiveDate) -> (NaiveDate, NaiveDate)
where
    F: Fn(&T) -> NaiveDate,
{
    match (points.first(), points.last()) {
        (Some(first), Some(last)) => (date(first), date(last)),
        _ => (anchor, anchor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_covers_all_probes() {
        let specs = catalog();
        assert_eq!(specs.len(), 6);
        assert!(specs.iter().any(|s| s.name == "cpm_spike"));
        assert!(specs.iter().any(|s| s.name == "seasonality"));
        for spec in &specs {
            assert!(spec.parameters.contains(&"ad_id"));
        }
    }

    #[test]
    fn test_measurement_severity_bands() {
        assert_eq!(measurement_severity(20.0, 25.0), Severity::Mild);
        assert_eq!(measurement_severity(30.0, 25.0), Severity::Significant);
        assert_eq!(measurement_severity(52.0, 25.0), Severity::Extreme);
    }
}
