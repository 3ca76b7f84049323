//! Creative fatigue probe.
//!
//! Fits a linear trend to the per-day CTR series over the window. Fires
//! when the fitted decline exceeds the configured fraction (default 15%)
//! while impressions have not collapsed - delivery still happening with
//! falling engagement means the creative itself wore out.

use crate::probes::{inconclusive, measurement_severity, span_of};
use crate::stats;
use adpulse_core::config::ProbeConfig;
use adpulse_core::types::{Evidence, ProbeKind};
use adpulse_core::Result;
use adpulse_warehouse::{MetricStore, SeriesKind};
use chrono::Utc;
use std::collections::HashMap;

/// Fewest CTR samples a trend fit is meaningful over
const MIN_SAMPLES: usize = 4;

pub(crate) async fn check(
    store: &dyn MetricStore,
    config: &ProbeConfig,
    tenant: &str,
    ad_id: &str,
    window_days: u32,
) -> Result<Evidence> {
    let ctr_series = store
        .fetch_daily_series(tenant, ad_id, SeriesKind::Ctr, window_days)
        .await?;
    let impression_series = store
        .fetch_daily_series(tenant, ad_id, SeriesKind::Impressions, window_days)
        .await?;
    let anchor = Utc::now().date_naive();
    let (window_start, window_end) = span_of(&ctr_series, |p| p.date, anchor);

    if ctr_series.len() < MIN_SAMPLES {
        return Ok(inconclusive(
            ProbeKind::CreativeFatigue,
            "too few CTR samples to fit a trend",
            window_start,
            window_end,
        ));
    }

    let ctr_values: Vec<f64> = ctr_series.iter().map(|p| p.value).collect();
    let Some(slope) = stats::linear_slope(&ctr_values) else {
        return Ok(inconclusive(
            ProbeKind::CreativeFatigue,
            "CTR series is degenerate; no trend",
            window_start,
            window_end,
        ));
    };

    // fitted endpoints of the least-squares line
    let n = ctr_values.len() as f64;
    let y_mean = ctr_values.iter().sum::<f64>() / n;
    let x_mean = (n - 1.0) / 2.0;
    let fitted_first = y_mean - slope * x_mean;
    let fitted_last = fitted_first + slope * (n - 1.0);

    let decline_pct = if fitted_first > 0.0 {
        (fitted_first - fitted_last) / fitted_first * 100.0
    } else {
        0.0
    };

    let impressions: Vec<f64> = impression_series.iter().map(|p| p.value).collect();
    let recent = impressions.len().saturating_sub(3);
    let recent_mean = stats::mean(&impressions[recent..]).unwrap_or(0.0);
    let overall_mean = stats::mean(&impressions).unwrap_or(0.0);
    let impression_stability = if overall_mean > 0.0 {
        recent_mean / overall_mean
    } else {
        0.0
    };
    let delivery_stable = impression_stability >= config.fatigue_impression_floor;

    let fired = decline_pct > config.fatigue_decline_pct && delivery_stable;

    let measurements = HashMap::from([
        ("ctr_slope".to_string(), slope),
        ("ctr_decline_pct".to_string(), decline_pct),
        ("impression_stability".to_string(), impression_stability),
    ]);

    let interpretation = format!(
        "CTR trend {} {:.1}% across {} days; recent impressions at {:.0}% of the window mean.{}",
        if decline_pct >= 0.0 { "fell" } else { "rose" },
        decline_pct.abs(),
        ctr_values.len(),
        impression_stability * 100.0,
        if fired {
            " Creative is fatigued; engagement is decaying under stable delivery."
        } else if !delivery_stable {
            " Impressions collapsed too, so the decline is a delivery change, not fatigue."
        } else {
            ""
        },
    );

    Ok(Evidence {
        probe: ProbeKind::CreativeFatigue,
        fired,
        inconclusive: false,
        measurements,
        interpretation,
        window_start,
        window_end,
        severity: fired.then(|| measurement_severity(decline_pct, config.fatigue_decline_pct)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use adpulse_core::types::{Provider, SourceCategory};
    use adpulse_warehouse::prelude::{FixtureStore, RawAdRow};
    use adpulse_warehouse::TenantRegistry;
    use chrono::NaiveDate;
    use std::collections::HashMap as StdHashMap;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, n).unwrap()
    }

    fn row(date: NaiveDate, impressions: u64, clicks: u64) -> RawAdRow {
        RawAdRow {
            ad_id: "ad-1".to_string(),
            ad_name: "ad-1 name".to_string(),
            provider: Provider::Meta,
            store: "us".to_string(),
            campaign_status: "ACTIVE".to_string(),
            category: SourceCategory::AdPlatform,
            date,
            spend: "100".to_string(),
            roas: "2.0".to_string(),
            impressions: impressions.to_string(),
            clicks: clicks.to_string(),
            cpm: None,
            cpa: None,
            conversions: None,
            daily_budget: None,
        }
    }

    fn store_with(rows: Vec<RawAdRow>, now: NaiveDate) -> FixtureStore {
        let registry = TenantRegistry::new(StdHashMap::from([(
            "tl".to_string(),
            "warehouse.tl_daily".to_string(),
        )]));
        FixtureStore::new(registry).with_now(now).load_rows("tl", rows)
    }

    #[tokio::test]
    async fn test_fires_on_declining_ctr_with_stable_delivery() {
        // CTR decays from 4% to 2% while impressions hold at 10k
        let rows: Vec<RawAdRow> = (0..10)
            .map(|i| row(day(1 + i), 10_000, 400 - (i as u64) * 20))
            .collect();
        let store = store_with(rows, day(10));

        let evidence = check(&store, &ProbeConfig::default(), "tl", "ad-1", 10)
            .await
            .unwrap();
        assert!(evidence.fired);
        assert!(evidence.measurements["ctr_decline_pct"] > 15.0);
        assert!(evidence.measurements["impression_stability"] > 0.9);
    }

    #[tokio::test]
    async fn test_quiet_when_impressions_collapse() {
        // CTR falls but delivery collapsed to 5% of the mean: not fatigue
        let mut rows: Vec<RawAdRow> = (0..7).map(|i| row(day(1 + i), 10_000, 400)).collect();
        rows.extend((7..10).map(|i| row(day(1 + i), 400, 4)));
        let store = store_with(rows, day(10));

        let evidence = check(&store, &ProbeConfig::default(), "tl", "ad-1", 10)
            .await
            .unwrap();
        assert!(!evidence.fired);
        assert!(evidence.measurements["impression_stability"] < 0.5);
    }

    #[tokio::test]
    async fn test_inconclusive_on_short_series() {
        let rows = vec![row(day(1), 10_000, 300), row(day(2), 10_000, 280)];
        let store = store_with(rows, day(2));

        let evidence = check(&store, &ProbeConfig::default(), "tl", "ad-1", 10)
            .await
            .unwrap();
        assert!(evidence.inconclusive);
        assert!(!evidence.fired);
    }
}
