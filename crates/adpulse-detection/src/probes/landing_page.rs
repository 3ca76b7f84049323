//! Landing page probe.
//!
//! Stable upstream CTR paired with a sharp drop in downstream conversion
//! rate means the ad is still winning clicks that stop converting - a
//! landing-page or checkout-funnel problem, not an ad problem. Requires
//! CTR within a band of its baseline (default +/-10%) while CVR fell
//! beyond the drop threshold (default -30%). Conversion data is often
//! absent; that yields inconclusive, not fired.

use crate::probes::{inconclusive, measurement_severity, span_of};
use crate::stats;
use adpulse_core::config::ProbeConfig;
use adpulse_core::types::{Evidence, ProbeKind};
use adpulse_core::Result;
use adpulse_warehouse::{DailyFunnel, MetricStore, SeriesKind};
use chrono::Utc;
use std::collections::HashMap;

/// Days treated as the current period at the end of the series
const RECENT_DAYS: usize = 3;

fn daily_cvr(day: &DailyFunnel) -> Option<f64> {
    match (day.clicks, day.conversions) {
        (clicks, Some(conversions)) if clicks > 0 => Some(conversions as f64 / clicks as f64),
        _ => None,
    }
}

pub(crate) async fn check(
    store: &dyn MetricStore,
    config: &ProbeConfig,
    tenant: &str,
    ad_id: &str,
) -> Result<Evidence> {
    let lookback = (RECENT_DAYS as u32) + config.cpm_baseline_days;
    let ctr_series = store
        .fetch_daily_series(tenant, ad_id, SeriesKind::Ctr, lookback)
        .await?;
    let funnel = store.fetch_funnel_series(tenant, ad_id, lookback).await?;
    let anchor = Utc::now().date_naive();
    let (window_start, window_end) = span_of(&funnel, |f| f.date, anchor);

    let cvr_points: Vec<(usize, f64)> = funnel
        .iter()
        .enumerate()
        .filter_map(|(i, day)| daily_cvr(day).map(|cvr| (i, cvr)))
        .collect();
    if cvr_points.is_empty() {
        return Ok(inconclusive(
            ProbeKind::LandingPage,
            "no conversion data reported; funnel health cannot be judged",
            window_start,
            window_end,
        ));
    }

    if ctr_series.len() <= RECENT_DAYS || funnel.len() <= RECENT_DAYS {
        return Ok(inconclusive(
            ProbeKind::LandingPage,
            "not enough funnel history to compare recent days against a baseline",
            window_start,
            window_end,
        ));
    }

    let ctr_split = ctr_series.len() - RECENT_DAYS;
    let ctr_values: Vec<f64> = ctr_series.iter().map(|p| p.value).collect();
    let ctr_current = stats::mean(&ctr_values[ctr_split..]).unwrap_or(0.0);
    let ctr_baseline = stats::mean(&ctr_values[..ctr_split]).unwrap_or(0.0);

    let funnel_split = funnel.len() - RECENT_DAYS;
    let recent_cvr: Vec<f64> = cvr_points
        .iter()
        .filter(|(i, _)| *i >= funnel_split)
        .map(|(_, cvr)| *cvr)
        .collect();
    let baseline_cvr: Vec<f64> = cvr_points
        .iter()
        .filter(|(i, _)| *i < funnel_split)
        .map(|(_, cvr)| *cvr)
        .collect();
    let (Some(cvr_current), Some(cvr_baseline)) =
        (stats::mean(&recent_cvr), stats::mean(&baseline_cvr))
    else {
        return Ok(inconclusive(
            ProbeKind::LandingPage,
            "conversion data missing on one side of the comparison",
            window_start,
            window_end,
        ));
    };

    let Some(ctr_change) = stats::relative_change_pct(ctr_current, ctr_baseline) else {
        return Ok(inconclusive(
            ProbeKind::LandingPage,
            "baseline CTR is zero; stability cannot be judged",
            window_start,
            window_end,
        ));
    };
    let Some(cvr_change) = stats::relative_change_pct(cvr_current, cvr_baseline) else {
        return Ok(inconclusive(
            ProbeKind::LandingPage,
            "baseline conversion rate is zero; drop cannot be judged",
            window_start,
            window_end,
        ));
    };

    let ctr_stable = ctr_change.abs() < config.landing_ctr_band_pct;
    let cvr_dropped = cvr_change < -config.landing_cvr_drop_pct;
    let fired = ctr_stable && cvr_dropped;

    let measurements = HashMap::from([
        ("ctr_change_pct".to_string(), ctr_change),
        ("cvr_change_pct".to_string(), cvr_change),
        ("current_cvr".to_string(), cvr_current),
        ("baseline_cvr".to_string(), cvr_baseline),
    ]);

    let interpretation = format!(
        "CTR {} ({:+.1}%), conversion rate {:+.1}%.{}",
        if ctr_stable { "stable" } else { "moved" },
        ctr_change,
        cvr_change,
        if fired {
            " Clicks keep arriving but stopped converting; the landing page or funnel broke."
        } else {
            " Funnel looks consistent with the ad's engagement."
        },
    );

    Ok(Evidence {
        probe: ProbeKind::LandingPage,
        fired,
        inconclusive: false,
        measurements,
        interpretation,
        window_start,
        window_end,
        severity: fired.then(|| measurement_severity(cvr_change.abs(), config.landing_cvr_drop_pct)),
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

    fn row(date: NaiveDate, clicks: u64, conversions: Option<u64>) -> RawAdRow {
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
            impressions: "10000".to_string(),
            clicks: clicks.to_string(),
            cpm: None,
            cpa: None,
            conversions: conversions.map(|c| c.to_string()),
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
    async fn test_fires_on_stable_ctr_with_cvr_collapse() {
        // 7 baseline days converting at 10%, then 3 days at 2%
        let mut rows: Vec<RawAdRow> = (0..7).map(|i| row(day(1 + i), 200, Some(20))).collect();
        rows.extend((7..10).map(|i| row(day(1 + i), 200, Some(4))));
        let store = store_with(rows, day(10));

        let evidence = check(&store, &ProbeConfig::default(), "tl", "ad-1")
            .await
            .unwrap();
        assert!(evidence.fired);
        assert!(evidence.measurements["cvr_change_pct"] < -30.0);
        assert!(evidence.measurements["ctr_change_pct"].abs() < 10.0);
    }

    #[tokio::test]
    async fn test_inconclusive_without_conversion_data() {
        let rows: Vec<RawAdRow> = (0..10).map(|i| row(day(1 + i), 200, None)).collect();
        let store = store_with(rows, day(10));

        let evidence = check(&store, &ProbeConfig::default(), "tl", "ad-1")
            .await
            .unwrap();
        assert!(evidence.inconclusive);
        assert!(!evidence.fired);
    }

    #[tokio::test]
    async fn test_quiet_when_ctr_moved_too() {
        // CTR halved along with conversions: an ad problem, not the page
        let mut rows: Vec<RawAdRow> = (0..7).map(|i| row(day(1 + i), 400, Some(40))).collect();
        rows.extend((7..10).map(|i| row(day(1 + i), 200, Some(4))));
        let store = store_with(rows, day(10));

        let evidence = check(&store, &ProbeConfig::default(), "tl", "ad-1")
            .await
            .unwrap();
        assert!(!evidence.fired);
        assert!(!evidence.inconclusive);
    }
}
