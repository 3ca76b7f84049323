//! CPM spike probe.
//!
//! Compares the mean CPM of the most recent 3 days against the prior 7
//! days. Fires when the relative change exceeds the configured threshold
//! (default 25%), and reports the first day the rolling 3-day mean crossed
//! 1.25x the rolling 7-day mean - the spike onset.

use crate::probes::{inconclusive, measurement_severity, span_of};
use crate::stats;
use adpulse_core::config::ProbeConfig;
use adpulse_core::types::{Evidence, ProbeKind};
use adpulse_core::Result;
use adpulse_warehouse::{MetricStore, SeriesKind};
use chrono::Utc;
use std::collections::HashMap;

pub(crate) async fn check(
    store: &dyn MetricStore,
    config: &ProbeConfig,
    tenant: &str,
    ad_id: &str,
) -> Result<Evidence> {
    let lookback = config.cpm_recent_days + config.cpm_baseline_days;
    let series = store
        .fetch_daily_series(tenant, ad_id, SeriesKind::Cpm, lookback)
        .await?;
    let anchor = Utc::now().date_naive();
    let (window_start, window_end) = span_of(&series, |p| p.date, anchor);

    let recent_len = config.cpm_recent_days as usize;
    if series.len() <= recent_len {
        return Ok(inconclusive(
            ProbeKind::CpmSpike,
            "not enough CPM history to compare recent days against a baseline",
            window_start,
            window_end,
        ));
    }

    let values: Vec<f64> = series.iter().map(|p| p.value).collect();
    let split = values.len() - recent_len;
    let (baseline_vals, recent_vals) = values.split_at(split);

    let current = stats::mean(recent_vals).unwrap_or(0.0);
    let baseline = stats::mean(baseline_vals).unwrap_or(0.0);
    let Some(change_pct) = stats::relative_change_pct(current, baseline) else {
        return Ok(inconclusive(
            ProbeKind::CpmSpike,
            "baseline CPM is zero; relative change undefined",
            window_start,
            window_end,
        ));
    };

    let fired = change_pct > config.cpm_spike_pct;

    // spike onset: first day the rolling 3-day mean crossed 1.25x the
    // 7-day mean of the days preceding it
    let short_w = config.cpm_recent_days as usize;
    let long_w = config.cpm_baseline_days as usize;
    let onset = (0..values.len()).find(|&i| {
        if i + 1 < short_w + long_w {
            return false;
        }
        let short = stats::mean(&values[i + 1 - short_w..=i]).unwrap_or(0.0);
        let long = stats::mean(&values[i + 1 - short_w - long_w..=i - short_w]).unwrap_or(0.0);
        long > 0.0 && short > 1.25 * long
    });

    let mut measurements = HashMap::from([
        ("current_cpm".to_string(), current),
        ("baseline_cpm".to_string(), baseline),
        ("change_pct".to_string(), change_pct),
    ]);
    let mut onset_note = String::new();
    if let Some(idx) = onset {
        let onset_date = series[idx].date;
        measurements.insert(
            "days_since_onset".to_string(),
            (window_end - onset_date).num_days() as f64,
        );
        onset_note = format!(" Spike onset {onset_date}.");
    }

    let direction = if change_pct >= 0.0 { "rose" } else { "fell" };
    let interpretation = format!(
        "CPM {direction} {:.1}% ({:.2} -> {:.2}) over the last {} days vs the prior {}.{}{}",
        change_pct.abs(),
        baseline,
        current,
        config.cpm_recent_days,
        config.cpm_baseline_days,
        onset_note,
        if fired {
            " Auction competition is up."
        } else {
            ""
        },
    );

    Ok(Evidence {
        probe: ProbeKind::CpmSpike,
        fired,
        inconclusive: false,
        measurements,
        interpretation,
        window_start,
        window_end,
        severity: fired.then(|| measurement_severity(change_pct, config.cpm_spike_pct)),
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

    fn row(ad_id: &str, date: NaiveDate, cpm: f64) -> RawAdRow {
        RawAdRow {
            ad_id: ad_id.to_string(),
            ad_name: format!("{ad_id} name"),
            provider: Provider::Meta,
            store: "us".to_string(),
            campaign_status: "ACTIVE".to_string(),
            category: SourceCategory::AdPlatform,
            date,
            spend: "100".to_string(),
            roas: "2.0".to_string(),
            impressions: "1000".to_string(),
            clicks: "20".to_string(),
            cpm: Some(cpm.to_string()),
            cpa: None,
            conversions: None,
            daily_budget: None,
        }
    }

    fn store_with_cpms(cpms: &[f64]) -> FixtureStore {
        let registry = TenantRegistry::new(StdHashMap::from([(
            "tl".to_string(),
            "warehouse.tl_daily".to_string(),
        )]));
        let rows = cpms
            .iter()
            .enumerate()
            .map(|(i, cpm)| row("ad-1", day(1 + i as u32), *cpm))
            .collect();
        FixtureStore::new(registry)
            .with_now(day(cpms.len() as u32))
            .load_rows("tl", rows)
    }

    #[tokio::test]
    async fn test_fires_on_spike() {
        // 7 flat days around 12.20 then 3 days around 18.50: +52%
        let store = store_with_cpms(&[
            12.2, 12.2, 12.2, 12.2, 12.2, 12.2, 12.2, 18.5, 18.5, 18.5,
        ]);
        let evidence = check(&store, &ProbeConfig::default(), "tl", "ad-1")
            .await
            .unwrap();

        assert!(evidence.fired);
        assert!(!evidence.inconclusive);
        assert!((evidence.measurements["current_cpm"] - 18.5).abs() < 1e-9);
        assert!((evidence.measurements["baseline_cpm"] - 12.2).abs() < 1e-9);
        assert!(evidence.measurements["change_pct"] > 50.0);
        assert_eq!(
            evidence.severity,
            Some(adpulse_core::types::Severity::Extreme)
        );
        assert!(evidence.measurements.contains_key("days_since_onset"));
    }

    #[tokio::test]
    async fn test_quiet_on_stable_cpm() {
        let store = store_with_cpms(&[12.0; 10]);
        let evidence = check(&store, &ProbeConfig::default(), "tl", "ad-1")
            .await
            .unwrap();
        assert!(!evidence.fired);
        assert!(!evidence.inconclusive);
    }

    #[tokio::test]
    async fn test_inconclusive_without_history() {
        let store = store_with_cpms(&[18.0, 18.0]);
        let evidence = check(&store, &ProbeConfig::default(), "tl", "ad-1")
            .await
            .unwrap();
        assert!(!evidence.fired);
        assert!(evidence.inconclusive);
    }
}
