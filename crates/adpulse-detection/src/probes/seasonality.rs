//! Seasonality probe.
//!
//! Compares the current value of the anomalous metric against the same
//! metric exactly 7 days ago (weekly cycle) and 364 days ago (same weekday
//! last year). A match within the configured band (default +/-25%) fires as
//! "expected seasonal pattern" - a legitimate null result that reclassifies
//! the anomaly as not a true anomaly. Never fires when both comparison
//! points are absent.

use crate::probes::{inconclusive, span_of};
use crate::stats;
use adpulse_core::config::ProbeConfig;
use adpulse_core::types::{Evidence, Metric, ProbeKind, Severity};
use adpulse_core::Result;
use adpulse_warehouse::{DailyPoint, MetricStore};
use chrono::{Duration, NaiveDate, Utc};
use std::collections::HashMap;

/// Weekly comparison offset in days
const WEEK_OFFSET: i64 = 7;
/// Yearly comparison offset: 52 whole weeks, aligning the weekday
const YEAR_OFFSET: i64 = 364;

fn value_at(series: &[DailyPoint], date: NaiveDate) -> Option<f64> {
    series.iter().find(|p| p.date == date).map(|p| p.value)
}

pub(crate) async fn check(
    store: &dyn MetricStore,
    config: &ProbeConfig,
    tenant: &str,
    ad_id: &str,
    metric: Metric,
) -> Result<Evidence> {
    // a full year of history so the 364-day point can exist
    let series = store
        .fetch_daily_series(tenant, ad_id, metric.into(), 365)
        .await?;
    let anchor = Utc::now().date_naive();
    let (window_start, window_end) = span_of(&series, |p| p.date, anchor);

    let Some(current_point) = series.last() else {
        return Ok(inconclusive(
            ProbeKind::Seasonality,
            "no recent data for the metric",
            window_start,
            window_end,
        ));
    };
    let current = current_point.value;
    let today = current_point.date;

    let week_ago = value_at(&series, today - Duration::days(WEEK_OFFSET));
    let year_ago = value_at(&series, today - Duration::days(YEAR_OFFSET));

    if week_ago.is_none() && year_ago.is_none() {
        return Ok(inconclusive(
            ProbeKind::Seasonality,
            "no historical comparison points exist 7 or 364 days back",
            window_start,
            window_end,
        ));
    }

    let mut measurements = HashMap::from([(format!("current_{}", metric.as_str()), current)]);
    let mut matched = false;
    let mut notes = Vec::new();

    for (label, point) in [("7d_ago", week_ago), ("364d_ago", year_ago)] {
        let Some(historical) = point else { continue };
        measurements.insert(format!("value_{label}"), historical);
        if let Some(deviation) = stats::relative_change_pct(current, historical) {
            measurements.insert(format!("deviation_vs_{label}_pct"), deviation);
            if deviation.abs() <= config.seasonality_band_pct {
                matched = true;
            }
            notes.push(format!("{deviation:+.1}% vs {label}"));
        }
    }

    let interpretation = format!(
        "{} currently {:.2}; {}.{}",
        metric.as_str().to_uppercase(),
        current,
        notes.join(", "),
        if matched {
            " Matches the historical pattern; this looks like expected seasonality, not a true anomaly."
        } else {
            " Does not match either historical point; not seasonal."
        },
    );

    Ok(Evidence {
        probe: ProbeKind::Seasonality,
        fired: matched,
        inconclusive: false,
        measurements,
        interpretation,
        window_start,
        window_end,
        severity: matched.then_some(Severity::Significant),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use adpulse_core::types::{Provider, SourceCategory};
    use adpulse_warehouse::prelude::{FixtureStore, RawAdRow};
    use adpulse_warehouse::TenantRegistry;
    use std::collections::HashMap as StdHashMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(date: NaiveDate, roas: f64) -> RawAdRow {
        RawAdRow {
            ad_id: "ad-1".to_string(),
            ad_name: "ad-1 name".to_string(),
            provider: Provider::Meta,
            store: "us".to_string(),
            campaign_status: "ACTIVE".to_string(),
            category: SourceCategory::AdPlatform,
            date,
            spend: "100".to_string(),
            roas: roas.to_string(),
            impressions: "1000".to_string(),
            clicks: "20".to_string(),
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
    async fn test_fires_on_weekly_match() {
        let now = date(2025, 6, 15);
        let rows = vec![
            row(now - Duration::days(7), 2.1),
            row(now, 2.0), // within 25% of the value a week earlier
        ];
        let store = store_with(rows, now);

        let evidence = check(&store, &ProbeConfig::default(), "tl", "ad-1", Metric::Roas)
            .await
            .unwrap();
        assert!(evidence.fired);
        assert!(evidence.measurements.contains_key("deviation_vs_7d_ago_pct"));
    }

    #[tokio::test]
    async fn test_fires_on_yearly_match() {
        let now = date(2025, 6, 15);
        let rows = vec![row(now - Duration::days(364), 1.9), row(now, 2.0)];
        let store = store_with(rows, now);

        let evidence = check(&store, &ProbeConfig::default(), "tl", "ad-1", Metric::Roas)
            .await
            .unwrap();
        assert!(evidence.fired);
    }

    #[tokio::test]
    async fn test_never_fires_without_history() {
        let now = date(2025, 6, 15);
        let store = store_with(vec![row(now, 2.0)], now);

        let evidence = check(&store, &ProbeConfig::default(), "tl", "ad-1", Metric::Roas)
            .await
            .unwrap();
        assert!(!evidence.fired);
        assert!(evidence.inconclusive);
    }

    #[tokio::test]
    async fn test_large_deviation_not_seasonal() {
        let now = date(2025, 6, 15);
        let rows = vec![row(now - Duration::days(7), 6.0), row(now, 2.0)];
        let store = store_with(rows, now);

        let evidence = check(&store, &ProbeConfig::default(), "tl", "ad-1", Metric::Roas)
            .await
            .unwrap();
        assert!(!evidence.fired);
        assert!(!evidence.inconclusive);
    }
}
