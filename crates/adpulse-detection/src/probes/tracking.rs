//! Tracking probe.
//!
//! Clicks arriving over the trailing 48 hours with zero reported
//! conversions, on an ad whose historical conversion rate is positive,
//! means the conversion pixel or attribution feed broke - traffic is real
//! but nothing is being recorded.

use crate::probes::{inconclusive, span_of};
use adpulse_core::config::ProbeConfig;
use adpulse_core::types::{Evidence, ProbeKind, Severity};
use adpulse_core::Result;
use adpulse_warehouse::MetricStore;
use chrono::Utc;
use std::collections::HashMap;

pub(crate) async fn check(
    store: &dyn MetricStore,
    config: &ProbeConfig,
    tenant: &str,
    ad_id: &str,
    window_days: u32,
) -> Result<Evidence> {
    let funnel = store.fetch_funnel_series(tenant, ad_id, window_days).await?;
    let anchor = Utc::now().date_naive();
    let (window_start, window_end) = span_of(&funnel, |f| f.date, anchor);

    let trailing_days = (config.tracking_window_hours / 24).max(1) as usize;
    if funnel.len() <= trailing_days {
        return Ok(inconclusive(
            ProbeKind::Tracking,
            "not enough funnel history to separate recent activity from the baseline",
            window_start,
            window_end,
        ));
    }

    let split = funnel.len() - trailing_days;
    let (history, recent) = funnel.split_at(split);

    let recent_clicks: u64 = recent.iter().map(|d| d.clicks).sum();
    let recent_conversions: u64 = recent.iter().filter_map(|d| d.conversions).sum();

    let hist_clicks: u64 = history.iter().map(|d| d.clicks).sum();
    let hist_conversions: u64 = history.iter().filter_map(|d| d.conversions).sum();
    let historical_cvr = if hist_clicks > 0 {
        hist_conversions as f64 / hist_clicks as f64
    } else {
        0.0
    };

    let fired = recent_clicks > 0 && recent_conversions == 0 && historical_cvr > 0.0;

    let measurements = HashMap::from([
        ("clicks_48h".to_string(), recent_clicks as f64),
        ("conversions_48h".to_string(), recent_conversions as f64),
        ("historical_cvr".to_string(), historical_cvr),
    ]);

    let interpretation = format!(
        "{recent_clicks} clicks and {recent_conversions} reported conversions in the trailing {}h; historical conversion rate {:.2}%.{}",
        config.tracking_window_hours,
        historical_cvr * 100.0,
        if fired {
            " Conversion tracking is broken: real traffic, nothing recorded."
        } else if recent_clicks > 0 && recent_conversions == 0 {
            " No conversions recorded, but the ad has never converted; tracking cannot be blamed."
        } else {
            " Tracking appears functional."
        },
    );

    Ok(Evidence {
        probe: ProbeKind::Tracking,
        fired,
        inconclusive: false,
        measurements,
        interpretation,
        window_start,
        window_end,
        // a complete conversion blackout on a converting ad is never subtle
        severity: fired.then_some(Severity::Extreme),
    })
}
