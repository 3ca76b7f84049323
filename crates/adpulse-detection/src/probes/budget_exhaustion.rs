//! Budget exhaustion probe.
//!
//! Spend pinned against the configured daily budget over the last 3 days
//! means the platform stopped delivering for lack of budget, not for lack
//! of demand. Fires when utilization exceeds the configured ratio (default
//! 0.95). The daily budget is often unknown; that yields inconclusive.

use crate::probes::{inconclusive, span_of};
use crate::stats;
use adpulse_core::config::ProbeConfig;
use adpulse_core::types::{Evidence, ProbeKind, Severity};
use adpulse_core::Result;
use adpulse_warehouse::{MetricStore, SeriesKind};
use chrono::Utc;
use std::collections::HashMap;

/// Days of spend averaged against the budget
const RECENT_DAYS: u32 = 3;

pub(crate) async fn check(
    store: &dyn MetricStore,
    config: &ProbeConfig,
    tenant: &str,
    ad_id: &str,
) -> Result<Evidence> {
    let spend_series = store
        .fetch_daily_series(tenant, ad_id, SeriesKind::Spend, RECENT_DAYS)
        .await?;
    let anchor = Utc::now().date_naive();
    let (window_start, window_end) = span_of(&spend_series, |p| p.date, anchor);

    let Some(daily_budget) = store.fetch_daily_budget(tenant, ad_id).await? else {
        return Ok(inconclusive(
            ProbeKind::BudgetExhaustion,
            "daily budget unknown; utilization cannot be computed",
            window_start,
            window_end,
        ));
    };
    if daily_budget <= 0.0 {
        return Ok(inconclusive(
            ProbeKind::BudgetExhaustion,
            "daily budget is zero; utilization undefined",
            window_start,
            window_end,
        ));
    }

    let spends: Vec<f64> = spend_series.iter().map(|p| p.value).collect();
    let Some(avg_daily_spend) = stats::mean(&spends) else {
        return Ok(inconclusive(
            ProbeKind::BudgetExhaustion,
            "no recent spend observed",
            window_start,
            window_end,
        ));
    };

    let utilization = avg_daily_spend / daily_budget;
    let fired = utilization > config.budget_utilization;

    let measurements = HashMap::from([
        ("avg_daily_spend".to_string(), avg_daily_spend),
        ("daily_budget".to_string(), daily_budget),
        ("utilization".to_string(), utilization),
    ]);

    let interpretation = format!(
        "Budget {:.0}% utilized over the last {RECENT_DAYS} days ({:.2} of {:.2}/day).{}",
        utilization * 100.0,
        avg_daily_spend,
        daily_budget,
        if fired {
            " Delivery is budget-capped; the ad cannot spend to demand."
        } else {
            " Utilization is normal."
        },
    );

    Ok(Evidence {
        probe: ProbeKind::BudgetExhaustion,
        fired,
        inconclusive: false,
        measurements,
        interpretation,
        window_start,
        window_end,
        severity: fired.then(|| {
            if utilization >= 1.0 {
                Severity::Extreme
            } else {
                Severity::Significant
            }
        }),
    })
}
