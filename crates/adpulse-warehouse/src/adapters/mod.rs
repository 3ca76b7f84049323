//! # Metric Store Adapters
//!
//! Read-only facade over the data warehouse serving ad-level time series for
//! a (tenant, window) pair plus the sliced queries the diagnostic probes
//! need.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │                DATA WAREHOUSE                  │
//! │   per-tenant daily ad views (string-typed      │
//! │   numeric columns, mixed source categories)    │
//! └──────────────────────┬─────────────────────────┘
//!                        │
//!                        ▼
//! ┌────────────────────────────────────────────────┐
//! │               ADAPTER LAYER                    │
//! │  strict parse -> drop & count bad records      │
//! │  filter by source category                     │
//! │  spend-weighted aggregation to AdSummary       │
//! │  retry w/ backoff, UTC day alignment           │
//! └──────────────────────┬─────────────────────────┘
//!                        │
//!                        ▼
//! ┌────────────────────────────────────────────────┐
//! │   BASELINE ENGINE / DETECTOR / PROBES          │
//! └────────────────────────────────────────────────┘
//! ```

pub mod fixture;

pub use fixture::FixtureStore;

use adpulse_core::types::{AdSummary, Metric};
use adpulse_core::{Error, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Maximum analysis window in days
pub const MAX_WINDOW_DAYS: u32 = 365;

/// Validate a caller-supplied analysis window
pub fn validate_window(window_days: u32) -> Result<()> {
    if window_days == 0 || window_days > MAX_WINDOW_DAYS {
        return Err(Error::WindowOutOfRange { days: window_days });
    }
    Ok(())
}

/// One (date, value) sample of a daily series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    /// UTC calendar day
    pub date: NaiveDate,
    /// Aggregated value for the day
    pub value: f64,
}

/// One day of funnel counts for an ad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyFunnel {
    /// UTC calendar day
    pub date: NaiveDate,
    /// Impressions served
    pub impressions: u64,
    /// Clicks recorded
    pub clicks: u64,
    /// Attributed conversions, when the platform reported them
    pub conversions: Option<u64>,
}

/// Daily series selectable by probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    Spend,
    Roas,
    Ctr,
    Cpm,
    Cpa,
    Impressions,
    Clicks,
}

impl From<Metric> for SeriesKind {
    fn from(metric: Metric) -> Self {
        match metric {
            Metric::Spend => SeriesKind::Spend,
            Metric::Roas => SeriesKind::Roas,
            Metric::Ctr => SeriesKind::Ctr,
            Metric::Cpm => SeriesKind::Cpm,
            Metric::Cpa => SeriesKind::Cpa,
        }
    }
}

/// Result of a summary fetch, including the strict-parse drop count
#[derive(Debug, Clone)]
pub struct SummaryFetch {
    /// One summary per active ad; ads with zero window spend are excluded
    pub summaries: Vec<AdSummary>,
    /// Warehouse rows dropped because a numeric column failed strict parsing
    pub records_dropped: u64,
}

/// Read-only metric store consumed by detection, probes, and the API.
///
/// Implementations retry transient failures internally and surface
/// `UpstreamUnavailable` when the warehouse stays down; callers treat that
/// as fatal for the session.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Store name for logging and metrics
    fn name(&self) -> &'static str;

    /// Check that the warehouse is reachable
    async fn health_check(&self) -> Result<()>;

    /// One summary per ad active in the window.
    ///
    /// Fails with `UnknownTenant` or `WindowOutOfRange` on bad input.
    async fn fetch_ad_summaries(&self, tenant: &str, window_days: u32) -> Result<SummaryFetch>;

    /// Ordered (date, value) samples for one ad and series
    async fn fetch_daily_series(
        &self,
        tenant: &str,
        ad_id: &str,
        series: SeriesKind,
        window_days: u32,
    ) -> Result<Vec<DailyPoint>>;

    /// Ordered (date, value) samples aggregated across the whole account
    async fn fetch_account_daily_totals(
        &self,
        tenant: &str,
        series: SeriesKind,
        window_days: u32,
    ) -> Result<Vec<DailyPoint>>;

    /// Daily funnel counts (impressions, clicks, conversions) for one ad
    async fn fetch_funnel_series(
        &self,
        tenant: &str,
        ad_id: &str,
        window_days: u32,
    ) -> Result<Vec<DailyFunnel>>;

    /// Configured daily budget for an ad, when the platform exposes it
    async fn fetch_daily_budget(&self, tenant: &str, ad_id: &str) -> Result<Option<f64>>;
}
