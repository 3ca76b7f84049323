//! Fixture-backed metric store.
//!
//! Deterministic in-memory implementation of [`MetricStore`] over raw
//! warehouse rows. Numeric columns arrive as strings, exactly as the
//! warehouse stores them; parsing is strict - a row that fails to parse is
//! dropped and counted, never coerced to zero. A pinned "now" anchor makes
//! window arithmetic reproducible in tests.

use crate::adapters::{
    validate_window, DailyFunnel, DailyPoint, MetricStore, SeriesKind, SummaryFetch,
};
use crate::tenant::TenantRegistry;
use adpulse_core::types::{AdRecord, AdSummary, Provider, SourceCategory};
use adpulse_core::{Error, Result};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// One raw warehouse row with string-typed numeric columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAdRow {
    /// Stable ad identifier
    pub ad_id: String,
    /// Display name
    pub ad_name: String,
    /// Serving platform
    pub provider: Provider,
    /// Store / market
    pub store: String,
    /// Campaign status at observation time
    pub campaign_status: String,
    /// Row category
    pub category: SourceCategory,
    /// Observation day (UTC)
    pub date: NaiveDate,
    /// Daily spend, stored as a string in the warehouse
    pub spend: String,
    /// Daily ROAS, stored as a string
    pub roas: String,
    /// Daily impressions, stored as a string
    pub impressions: String,
    /// Daily clicks, stored as a string
    pub clicks: String,
    /// Daily CPM, when present
    #[serde(default)]
    pub cpm: Option<String>,
    /// Daily CPA, when present
    #[serde(default)]
    pub cpa: Option<String>,
    /// Daily attributed conversions, when present
    #[serde(default)]
    pub conversions: Option<String>,
    /// Configured daily budget, when present
    #[serde(default)]
    pub daily_budget: Option<String>,
}

fn parse_f64(column: &str, value: &str) -> Result<f64> {
    let parsed: f64 = value
        .trim()
        .parse()
        .map_err(|_| Error::parse(column, value))?;
    if !parsed.is_finite() {
        return Err(Error::parse(column, value));
    }
    Ok(parsed)
}

fn parse_u64(column: &str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|_| Error::parse(column, value))
}

fn parse_opt_f64(column: &str, value: &Option<String>) -> Result<Option<f64>> {
    match value {
        Some(raw) if !raw.trim().is_empty() => parse_f64(column, raw).map(Some),
        _ => Ok(None),
    }
}

fn parse_opt_u64(column: &str, value: &Option<String>) -> Result<Option<u64>> {
    match value {
        Some(raw) if !raw.trim().is_empty() => parse_u64(column, raw).map(Some),
        _ => Ok(None),
    }
}

/// Strictly parse one raw row into an [`AdRecord`].
///
/// Fails on any unparseable numeric column and on rows violating the
/// record invariants (negative spend/ROAS, clicks beyond impressions).
pub fn parse_row(raw: &RawAdRow) -> Result<AdRecord> {
    let spend = parse_f64("spend", &raw.spend)?;
    let roas = parse_f64("roas", &raw.roas)?;
    let impressions = parse_u64("impressions", &raw.impressions)?;
    let clicks = parse_u64("clicks", &raw.clicks)?;

    if spend < 0.0 {
        return Err(Error::parse("spend", &raw.spend));
    }
    if roas < 0.0 {
        return Err(Error::parse("roas", &raw.roas));
    }
    if clicks > impressions {
        return Err(Error::parse("clicks", &raw.clicks));
    }

    let ctr = if impressions > 0 {
        Some(clicks as f64 / impressions as f64)
    } else {
        None
    };

    Ok(AdRecord {
        ad_id: raw.ad_id.clone(),
        ad_name: raw.ad_name.clone(),
        provider: raw.provider,
        store: raw.store.clone(),
        campaign_status: raw.campaign_status.clone(),
        category: raw.category,
        date: raw.date,
        spend,
        roas,
        impressions,
        clicks,
        ctr,
        cpm: parse_opt_f64("cpm", &raw.cpm)?,
        cpa: parse_opt_f64("cpa", &raw.cpa)?,
        conversions: parse_opt_u64("conversions", &raw.conversions)?,
        daily_budget: parse_opt_f64("daily_budget", &raw.daily_budget)?,
    })
}

/// Deterministic in-memory metric store over parsed warehouse rows
#[derive(Debug)]
pub struct FixtureStore {
    registry: TenantRegistry,
    rows: HashMap<String, Vec<AdRecord>>,
    dropped: HashMap<String, u64>,
    now: NaiveDate,
}

impl FixtureStore {
    /// Create an empty store anchored at today (UTC)
    pub fn new(registry: TenantRegistry) -> Self {
        Self {
            registry,
            rows: HashMap::new(),
            dropped: HashMap::new(),
            now: Utc::now().date_naive(),
        }
    }

    /// Pin the "now" anchor, making window arithmetic reproducible
    pub fn with_now(mut self, now: NaiveDate) -> Self {
        self.now = now;
        self
    }

    /// Load raw rows for a tenant, strictly parsing and counting drops
    pub fn load_rows(mut self, tenant: &str, raw_rows: Vec<RawAdRow>) -> Self {
        let mut parsed = Vec::with_capacity(raw_rows.len());
        let mut dropped = 0u64;
        for raw in &raw_rows {
            match parse_row(raw) {
                Ok(record) => parsed.push(record),
                Err(err) => {
                    warn!(tenant, ad_id = %raw.ad_id, date = %raw.date, error = %err,
                        "Dropping unparseable warehouse row");
                    dropped += 1;
                }
            }
        }
        debug!(tenant, rows = parsed.len(), dropped, "Fixture rows loaded");
        self.rows.entry(tenant.to_string()).or_default().extend(parsed);
        *self.dropped.entry(tenant.to_string()).or_default() += dropped;
        self
    }

    fn window_start(&self, window_days: u32) -> NaiveDate {
        self.now - Duration::days(window_days as i64 - 1)
    }

    /// Ad-platform rows for a tenant inside the window, oldest first.
    ///
    /// Commerce rows are filtered here, at the source, so no aggregate can
    /// ever mix the two categories.
    fn ad_rows(&self, tenant: &str, window_days: u32) -> Result<Vec<&AdRecord>> {
        validate_window(window_days)?;
        self.registry.resolve(tenant)?;
        let start = self.window_start(window_days);

        let mut rows: Vec<&AdRecord> = self
            .rows
            .get(tenant)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.category == SourceCategory::AdPlatform)
                    .filter(|r| r.date >= start && r.date <= self.now)
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| (a.date, &a.ad_id).cmp(&(b.date, &b.ad_id)));
        Ok(rows)
    }

    fn daily_value(rows: &[&AdRecord], series: SeriesKind) -> Option<f64> {
        match series {
            SeriesKind::Spend => Some(rows.iter().map(|r| r.spend).sum()),
            SeriesKind::Impressions => Some(rows.iter().map(|r| r.impressions as f64).sum()),
            SeriesKind::Clicks => Some(rows.iter().map(|r| r.clicks as f64).sum()),
            SeriesKind::Roas => spend_weighted(rows, |r| Some(r.roas)),
            SeriesKind::Ctr => spend_weighted(rows, |r| r.ctr),
            SeriesKind::Cpm => spend_weighted(rows, |r| r.cpm),
            SeriesKind::Cpa => spend_weighted(rows, |r| r.cpa),
        }
    }
}

/// Spend-weighted aggregate: sum(value * spend) / sum(spend) over rows where
/// the value is defined and spend is positive
fn spend_weighted<F>(rows: &[&AdRecord], value: F) -> Option<f64>
where
    F: Fn(&AdRecord) -> Option<f64>,
{
    let mut weighted = 0.0;
    let mut weight = 0.0;
    for row in rows {
        if row.spend <= 0.0 {
            continue;
        }
        if let Some(v) = value(row) {
            weighted += v * row.spend;
            weight += row.spend;
        }
    }
    if weight > 0.0 {
        Some(weighted / weight)
    } else {
        None
    }
}

fn summarize(ad_rows: &[&AdRecord]) -> Option<AdSummary> {
    let spend: f64 = ad_rows.iter().map(|r| r.spend).sum();
    if spend <= 0.0 {
        return None;
    }
    let first = ad_rows.first()?;

    let mut active_days: Vec<NaiveDate> = ad_rows
        .iter()
        .filter(|r| r.spend > 0.0)
        .map(|r| r.date)
        .collect();
    active_days.sort();
    active_days.dedup();

    let conversions: u64 = ad_rows.iter().filter_map(|r| r.conversions).sum();
    let cpa = if conversions > 0 {
        Some(spend / conversions as f64)
    } else {
        None
    };

    Some(AdSummary {
        ad_id: first.ad_id.clone(),
        ad_name: first.ad_name.clone(),
        provider: first.provider,
        spend,
        roas: spend_weighted(ad_rows, |r| Some(r.roas)).unwrap_or(0.0),
        ctr: spend_weighted(ad_rows, |r| r.ctr),
        cpm: spend_weighted(ad_rows, |r| r.cpm),
        cpa,
        conversions,
        days_active: active_days.len() as u32,
        first_active: *active_days.first()?,
        last_active: *active_days.last()?,
    })
}

#[async_trait]
impl MetricStore for FixtureStore {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn fetch_ad_summaries(&self, tenant: &str, window_days: u32) -> Result<SummaryFetch> {
        let rows = self.ad_rows(tenant, window_days)?;

        let mut by_ad: BTreeMap<&str, Vec<&AdRecord>> = BTreeMap::new();
        for row in rows {
            if row.campaign_status == "ACTIVE" {
                by_ad.entry(row.ad_id.as_str()).or_default().push(row);
            }
        }

        let summaries: Vec<AdSummary> = by_ad
            .values()
            .filter_map(|ad_rows| summarize(ad_rows))
            .collect();

        Ok(SummaryFetch {
            summaries,
            records_dropped: self.dropped.get(tenant).copied().unwrap_or(0),
        })
    }

    async fn fetch_daily_series(
        &self,
        tenant: &str,
        ad_id: &str,
        series: SeriesKind,
        window_days: u32,
    ) -> Result<Vec<DailyPoint>> {
        let rows = self.ad_rows(tenant, window_days)?;

        let mut by_date: BTreeMap<NaiveDate, Vec<&AdRecord>> = BTreeMap::new();
        for row in rows.into_iter().filter(|r| r.ad_id == ad_id) {
            by_date.entry(row.date).or_default().push(row);
        }

        Ok(by_date
            .iter()
            .filter_map(|(date, rows)| {
                Self::daily_value(rows, series).map(|value| DailyPoint { date: *date, value })
            })
            .collect())
    }

    async fn fetch_account_daily_totals(
        &self,
        tenant: &str,
        series: SeriesKind,
        window_days: u32,
    ) -> Result<Vec<DailyPoint>> {
        let rows = self.ad_rows(tenant, window_days)?;

        let mut by_date: BTreeMap<NaiveDate, Vec<&AdRecord>> = BTreeMap::new();
        for row in rows {
            by_date.entry(row.date).or_default().push(row);
        }

        Ok(by_date
            .iter()
            .filter_map(|(date, rows)| {
                Self::daily_value(rows, series).map(|value| DailyPoint { date: *date, value })
            })
            .collect())
    }

    async fn fetch_funnel_series(
        &self,
        tenant: &str,
        ad_id: &str,
        window_days: u32,
    ) -> Result<Vec<DailyFunnel>> {
        let rows = self.ad_rows(tenant, window_days)?;

        let mut by_date: BTreeMap<NaiveDate, Vec<&AdRecord>> = BTreeMap::new();
        for row in rows.into_iter().filter(|r| r.ad_id == ad_id) {
            by_date.entry(row.date).or_default().push(row);
        }

        Ok(by_date
            .iter()
            .map(|(date, rows)| {
                let reported: Vec<u64> = rows.iter().filter_map(|r| r.conversions).collect();
                DailyFunnel {
                    date: *date,
                    impressions: rows.iter().map(|r| r.impressions).sum(),
                    clicks: rows.iter().map(|r| r.clicks).sum(),
                    conversions: if reported.is_empty() {
                        None
                    } else {
                        Some(reported.iter().sum())
                    },
                }
            })
            .collect())
    }

    async fn fetch_daily_budget(&self, tenant: &str, ad_id: &str) -> Result<Option<f64>> {
        self.registry.resolve(tenant)?;
        Ok(self
            .rows
            .get(tenant)
            .into_iter()
            .flatten()
            .filter(|r| r.ad_id == ad_id)
            .filter_map(|r| r.daily_budget)
            .fold(None, |acc: Option<f64>, b| {
                Some(acc.map_or(b, |a| a.max(b)))
            }))
    }
}
