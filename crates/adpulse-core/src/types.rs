//! Data model for ad-performance diagnosis.
//!
//! All classification vocabularies here are closed sets: the root-cause
//! ontology, recommendation actions, confidence levels, severity bands, and
//! execution statuses. Model output is only ever mapped *into* these enums;
//! free-form strings never widen them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// =============================================================================
// VOCABULARIES
// =============================================================================

/// Advertising platform that served an ad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Meta,
    Google,
    TikTok,
    Pinterest,
    Snap,
}

impl Provider {
    /// Get the provider name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Meta => "meta",
            Provider::Google => "google",
            Provider::TikTok => "tiktok",
            Provider::Pinterest => "pinterest",
            Provider::Snap => "snap",
        }
    }
}

/// Category a warehouse row belongs to.
///
/// Advertising metrics and storefront revenue metrics live in the same
/// warehouse view; every aggregation filters on this at source so the two
/// are never mixed into one sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    /// Row reported by an advertising platform
    AdPlatform,
    /// Row reported by the storefront / order system
    Commerce,
}

/// Metrics monitored for anomalies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Spend,
    Roas,
    Ctr,
    Cpm,
    Cpa,
}

impl Metric {
    /// All monitored metrics, in detection order
    pub const ALL: [Metric; 5] = [
        Metric::Spend,
        Metric::Roas,
        Metric::Ctr,
        Metric::Cpm,
        Metric::Cpa,
    ];

    /// Get the metric name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Spend => "spend",
            Metric::Roas => "roas",
            Metric::Ctr => "ctr",
            Metric::Cpm => "cpm",
            Metric::Cpa => "cpa",
        }
    }

    /// Directions examined for this metric
    pub fn directions(&self) -> &'static [Direction] {
        match self {
            Metric::Spend | Metric::Ctr => &[Direction::Low, Direction::High],
            Metric::Roas => &[Direction::Low],
            Metric::Cpm | Metric::Cpa => &[Direction::High],
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a deviation relative to the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    High,
    Low,
}

impl Direction {
    /// Get the direction as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::High => "high",
            Direction::Low => "low",
        }
    }
}

/// Banded magnitude of |z| against the account baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Mild,
    Significant,
    Extreme,
}

impl Severity {
    /// Get the severity as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Mild => "mild",
            Severity::Significant => "significant",
            Severity::Extreme => "extreme",
        }
    }
}

/// Business goodness of a deviation for a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Good,
    Bad,
    Unknown,
}

/// Confidence in a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Get the confidence level as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "LOW",
            Confidence::Medium => "MEDIUM",
            Confidence::High => "HIGH",
        }
    }
}

/// Closed root-cause ontology.
///
/// The model selects probes; mapping probe evidence to one of these tags is
/// done by code, which keeps the ontology closed and the verdict explainable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RootCause {
    CpmSpike,
    CreativeFatigue,
    LandingPage,
    Tracking,
    BudgetExhaustion,
    Seasonality,
    Unknown,
}

impl RootCause {
    /// Get the tag as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            RootCause::CpmSpike => "CPM_SPIKE",
            RootCause::CreativeFatigue => "CREATIVE_FATIGUE",
            RootCause::LandingPage => "LANDING_PAGE",
            RootCause::Tracking => "TRACKING",
            RootCause::BudgetExhaustion => "BUDGET_EXHAUSTION",
            RootCause::Seasonality => "SEASONALITY",
            RootCause::Unknown => "UNKNOWN",
        }
    }

    /// Fixed tag-to-action suggestion map
    pub fn suggested_action(&self) -> &'static str {
        match self {
            RootCause::CpmSpike => "adjust bids or targeting",
            RootCause::CreativeFatigue => "refresh creatives",
            RootCause::LandingPage => "review landing page and checkout funnel",
            RootCause::Tracking => "repair conversion tracking",
            RootCause::BudgetExhaustion => "raise daily budget or rebalance campaigns",
            RootCause::Seasonality => "no action; deviation matches seasonal pattern",
            RootCause::Unknown => "manual review",
        }
    }
}

impl std::fmt::Display for RootCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic probe identity (closed catalog of six)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    CpmSpike,
    CreativeFatigue,
    LandingPage,
    Tracking,
    BudgetExhaustion,
    Seasonality,
}

impl ProbeKind {
    /// All probes, in catalog order
    pub const ALL: [ProbeKind; 6] = [
        ProbeKind::CpmSpike,
        ProbeKind::CreativeFatigue,
        ProbeKind::LandingPage,
        ProbeKind::Tracking,
        ProbeKind::BudgetExhaustion,
        ProbeKind::Seasonality,
    ];

    /// Get the probe name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::CpmSpike => "cpm_spike",
            ProbeKind::CreativeFatigue => "creative_fatigue",
            ProbeKind::LandingPage => "landing_page",
            ProbeKind::Tracking => "tracking",
            ProbeKind::BudgetExhaustion => "budget_exhaustion",
            ProbeKind::Seasonality => "seasonality",
        }
    }

    /// Root-cause tag this probe's positive finding maps to
    pub fn root_cause(&self) -> RootCause {
        match self {
            ProbeKind::CpmSpike => RootCause::CpmSpike,
            ProbeKind::CreativeFatigue => RootCause::CreativeFatigue,
            ProbeKind::LandingPage => RootCause::LandingPage,
            ProbeKind::Tracking => RootCause::Tracking,
            ProbeKind::BudgetExhaustion => RootCause::BudgetExhaustion,
            ProbeKind::Seasonality => RootCause::Seasonality,
        }
    }
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommendation action (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Scale,
    Reduce,
    Pause,
    RefreshCreative,
    Monitor,
    Wait,
}

impl Action {
    /// Get the action as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Scale => "SCALE",
            Action::Reduce => "REDUCE",
            Action::Pause => "PAUSE",
            Action::RefreshCreative => "REFRESH_CREATIVE",
            Action::Monitor => "MONITOR",
            Action::Wait => "WAIT",
        }
    }

    /// Whether this action changes spend on the ad platform
    pub fn mutates_budget(&self) -> bool {
        matches!(self, Action::Scale | Action::Reduce | Action::Pause)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency of a recommendation; orders output, never changes the action
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

/// Terminal status of one simulated execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Skipped,
}

// =============================================================================
// RECORDS
// =============================================================================

/// One warehouse row: a single (ad, day) observation.
///
/// Immutable input; the core never mutates these. Timestamps are normalized
/// to UTC at the warehouse boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdRecord {
    /// Stable ad identifier
    pub ad_id: String,
    /// Display name
    pub ad_name: String,
    /// Serving platform
    pub provider: Provider,
    /// Store / market the ad belongs to
    pub store: String,
    /// Campaign status at observation time (e.g. "ACTIVE")
    pub campaign_status: String,
    /// Row category; aggregations filter on this at source
    pub category: SourceCategory,
    /// Observation day (UTC calendar day)
    pub date: NaiveDate,
    /// Daily spend in dollars, >= 0
    pub spend: f64,
    /// Daily return on ad spend, >= 0
    pub roas: f64,
    /// Daily impressions
    pub impressions: u64,
    /// Daily clicks, <= impressions
    pub clicks: u64,
    /// Daily CTR; undefined when impressions = 0
    pub ctr: Option<f64>,
    /// Daily cost per mille
    pub cpm: Option<f64>,
    /// Daily cost per acquisition
    pub cpa: Option<f64>,
    /// Daily attributed conversions, when reported
    pub conversions: Option<u64>,
    /// Configured daily budget, when known
    pub daily_budget: Option<f64>,
}

/// Per-ad aggregate over the analysis window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdSummary {
    /// Stable ad identifier
    pub ad_id: String,
    /// Display name
    pub ad_name: String,
    /// Serving platform
    pub provider: Provider,
    /// Total spend across the window
    pub spend: f64,
    /// Spend-weighted ROAS over the window
    pub roas: f64,
    /// Spend-weighted CTR over the window, when any impressions were served
    pub ctr: Option<f64>,
    /// Spend-weighted CPM over the window
    pub cpm: Option<f64>,
    /// Cost per acquisition: spend / conversions, when conversions exist
    pub cpa: Option<f64>,
    /// Total attributed conversions over the window
    pub conversions: u64,
    /// Count of distinct days with activity; >= 1 when included
    pub days_active: u32,
    /// First active date in the window
    pub first_active: NaiveDate,
    /// Last active date in the window
    pub last_active: NaiveDate,
}

impl AdSummary {
    /// Value of a monitored metric for this ad, when defined
    pub fn metric_value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Spend => Some(self.spend),
            Metric::Roas => Some(self.roas),
            Metric::Ctr => self.ctr,
            Metric::Cpm => self.cpm,
            Metric::Cpa => self.cpa,
        }
    }
}

/// Per-metric account statistics over the analysis window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricBaseline {
    /// Metric these statistics describe
    pub metric: Metric,
    /// Mean (spend-weighted for ratio metrics)
    pub mean: f64,
    /// Population standard deviation
    pub stddev: f64,
    /// Median of the per-ad values
    pub median: f64,
    /// Number of ads contributing
    pub count: usize,
    /// True iff count >= min_sample_size
    pub sufficient: bool,
}

/// Account-wide baselines, one per metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBaseline {
    /// Per-metric statistics
    pub metrics: HashMap<Metric, MetricBaseline>,
    /// Sample-size guard the `sufficient` flags were computed against
    pub min_sample_size: usize,
}

impl AccountBaseline {
    /// Baseline for one metric, when computed
    pub fn get(&self, metric: Metric) -> Option<&MetricBaseline> {
        self.metrics.get(&metric)
    }

    /// True iff no metric has a sufficient baseline
    pub fn insufficient(&self) -> bool {
        self.metrics.values().all(|b| !b.sufficient)
    }
}

/// A detected deviation for one ad on one metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    /// Ad the deviation belongs to
    pub ad_id: String,
    /// Display name
    pub ad_name: String,
    /// Serving platform
    pub provider: Provider,
    /// Metric that deviated
    pub metric: Metric,
    /// Observed window value
    pub observed: f64,
    /// Account baseline mean
    pub baseline_mean: f64,
    /// Account baseline population stddev
    pub baseline_stddev: f64,
    /// (observed - mean) / stddev
    pub z_score: f64,
    /// Deviation direction
    pub direction: Direction,
    /// Severity band of |z|
    pub severity: Severity,
    /// Business polarity of the deviation
    pub polarity: Polarity,
    /// Percent change vs the baseline mean
    pub pct_change: f64,
    /// Window spend of the ad (tie-break key: cost of inaction)
    pub spend: f64,
}

impl Anomaly {
    /// Human-readable one-line interpretation
    pub fn interpretation(&self) -> String {
        let verb = match self.direction {
            Direction::High => "spiked",
            Direction::Low => "dropped",
        };
        format!(
            "{} {} {:.0}% ({:.2} -> {:.2}), z = {:.1} ({})",
            self.metric.as_str().to_uppercase(),
            verb,
            self.pct_change.abs(),
            self.baseline_mean,
            self.observed,
            self.z_score,
            self.severity.as_str(),
        )
    }
}

/// Structured output of one probe invocation.
///
/// Immutable once emitted. A probe that ran but could not decide records
/// `inconclusive = true` with `fired = false`; it never aborts the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    /// Which probe produced this
    pub probe: ProbeKind,
    /// Whether the probe's condition held
    pub fired: bool,
    /// Probe ran but could not decide (e.g. required data absent)
    pub inconclusive: bool,
    /// Numeric measurements: current vs baseline and derived figures
    pub measurements: HashMap<String, f64>,
    /// Human-readable interpretation
    pub interpretation: String,
    /// First day of the range examined
    pub window_start: NaiveDate,
    /// Last day of the range examined
    pub window_end: NaiveDate,
    /// Severity of the probe's own measurement, when it fired
    pub severity: Option<Severity>,
}

/// Root-cause conclusion for one anomaly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCauseVerdict {
    /// Ad the verdict applies to
    pub ad_id: String,
    /// Metric whose anomaly was diagnosed
    pub metric: Metric,
    /// Tag from the closed ontology
    pub cause: RootCause,
    /// Confidence derived from fired-probe severities
    pub confidence: Confidence,
    /// Ordered evidence from every probe invoked during diagnosis
    pub evidence: Vec<Evidence>,
    /// Suggested action from the fixed tag-to-action map
    pub suggested_action: String,
    /// Violations recorded along the way (timeouts, protocol failures)
    pub violations: Vec<String>,
    /// Probe invocations consumed (bounded by the step cap)
    pub steps_taken: usize,
}

/// One actionable recommendation for an ad
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    /// Ad the recommendation applies to
    pub ad_id: String,
    /// Display name
    pub ad_name: String,
    /// Serving platform
    pub provider: Provider,
    /// Action from the closed set
    pub action: Action,
    /// Output ordering hint; never changes the action
    pub priority: Priority,
    /// Current spend over the window
    pub current_spend: f64,
    /// Proposed percentage change to spend (signed; 0 for non-budget actions)
    pub proposed_change_pct: f64,
    /// current_spend * (1 + proposed_change_pct / 100)
    pub proposed_new_spend: f64,
    /// (proposed_new_spend - current_spend) * observed ROAS, rounded to $1
    pub expected_revenue_change: f64,
    /// Observed spend-weighted ROAS cited by the rationale
    pub observed_roas: f64,
    /// Confidence in the classification
    pub confidence: Confidence,
    /// Rationale citing the source metrics (and verdict, when it overrode)
    pub rationale: String,
    /// Root cause that informed the action, when one was diagnosed
    pub root_cause: Option<RootCause>,
    /// Validator violations when the deterministic fallback was substituted
    pub violations: Vec<String>,
}

/// Result of simulating one recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Ad the recommendation applied to
    pub ad_id: String,
    /// Display name
    pub ad_name: String,
    /// Action that was attempted (or skipped)
    pub action: Action,
    /// Terminal status
    pub status: ExecutionStatus,
    /// Human-readable outcome message
    pub message: String,
    /// Whether this was a dry run
    pub dry_run: bool,
}

/// Opaque session identifier
pub type SessionId = Uuid;

/// Timestamped snapshot metadata attached to responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSpec {
    /// Tenant short code
    pub tenant: String,
    /// Lookback period in whole days
    pub window_days: u32,
    /// When the analysis ran
    pub analyzed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Mild < Severity::Significant);
        assert!(Severity::Significant < Severity::Extreme);
    }

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::Low < Confidence::Medium);
        assert!(Confidence::Medium < Confidence::High);
    }

    #[test]
    fn test_root_cause_serializes_screaming_snake() {
        let json = serde_json::to_string(&RootCause::CpmSpike).unwrap();
        assert_eq!(json, "\"CPM_SPIKE\"");
        let parsed: RootCause = serde_json::from_str("\"BUDGET_EXHAUSTION\"").unwrap();
        assert_eq!(parsed, RootCause::BudgetExhaustion);
    }

    #[test]
    fn test_probe_maps_to_root_cause() {
        assert_eq!(ProbeKind::CpmSpike.root_cause(), RootCause::CpmSpike);
        assert_eq!(ProbeKind::Tracking.root_cause(), RootCause::Tracking);
    }

    #[test]
    fn test_metric_directions() {
        assert_eq!(Metric::Roas.directions(), &[Direction::Low]);
        assert_eq!(Metric::Cpa.directions(), &[Direction::High]);
        assert_eq!(
            Metric::Ctr.directions(),
            &[Direction::Low, Direction::High]
        );
    }

    #[test]
    fn test_anomaly_interpretation() {
        let anomaly = Anomaly {
            ad_id: "ad-1".into(),
            ad_name: "Summer Sale Video".into(),
            provider: Provider::Meta,
            metric: Metric::Roas,
            observed: 1.8,
            baseline_mean: 4.5,
            baseline_stddev: 0.8,
            z_score: -3.4,
            direction: Direction::Low,
            severity: Severity::Extreme,
            polarity: Polarity::Bad,
            pct_change: -60.0,
            spend: 12_000.0,
        };
        let text = anomaly.interpretation();
        assert!(text.contains("ROAS dropped 60%"));
        assert!(text.contains("extreme"));
    }
}
