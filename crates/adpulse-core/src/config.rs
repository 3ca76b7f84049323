//! Configuration for the adpulse core.
//!
//! Everything here is loaded once at startup and immutable thereafter:
//! detection thresholds, orchestration bounds, deadlines, the tenant
//! registry, and model-provider selection. Credentials arrive through
//! environment variables as opaque tokens and are never logged.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

/// Anomaly detection thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Z-score cutoff for "significant" (anomalies are emitted at or above)
    pub threshold_sigma: f64,
    /// |z| at or above which a deviation is at least mild
    pub mild_sigma: f64,
    /// |z| at or above which a deviation is extreme
    pub extreme_sigma: f64,
    /// Minimum ad count for a baseline to be sufficient
    pub min_sample_size: usize,
    /// Spend floor (dollars over the window) for inclusion
    pub min_spend: f64,
    /// Cap on emitted anomalies per metric, sorted by |z| descending
    pub max_per_metric: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            threshold_sigma: 2.0,
            mild_sigma: 1.5,
            extreme_sigma: 3.0,
            min_sample_size: 10,
            min_spend: 100.0,
            max_per_metric: 50,
        }
    }
}

/// RCA orchestration bounds and deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcaConfig {
    /// Per-anomaly probe-invocation cap
    pub max_steps: usize,
    /// Anomalies diagnosed in parallel
    pub concurrency: usize,
    /// Per-anomaly RCA deadline in milliseconds
    pub anomaly_timeout_ms: u64,
    /// Per-model-call deadline in milliseconds
    pub model_call_timeout_ms: u64,
    /// Per-session analysis deadline in milliseconds
    pub session_timeout_ms: u64,
}

impl Default for RcaConfig {
    fn default() -> Self {
        Self {
            max_steps: 6,
            concurrency: 4,
            anomaly_timeout_ms: 60_000,
            model_call_timeout_ms: 30_000,
            session_timeout_ms: 120_000,
        }
    }
}

/// Probe thresholds and deadline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Per-probe deadline in milliseconds
    pub timeout_ms: u64,
    /// Recent comparison window for the CPM probe (days)
    pub cpm_recent_days: u32,
    /// Prior comparison window for the CPM probe (days)
    pub cpm_baseline_days: u32,
    /// Relative CPM change that counts as a spike (percent)
    pub cpm_spike_pct: f64,
    /// Relative CTR decline across the window that counts as fatigue (percent)
    pub fatigue_decline_pct: f64,
    /// Recent impressions must stay at or above this fraction of the mean
    pub fatigue_impression_floor: f64,
    /// CTR must stay within this band for a landing-page finding (percent)
    pub landing_ctr_band_pct: f64,
    /// CVR decline beyond this indicates a landing-page problem (percent)
    pub landing_cvr_drop_pct: f64,
    /// Trailing window for the tracking probe (hours)
    pub tracking_window_hours: u32,
    /// Spend/budget ratio above which the budget is exhausted
    pub budget_utilization: f64,
    /// Deviation band for a seasonal match (percent)
    pub seasonality_band_pct: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            cpm_recent_days: 3,
            cpm_baseline_days: 7,
            cpm_spike_pct: 25.0,
            fatigue_decline_pct: 15.0,
            fatigue_impression_floor: 0.5,
            landing_ctr_band_pct: 10.0,
            landing_cvr_drop_pct: 30.0,
            tracking_window_hours: 48,
            budget_utilization: 0.95,
            seasonality_band_pct: 25.0,
        }
    }
}

/// Grounded-output validation tolerances and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Retry-with-feedback cap before the deterministic fallback
    pub retry_max: usize,
    /// Absolute tolerance for cited spend figures (dollars)
    pub spend_tolerance_abs: f64,
    /// Relative tolerance for cited ROAS/CTR/CPA figures
    pub ratio_tolerance_rel: f64,
    /// Absolute tolerance for cited z-scores
    pub z_tolerance_abs: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            retry_max: 2,
            spend_tolerance_abs: 1.0,
            ratio_tolerance_rel: 0.01,
            z_tolerance_abs: 0.05,
        }
    }
}

/// Session lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle lifetime in seconds before a session expires
    pub ttl_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_seconds: 3600 }
    }
}

/// Model backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelProvider {
    /// Deterministic decision-table model; no network calls
    Rules,
    /// Remote model endpoint speaking the probe-selection protocol
    Http,
}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Which model backend to target
    pub provider: ModelProvider,
    /// Endpoint for the HTTP provider
    pub endpoint: Option<String>,
    /// Opaque API token; read from the environment, never logged
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::Rules,
            endpoint: None,
            api_key: None,
        }
    }
}

/// Top-level configuration recognized by the core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Anomaly detection thresholds
    pub anomaly: AnomalyConfig,
    /// RCA orchestration bounds
    pub rca: RcaConfig,
    /// Probe thresholds
    pub probe: ProbeConfig,
    /// Validator tolerances
    pub validator: ValidatorConfig,
    /// Session lifecycle
    pub session: SessionConfig,
    /// Model backend
    pub model: ModelConfig,
    /// Tenant short code -> warehouse view identifier
    pub tenants: HashMap<String, String>,
}

/// Environment variable naming the tenant registry
/// (format: `code=view,code=view`)
const ENV_TENANTS: &str = "ADPULSE_TENANTS";
/// Environment variable carrying the model API token
const ENV_MODEL_API_KEY: &str = "ADPULSE_MODEL_API_KEY";
/// Environment variable selecting the model provider (`rules` | `http`)
const ENV_MODEL_PROVIDER: &str = "ADPULSE_MODEL_PROVIDER";
/// Environment variable naming the model endpoint
const ENV_MODEL_ENDPOINT: &str = "ADPULSE_MODEL_ENDPOINT";

impl Config {
    /// Load configuration from the environment, falling back to defaults
    /// for everything except the tenant registry, which is required.
    pub fn from_env() -> Result<Self> {
        let tenants_raw = env::var(ENV_TENANTS)
            .map_err(|_| Error::config(format!("{ENV_TENANTS} is required")))?;
        let tenants = parse_tenant_spec(&tenants_raw)?;

        let provider = match env::var(ENV_MODEL_PROVIDER).ok().as_deref() {
            None | Some("rules") => ModelProvider::Rules,
            Some("http") => ModelProvider::Http,
            Some(other) => {
                return Err(Error::config(format!("unknown model provider {other:?}")));
            }
        };

        let model = ModelConfig {
            provider,
            endpoint: env::var(ENV_MODEL_ENDPOINT).ok(),
            api_key: env::var(ENV_MODEL_API_KEY).ok(),
        };

        let config = Self {
            model,
            tenants,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.tenants.is_empty() {
            return Err(Error::config("tenant registry must not be empty"));
        }
        if self.anomaly.threshold_sigma <= 0.0 {
            return Err(Error::config("anomaly.threshold_sigma must be positive"));
        }
        if self.rca.max_steps == 0 {
            return Err(Error::config("rca.max_steps must be at least 1"));
        }
        if self.rca.concurrency == 0 {
            return Err(Error::config("rca.concurrency must be at least 1"));
        }
        if self.model.provider == ModelProvider::Http && self.model.endpoint.is_none() {
            return Err(Error::config("http model provider requires an endpoint"));
        }
        Ok(())
    }
}

/// Parse `code=view,code=view` into the tenant registry
fn parse_tenant_spec(raw: &str) -> Result<HashMap<String, String>> {
    let mut tenants = HashMap::new();
    for pair in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let (code, view) = pair
            .split_once('=')
            .ok_or_else(|| Error::config(format!("malformed tenant entry {pair:?}")))?;
        tenants.insert(code.trim().to_string(), view.trim().to_string());
    }
    Ok(tenants)
}
