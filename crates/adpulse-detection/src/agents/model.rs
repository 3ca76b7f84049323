//! Model client for probe selection and recommendation drafting.
//!
//! Two backends sit behind one trait:
//!
//! - [`DecisionTableModel`]: deterministic; walks the fixed anomaly-metric
//!   to probe-preference table and drafts recommendations straight from the
//!   guideline table. It is the default backend when no remote provider is
//!   configured, which keeps invariant 5 (byte-equal reruns without a
//!   model) cheap to hold.
//! - [`HttpModel`]: a remote endpoint speaking the probe-selection
//!   protocol. The orchestrator feeds it grounded facts and the probe
//!   catalog; it answers one turn at a time.

use crate::probes::ProbeSpec;
use adpulse_core::config::ModelConfig;
use adpulse_core::types::{Anomaly, Evidence, Metric, ProbeKind, Provider, RootCause};
use adpulse_core::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default timeout for remote model calls
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Decision-table hint: anomaly metric -> ordered probe preference.
///
/// Presented to the model alongside the catalog and used verbatim by the
/// deterministic backend and the verdict resolver's tie-break.
pub fn probe_preferences(metric: Metric) -> &'static [ProbeKind] {
    match metric {
        Metric::Roas => &[
            ProbeKind::CpmSpike,
            ProbeKind::CreativeFatigue,
            ProbeKind::LandingPage,
            ProbeKind::Tracking,
            ProbeKind::Seasonality,
        ],
        Metric::Spend => &[
            ProbeKind::BudgetExhaustion,
            ProbeKind::CpmSpike,
            ProbeKind::Seasonality,
        ],
        Metric::Ctr => &[ProbeKind::CreativeFatigue, ProbeKind::Seasonality],
        Metric::Cpa => &[
            ProbeKind::LandingPage,
            ProbeKind::CpmSpike,
            ProbeKind::Tracking,
        ],
        Metric::Cpm => &[ProbeKind::CpmSpike, ProbeKind::Seasonality],
    }
}

/// Grounded context for one anomaly's diagnosis: facts only, no narrative
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcaContext {
    /// Tenant short code
    pub tenant: String,
    /// Analysis window in days
    pub window_days: u32,
    /// The anomaly under diagnosis
    pub anomaly: Anomaly,
}

impl RcaContext {
    /// SHA-256 over the serialized facts; evidence references this hash
    pub fn compute_hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// One turn of the probe-selection protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "turn", rename_all = "snake_case")]
pub enum ModelTurn {
    /// Run this probe next
    Invoke {
        /// Probe to execute
        probe: ProbeKind,
    },
    /// The model considers the investigation finished
    Complete,
}

/// Source facts a recommendation must stay grounded in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationFacts {
    /// Ad identity
    pub ad_id: String,
    /// Display name
    pub ad_name: String,
    /// Serving platform
    pub provider: Provider,
    /// Window spend
    pub spend: f64,
    /// Spend-weighted window ROAS
    pub roas: f64,
    /// Distinct active days in the window
    pub days_active: u32,
    /// Account mean ROAS for comparison
    pub account_mean_roas: f64,
    /// Z-score of the ad's anomaly, when one was detected
    pub z_score: Option<f64>,
    /// Root cause from diagnosis, when one was reached
    pub root_cause: Option<RootCause>,
}

/// Reasoning chain the draft must carry, step by step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftChain {
    /// Restated source data
    #[serde(default)]
    pub data: Option<DraftData>,
    /// Comparison against the account baseline
    #[serde(default)]
    pub comparison: Option<String>,
    /// Qualification against the spend/age gates
    #[serde(default)]
    pub qualification: Option<DraftQualification>,
    /// Which guideline row led to the classification
    #[serde(default)]
    pub classification: Option<String>,
    /// Why the stated confidence level
    #[serde(default)]
    pub confidence_rationale: Option<String>,
}

/// Cited source data inside the chain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftData {
    /// Cited window spend
    #[serde(default)]
    pub spend: Option<f64>,
    /// Cited window ROAS
    #[serde(default)]
    pub roas: Option<f64>,
    /// Cited active days
    #[serde(default)]
    pub days: Option<u32>,
}

/// Qualification flags inside the chain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftQualification {
    /// Whether spend clears the $1,000 gate
    #[serde(default)]
    pub spend_ok: Option<bool>,
    /// Whether the ad clears the 7-day gate
    #[serde(default)]
    pub days_ok: Option<bool>,
}

/// A model-drafted recommendation, prior to validation.
///
/// Everything is optional or string-typed on purpose: the validator - not
/// the deserializer - reports missing fields and out-of-vocabulary values,
/// so the retry feedback can name each violation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendationDraft {
    /// Ad the draft addresses
    #[serde(default)]
    pub ad_id: Option<String>,
    /// Action name (validated against the closed set)
    #[serde(default)]
    pub action: Option<String>,
    /// Confidence name (validated against the closed set)
    #[serde(default)]
    pub confidence: Option<String>,
    /// Cited current spend
    #[serde(default)]
    pub cited_spend: Option<f64>,
    /// Cited window ROAS
    #[serde(default)]
    pub cited_roas: Option<f64>,
    /// Cited z-score, when the ad was anomalous
    #[serde(default)]
    pub cited_z: Option<f64>,
    /// Proposed percentage change to spend
    #[serde(default)]
    pub proposed_change_pct: Option<f64>,
    /// Proposed new spend level
    #[serde(default)]
    pub proposed_new_spend: Option<f64>,
    /// Expected revenue delta from the change
    #[serde(default)]
    pub expected_revenue_change: Option<f64>,
    /// Rationale citing the metrics (and the verdict when deviating)
    #[serde(default)]
    pub rationale: Option<String>,
    /// Step-by-step reasoning chain
    #[serde(default)]
    pub chain: Option<DraftChain>,
}

/// Probe selector and recommendation drafter
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Choose the next probe (or complete) given context, catalog, and the
    /// evidence gathered so far. `feedback` carries the orchestrator's
    /// protocol-violation message on a retry.
    async fn next_probe(
        &self,
        context: &RcaContext,
        catalog: &[ProbeSpec],
        transcript: &[Evidence],
        feedback: Option<&str>,
    ) -> Result<ModelTurn>;

    /// Draft a recommendation for the given facts. `feedback` carries the
    /// validator's violation list on a retry.
    async fn draft_recommendation(
        &self,
        facts: &RecommendationFacts,
        feedback: Option<&str>,
    ) -> Result<RecommendationDraft>;
}

// =============================================================================
// DECISION-TABLE BACKEND
// =============================================================================

/// Deterministic backend: preference-table probe selection and
/// guideline-table recommendations. No network, no state.
#[derive(Debug, Clone, Default)]
pub struct DecisionTableModel;

impl DecisionTableModel {
    /// Create the deterministic backend
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelClient for DecisionTableModel {
    fn name(&self) -> &'static str {
        "decision-table"
    }

    async fn next_probe(
        &self,
        context: &RcaContext,
        _catalog: &[ProbeSpec],
        transcript: &[Evidence],
        _feedback: Option<&str>,
    ) -> Result<ModelTurn> {
        // a conclusive positive finding ends the investigation
        if transcript.iter().any(|e| e.fired) {
            return Ok(ModelTurn::Complete);
        }

        let executed: Vec<ProbeKind> = transcript.iter().map(|e| e.probe).collect();
        for kind in probe_preferences(context.anomaly.metric) {
            if !executed.contains(kind) {
                debug!(probe = %kind, metric = %context.anomaly.metric, "Selecting next probe");
                return Ok(ModelTurn::Invoke { probe: *kind });
            }
        }
        Ok(ModelTurn::Complete)
    }

    async fn draft_recommendation(
        &self,
        facts: &RecommendationFacts,
        _feedback: Option<&str>,
    ) -> Result<RecommendationDraft> {
        let decision = crate::agents::recommend::table_classification(facts);
        let proposed_new_spend = facts.spend * (1.0 + decision.change_pct / 100.0);
        let expected = ((proposed_new_spend - facts.spend) * facts.roas).round();

        Ok(RecommendationDraft {
            ad_id: Some(facts.ad_id.clone()),
            action: Some(decision.action.as_str().to_string()),
            confidence: Some(decision.confidence.as_str().to_string()),
            cited_spend: Some(facts.spend),
            cited_roas: Some(facts.roas),
            cited_z: facts.z_score,
            proposed_change_pct: Some(decision.change_pct),
            proposed_new_spend: Some(proposed_new_spend),
            expected_revenue_change: Some(expected),
            rationale: Some(decision.rationale.clone()),
            chain: Some(DraftChain {
                data: Some(DraftData {
                    spend: Some(facts.spend),
                    roas: Some(facts.roas),
                    days: Some(facts.days_active),
                }),
                comparison: Some(format!(
                    "ROAS {:.2} vs account mean {:.2}",
                    facts.roas, facts.account_mean_roas
                )),
                qualification: Some(DraftQualification {
                    spend_ok: Some(facts.spend >= 1000.0),
                    days_ok: Some(facts.days_active >= 7),
                }),
                classification: Some(decision.action.as_str().to_string()),
                confidence_rationale: Some(decision.rationale),
            }),
        })
    }
}

// =============================================================================
// HTTP BACKEND
// =============================================================================

/// Remote model backend speaking the probe-selection protocol over HTTP
#[derive(Debug, Clone)]
pub struct HttpModel {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct TurnRequest<'a> {
    context: &'a RcaContext,
    context_hash: String,
    catalog: &'a [ProbeSpec],
    transcript: &'a [Evidence],
    feedback: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DraftRequest<'a> {
    facts: &'a RecommendationFacts,
    feedback: Option<&'a str>,
}

impl HttpModel {
    /// Build a client from model configuration
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let base_url = config
            .endpoint
            .as_deref()
            .ok_or_else(|| Error::config("http model provider requires an endpoint"))?;
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| Error::upstream(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    async fn post_json<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(format!("model call {path}"))
            } else {
                Error::upstream(e.to_string())
            }
        })?;

        match response.status().as_u16() {
            200 => response
                .json::<T>()
                .await
                .map_err(|e| Error::model(format!("malformed model response: {e}"))),
            400 | 422 => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::model(body))
            }
            401 | 403 => Err(Error::upstream("model authentication failed".to_string())),
            429 => Err(Error::upstream("model rate limited".to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                warn!(status, body = %body, "Model endpoint error");
                Err(Error::upstream(format!("model status {status}: {body}")))
            }
        }
    }
}

#[async_trait]
impl ModelClient for HttpModel {
    fn name(&self) -> &'static str {
        "http"
    }

    #[instrument(skip_all, fields(ad_id = %context.anomaly.ad_id, metric = %context.anomaly.metric))]
    async fn next_probe(
        &self,
        context: &RcaContext,
        catalog: &[ProbeSpec],
        transcript: &[Evidence],
        feedback: Option<&str>,
    ) -> Result<ModelTurn> {
        let body = TurnRequest {
            context,
            context_hash: context.compute_hash(),
            catalog,
            transcript,
            feedback,
        };
        self.post_json("/v1/rca/turns", &body).await
    }

    #[instrument(skip_all, fields(ad_id = %facts.ad_id))]
    async fn draft_recommendation(
        &self,
        facts: &RecommendationFacts,
        feedback: Option<&str>,
    ) -> Result<RecommendationDraft> {
        let body = DraftRequest { facts, feedback };
        self.post_json("/v1/recommendations/draft", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adpulse_core::types::{Direction, Polarity, Severity};

    fn anomaly(metric: Metric) -> Anomaly {
        Anomaly {
            ad_id: "ad-1".to_string(),
            ad_name: "ad-1 name".to_string(),
            provider: Provider::Meta,
            metric,
            observed: 1.0,
            baseline_mean: 6.88,
            baseline_stddev: 2.0,
            z_score: -2.9,
            direction: Direction::Low,
            severity: Severity::Significant,
            polarity: Polarity::Bad,
            pct_change: -85.0,
            spend: 20_000.0,
        }
    }

    fn context(metric: Metric) -> RcaContext {
        RcaContext {
            tenant: "tl".to_string(),
            window_days: 30,
            anomaly: anomaly(metric),
        }
    }

    fn evidence(probe: ProbeKind, fired: bool) -> Evidence {
        Evidence {
            probe,
            fired,
            inconclusive: false,
            measurements: Default::default(),
            interpretation: String::new(),
            window_start: chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            window_end: chrono::NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            severity: None,
        }
    }

    #[tokio::test]
    async fn test_preference_walk_for_roas_drop() {
        let model = DecisionTableModel::new();
        let ctx = context(Metric::Roas);
        let catalog = crate::probes::catalog();

        let turn = model.next_probe(&ctx, &catalog, &[], None).await.unwrap();
        assert_eq!(
            turn,
            ModelTurn::Invoke {
                probe: ProbeKind::CpmSpike
            }
        );

        let transcript = vec![evidence(ProbeKind::CpmSpike, false)];
        let turn = model.next_probe(&ctx, &catalog, &transcript, None).await.unwrap();
        assert_eq!(
            turn,
            ModelTurn::Invoke {
                probe: ProbeKind::CreativeFatigue
            }
        );
    }

    #[tokio::test]
    async fn test_completes_after_fired_probe() {
        let model = DecisionTableModel::new();
        let ctx = context(Metric::Roas);
        let catalog = crate::probes::catalog();

        let transcript = vec![evidence(ProbeKind::CpmSpike, true)];
        let turn = model.next_probe(&ctx, &catalog, &transcript, None).await.unwrap();
        assert_eq!(turn, ModelTurn::Complete);
    }

    #[tokio::test]
    async fn test_completes_when_preferences_exhausted() {
        let model = DecisionTableModel::new();
        let ctx = context(Metric::Cpm);
        let catalog = crate::probes::catalog();

        let transcript = vec![
            evidence(ProbeKind::CpmSpike, false),
            evidence(ProbeKind::Seasonality, false),
        ];
        let turn = model.next_probe(&ctx, &catalog, &transcript, None).await.unwrap();
        assert_eq!(turn, ModelTurn::Complete);
    }

    #[test]
    fn test_context_hash_is_stable() {
        let a = context(Metric::Roas).compute_hash();
        let b = context(Metric::Roas).compute_hash();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_model_turn_wire_format() {
        let turn = ModelTurn::Invoke {
            probe: ProbeKind::CpmSpike,
        };
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"{"turn":"invoke","probe":"cpm_spike"}"#);

        let parsed: ModelTurn = serde_json::from_str(r#"{"turn":"complete"}"#).unwrap();
        assert_eq!(parsed, ModelTurn::Complete);
    }
}
