//! Analysis service: the coordinator behind the three request operations.
//!
//! Owns the pipeline ordering guarantees within a session - baselines
//! strictly before detection, detection before diagnosis, diagnosis before
//! recommendation - and the per-session analysis deadline. Sessions are the
//! only mutable state; everything else here is wiring.

use adpulse_core::config::Config;
use adpulse_core::session::SessionManager;
use adpulse_core::types::{
    Confidence, ExecutionResult, Recommendation, RootCause, RootCauseVerdict, SessionId, WindowSpec,
};
use adpulse_core::{Error, Result};
use adpulse_detection::agents::{
    DecisionTableModel, ExecutionSimulator, ExecutionSummary, GroundedValidator, HttpModel,
    ModelClient, RcaOrchestrator, RecommendationGenerator, RecommendationSummary,
};
use adpulse_detection::{AnomalyDetector, BaselineEngine};
use adpulse_warehouse::{MetricStore, RetryPolicy};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Snapshot of one metric's baseline for the analyze summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineSnapshot {
    /// Baseline mean
    pub mean: f64,
    /// Population standard deviation
    pub stddev: f64,
    /// Median of contributing values
    pub median: f64,
    /// Contributing ad count
    pub count: usize,
    /// Whether the sample-size guard was met
    pub sufficient: bool,
}

/// Summary returned by `analyze`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeSummary {
    /// Tenant analyzed
    pub tenant: String,
    /// Window in days
    pub window_days: u32,
    /// Ads with activity in the window
    pub ad_count: usize,
    /// Anomalies surviving the bad-only filter
    pub anomaly_count: usize,
    /// Anomalies that received a diagnosis
    pub diagnosed: usize,
    /// Warehouse rows dropped by strict parsing
    pub records_dropped: u64,
    /// True when no metric had a sufficient baseline (InsufficientData)
    pub insufficient_data: bool,
    /// Per-metric baseline snapshot
    pub baseline: HashMap<String, BaselineSnapshot>,
}

/// Coordinator for analyze / recommend / execute
pub struct AnalysisService {
    store: Arc<dyn MetricStore>,
    sessions: Arc<SessionManager>,
    orchestrator: RcaOrchestrator,
    generator: RecommendationGenerator,
    simulator: ExecutionSimulator,
    retry: RetryPolicy,
    config: Config,
}

impl std::fmt::Debug for AnalysisService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisService")
            .field("store", &self.store.name())
            .field("active_sessions", &self.sessions.active_count())
            .finish()
    }
}

impl AnalysisService {
    /// Wire the pipeline over the given store and configuration.
    ///
    /// The model backend follows `config.model.provider`; the decision
    /// table serves as both the default backend and the degradation path.
    pub fn new(store: Arc<dyn MetricStore>, config: Config) -> Result<Self> {
        let model: Arc<dyn ModelClient> = match config.model.provider {
            adpulse_core::config::ModelProvider::Rules => Arc::new(DecisionTableModel::new()),
            adpulse_core::config::ModelProvider::Http => {
                Arc::new(HttpModel::from_config(&config.model)?)
            }
        };

        Ok(Self {
            orchestrator: RcaOrchestrator::new(
                store.clone(),
                model.clone(),
                config.rca.clone(),
                config.probe.clone(),
                config.validator.clone(),
            ),
            generator: RecommendationGenerator::new(
                model,
                GroundedValidator::new(config.validator.clone()),
            ),
            simulator: ExecutionSimulator::new(),
            sessions: Arc::new(SessionManager::new(config.session.ttl_seconds)),
            retry: RetryPolicy::default(),
            store,
            config,
        })
    }

    /// Session registry, for health reporting
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Metric store handle, for readiness checks
    pub fn store(&self) -> &Arc<dyn MetricStore> {
        &self.store
    }

    /// Run the full detection + diagnosis pipeline for a (tenant, window).
    ///
    /// `source_hint` is advisory and recorded only in logs. Returns the new
    /// session id with the analyze summary.
    #[instrument(skip(self), fields(tenant, window_days))]
    pub async fn analyze(
        &self,
        tenant: &str,
        window_days: u32,
        source_hint: Option<&str>,
    ) -> Result<(SessionId, AnalyzeSummary)> {
        if let Some(hint) = source_hint {
            info!(hint, "Analyze requested with source hint");
        }

        let store = self.store.clone();
        let fetch = self
            .retry
            .run("fetch_ad_summaries", || {
                let store = store.clone();
                let tenant = tenant.to_string();
                async move { store.fetch_ad_summaries(&tenant, window_days).await }
            })
            .await?;

        let baseline = BaselineEngine::compute(&fetch.summaries, &self.config.anomaly);
        let insufficient = baseline.insufficient();

        let anomalies = if insufficient {
            Vec::new()
        } else {
            AnomalyDetector::detect(&fetch.summaries, &baseline, &self.config.anomaly)
        };

        // diagnosis under the per-session deadline; on expiry every anomaly
        // still gets a verdict, marked with the timeout violation
        let session_deadline = Duration::from_millis(self.config.rca.session_timeout_ms);
        let verdicts = match tokio::time::timeout(
            session_deadline,
            self.orchestrator.diagnose_all(tenant, window_days, &anomalies),
        )
        .await
        {
            Ok(verdicts) => verdicts,
            Err(_) => {
                warn!(tenant, "Session analysis deadline exceeded; emitting timeout verdicts");
                anomalies.iter().map(timeout_verdict).collect()
            }
        };

        let summary = AnalyzeSummary {
            tenant: tenant.to_string(),
            window_days,
            ad_count: fetch.summaries.len(),
            anomaly_count: anomalies.len(),
            diagnosed: verdicts.len(),
            records_dropped: fetch.records_dropped,
            insufficient_data: insufficient,
            baseline: baseline
                .metrics
                .iter()
                .map(|(metric, b)| {
                    (
                        metric.as_str().to_string(),
                        BaselineSnapshot {
                            mean: b.mean,
                            stddev: b.stddev,
                            median: b.median,
                            count: b.count,
                            sufficient: b.sufficient,
                        },
                    )
                })
                .collect(),
        };

        let handle = self.sessions.create(WindowSpec {
            tenant: tenant.to_string(),
            window_days,
            analyzed_at: Utc::now(),
        });
        let session_id = {
            let mut session = handle.write().await;
            session.summaries = fetch.summaries;
            session.baseline = baseline;
            session.anomalies = anomalies;
            session.verdicts = verdicts;
            session.records_dropped = fetch.records_dropped;
            session.insufficient_data = insufficient;
            session.id
        };

        info!(
            tenant,
            window_days,
            session_id = %session_id,
            ads = summary.ad_count,
            anomalies = summary.anomaly_count,
            insufficient = summary.insufficient_data,
            "Analysis complete"
        );
        ::metrics::counter!("adpulse_sessions_created_total").increment(1);

        Ok((session_id, summary))
    }

    /// Generate recommendations for an analyzed session
    #[instrument(skip(self), fields(session_id = %session_id, use_model))]
    pub async fn recommend(
        &self,
        session_id: SessionId,
        use_model: bool,
    ) -> Result<(Vec<Recommendation>, RecommendationSummary)> {
        let handle = self.sessions.get(session_id).await?;

        let (recommendations, summary) = {
            let session = handle.read().await;
            self.generator
                .generate(
                    &session.summaries,
                    &session.baseline,
                    &session.anomalies,
                    &session.verdicts,
                    use_model,
                )
                .await
        };

        handle.write().await.recommendations = recommendations.clone();
        Ok((recommendations, summary))
    }

    /// Simulate execution of a session's recommendations
    #[instrument(skip(self, approved), fields(session_id = %session_id, dry_run))]
    pub async fn execute(
        &self,
        session_id: SessionId,
        approved: Option<Vec<String>>,
        dry_run: bool,
    ) -> Result<(Vec<ExecutionResult>, ExecutionSummary)> {
        let handle = self.sessions.get(session_id).await?;
        let session = handle.read().await;

        if session.recommendations.is_empty() {
            return Err(Error::config(
                "no recommendations in session; call recommend before execute",
            ));
        }

        let approved_set: Option<HashSet<String>> = approved.map(|ids| ids.into_iter().collect());
        Ok(self
            .simulator
            .execute(&session, approved_set.as_ref(), dry_run)
            .await)
    }

    /// Explicitly release a session
    pub fn release(&self, session_id: SessionId) -> bool {
        self.sessions.release(session_id)
    }
}

fn timeout_verdict(anomaly: &adpulse_core::types::Anomaly) -> RootCauseVerdict {
    RootCauseVerdict {
        ad_id: anomaly.ad_id.clone(),
        metric: anomaly.metric,
        cause: RootCause::Unknown,
        confidence: Confidence::Low,
        evidence: Vec::new(),
        suggested_action: RootCause::Unknown.suggested_action().to_string(),
        violations: vec!["timeout: session analysis deadline exceeded".to_string()],
        steps_taken: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adpulse_core::types::{Action, Provider, SourceCategory};
    use adpulse_warehouse::prelude::{FixtureStore, RawAdRow};
    use adpulse_warehouse::TenantRegistry;
    use chrono::NaiveDate;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, n).unwrap()
    }

    fn row(ad_id: &str, date: NaiveDate, spend: f64, roas: f64) -> RawAdRow {
        RawAdRow {
            ad_id: ad_id.to_string(),
            ad_name: format!("{ad_id} name"),
            provider: Provider::Meta,
            store: "us".to_string(),
            campaign_status: "ACTIVE".to_string(),
            category: SourceCategory::AdPlatform,
            date,
            spend: spend.to_string(),
            roas: roas.to_string(),
            impressions: "10000".to_string(),
            clicks: "200".to_string(),
            cpm: Some("12.0".to_string()),
            cpa: None,
            conversions: Some("10".to_string()),
            daily_budget: None,
        }
    }

    fn registry() -> TenantRegistry {
        TenantRegistry::new(
            [("tl".to_string(), "warehouse.tl_daily".to_string())]
                .into_iter()
                .collect(),
        )
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.tenants.insert("tl".into(), "warehouse.tl_daily".into());
        config
    }

    /// Twelve healthy ads plus one zero-ROAS heavy spender
    fn seeded_store() -> FixtureStore {
        let mut rows = Vec::new();
        for ad in 0..12 {
            for d in 1..=10 {
                rows.push(row(&format!("ad-{ad:02}"), day(d), 500.0, 6.5 + (ad % 3) as f64));
            }
        }
        for d in 1..=10 {
            rows.push(row("ad-dead", day(d), 880.0, 0.0));
        }
        FixtureStore::new(registry()).with_now(day(10)).load_rows("tl", rows)
    }

    fn service(store: FixtureStore) -> AnalysisService {
        AnalysisService::new(Arc::new(store), config()).unwrap()
    }

    #[tokio::test]
    async fn test_full_pipeline_detects_and_recommends() {
        let service = service(seeded_store());
        let (session_id, summary) = service.analyze("tl", 10, None).await.unwrap();

        assert_eq!(summary.ad_count, 13);
        assert!(summary.anomaly_count >= 1);
        assert!(!summary.insufficient_data);
        assert_eq!(summary.diagnosed, summary.anomaly_count);
        assert!(summary.baseline.contains_key("roas"));

        let (recommendations, rec_summary) = service.recommend(session_id, false).await.unwrap();
        assert_eq!(recommendations.len(), 13);
        let dead = recommendations.iter().find(|r| r.ad_id == "ad-dead").unwrap();
        assert_eq!(dead.action, Action::Pause);
        assert!(rec_summary.total_potential_savings > 0.0);

        let (results, exec_summary) = service
            .execute(session_id, Some(vec!["ad-dead".to_string()]), true)
            .await
            .unwrap();
        assert_eq!(exec_summary.success, 1);
        assert_eq!(exec_summary.skipped, results.len() - 1);
        assert!(exec_summary.dry_run);
    }

    #[tokio::test]
    async fn test_analyze_is_deterministic_without_model() {
        let first = {
            let service = service(seeded_store());
            let (id, _) = service.analyze("tl", 10, None).await.unwrap();
            let handle = service.sessions().get(id).await.unwrap();
            let session = handle.read().await;
            serde_json::to_string(&session.anomalies).unwrap()
        };
        let second = {
            let service = service(seeded_store());
            let (id, _) = service.analyze("tl", 10, None).await.unwrap();
            let handle = service.sessions().get(id).await.unwrap();
            let session = handle.read().await;
            serde_json::to_string(&session.anomalies).unwrap()
        };
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_insufficient_account_flags_and_empties() {
        // six ads: below the ten-ad sample guard on every metric
        let mut rows = Vec::new();
        for ad in 0..6 {
            for d in 1..=10 {
                rows.push(row(&format!("ad-{ad}"), day(d), 500.0, 3.0 + ad as f64));
            }
        }
        let store = FixtureStore::new(registry()).with_now(day(10)).load_rows("tl", rows);
        let service = service(store);

        let (session_id, summary) = service.analyze("tl", 10, None).await.unwrap();
        assert!(summary.insufficient_data);
        assert_eq!(summary.anomaly_count, 0);

        let handle = service.sessions().get(session_id).await.unwrap();
        assert!(handle.read().await.anomalies.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_input_surfaces() {
        let service = service(seeded_store());
        assert!(matches!(
            service.analyze("zz", 10, None).await.unwrap_err(),
            Error::UnknownTenant(_)
        ));
        assert!(matches!(
            service.analyze("tl", 0, None).await.unwrap_err(),
            Error::WindowOutOfRange { .. }
        ));
    }

    #[tokio::test]
    async fn test_expired_session_rejected_on_recommend() {
        let service = service(seeded_store());
        let bogus = uuid::Uuid::new_v4();
        assert!(matches!(
            service.recommend(bogus, false).await.unwrap_err(),
            Error::SessionExpired(_)
        ));
    }

    #[tokio::test]
    async fn test_release_then_execute_fails() {
        let service = service(seeded_store());
        let (session_id, _) = service.analyze("tl", 10, None).await.unwrap();
        service.recommend(session_id, false).await.unwrap();

        assert!(service.release(session_id));
        assert!(matches!(
            service.execute(session_id, None, true).await.unwrap_err(),
            Error::SessionExpired(_)
        ));
    }
}
