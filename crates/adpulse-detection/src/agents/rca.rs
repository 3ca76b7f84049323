//! Root-cause analysis orchestration.
//!
//! Per anomaly: build a grounded context, let the model pick probes from
//! the fixed catalog one at a time, execute each probe, and feed its
//! evidence back. The loop is a bounded iteration - a hard step cap and a
//! deadline both terminate it; the model is never trusted to unbound the
//! call count. The final verdict comes from a deterministic resolver over
//! the accumulated evidence, keeping the ontology closed and the outcome
//! explainable.
//!
//! A misbehaving model (error, timeout, duplicate probe request) gets the
//! violation back as feedback and another chance, up to the configured
//! retry cap. On the failure after the last retry the diagnosis degrades:
//! verdict UNKNOWN at LOW confidence, with the violations standing as the
//! rationale.
//!
//! Across anomalies, diagnoses run in parallel up to the configured cap;
//! within one anomaly, probes are serialized by the protocol.

use crate::agents::model::{probe_preferences, ModelClient, ModelTurn, RcaContext};
use crate::agents::validator::GroundedValidator;
use crate::probes::{self, ProbeRequest};
use adpulse_core::config::{ProbeConfig, RcaConfig, ValidatorConfig};
use adpulse_core::types::{
    Anomaly, Confidence, Evidence, Metric, ProbeKind, RootCause, RootCauseVerdict, Severity,
};
use adpulse_warehouse::MetricStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Drives model-selected probes to a deterministic verdict per anomaly
pub struct RcaOrchestrator {
    store: Arc<dyn MetricStore>,
    model: Arc<dyn ModelClient>,
    rca_config: RcaConfig,
    probe_config: ProbeConfig,
    retry_max: usize,
}

impl std::fmt::Debug for RcaOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcaOrchestrator")
            .field("store", &self.store.name())
            .field("model", &self.model.name())
            .field("rca_config", &self.rca_config)
            .finish()
    }
}

impl RcaOrchestrator {
    /// Create an orchestrator over the given store and model backend.
    ///
    /// `validator_config.retry_max` bounds the retry-with-feedback loop
    /// around misbehaving model turns.
    pub fn new(
        store: Arc<dyn MetricStore>,
        model: Arc<dyn ModelClient>,
        rca_config: RcaConfig,
        probe_config: ProbeConfig,
        validator_config: ValidatorConfig,
    ) -> Self {
        Self {
            store,
            model,
            rca_config,
            probe_config,
            retry_max: validator_config.retry_max,
        }
    }

    /// Diagnose every anomaly, in parallel up to the configured cap.
    ///
    /// Results come back in input order. An anomaly whose diagnosis misses
    /// its deadline is emitted with verdict UNKNOWN and a timeout violation
    /// - partial results, never a dropped anomaly.
    pub async fn diagnose_all(
        &self,
        tenant: &str,
        window_days: u32,
        anomalies: &[Anomaly],
    ) -> Vec<RootCauseVerdict> {
        let semaphore = Arc::new(Semaphore::new(self.rca_config.concurrency));
        let deadline = Duration::from_millis(self.rca_config.anomaly_timeout_ms);

        let mut join_set: JoinSet<(usize, RootCauseVerdict)> = JoinSet::new();
        for (index, anomaly) in anomalies.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let store = self.store.clone();
            let model = self.model.clone();
            let rca_config = self.rca_config.clone();
            let probe_config = self.probe_config.clone();
            let retry_max = self.retry_max;
            let tenant = tenant.to_string();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let diagnosis = diagnose_one(
                    store.as_ref(),
                    model.as_ref(),
                    &rca_config,
                    &probe_config,
                    retry_max,
                    &tenant,
                    window_days,
                    &anomaly,
                );
                let verdict = match tokio::time::timeout(deadline, diagnosis).await {
                    Ok(verdict) => verdict,
                    Err(_) => {
                        warn!(ad_id = %anomaly.ad_id, metric = %anomaly.metric, "RCA deadline exceeded");
                        ::metrics::counter!("adpulse_rca_timeouts_total").increment(1);
                        timeout_verdict(&anomaly)
                    }
                };
                (index, verdict)
            });
        }

        let mut indexed = Vec::with_capacity(anomalies.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(pair) => indexed.push(pair),
                Err(err) => warn!(error = %err, "RCA task panicked"),
            }
        }
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, verdict)| verdict).collect()
    }

    /// Diagnose a single anomaly under the per-anomaly deadline
    pub async fn diagnose(
        &self,
        tenant: &str,
        window_days: u32,
        anomaly: &Anomaly,
    ) -> RootCauseVerdict {
        let deadline = Duration::from_millis(self.rca_config.anomaly_timeout_ms);
        let diagnosis = diagnose_one(
            self.store.as_ref(),
            self.model.as_ref(),
            &self.rca_config,
            &self.probe_config,
            self.retry_max,
            tenant,
            window_days,
            anomaly,
        );
        match tokio::time::timeout(deadline, diagnosis).await {
            Ok(verdict) => verdict,
            Err(_) => timeout_verdict(anomaly),
        }
    }
}

#[instrument(skip_all, fields(ad_id = %anomaly.ad_id, metric = %anomaly.metric))]
#[allow(clippy::too_many_arguments)]
async fn diagnose_one(
    store: &dyn MetricStore,
    model: &dyn ModelClient,
    rca_config: &RcaConfig,
    probe_config: &ProbeConfig,
    retry_max: usize,
    tenant: &str,
    window_days: u32,
    anomaly: &Anomaly,
) -> RootCauseVerdict {
    let context = RcaContext {
        tenant: tenant.to_string(),
        window_days,
        anomaly: anomaly.clone(),
    };
    let catalog = probes::catalog();
    let model_deadline = Duration::from_millis(rca_config.model_call_timeout_ms);

    let mut evidence: Vec<Evidence> = Vec::new();
    let mut violations: Vec<String> = Vec::new();
    let mut steps_taken = 0usize;
    let mut failures = 0usize;
    let mut feedback: Option<String> = None;

    while steps_taken < rca_config.max_steps {
        let turn = tokio::time::timeout(
            model_deadline,
            model.next_probe(&context, &catalog, &evidence, feedback.as_deref()),
        )
        .await;

        let turn = match turn {
            Ok(Ok(turn)) => {
                feedback = None;
                turn
            }
            Ok(Err(err)) => {
                warn!(error = %err, failures, "Probe selection failed; composing retry feedback");
                if record_failure(
                    format!("model probe selection failed: {err}"),
                    &mut violations,
                    &mut failures,
                    &mut feedback,
                    retry_max,
                ) {
                    return degraded_verdict(anomaly, evidence, violations, steps_taken);
                }
                continue;
            }
            Err(_) => {
                warn!(failures, "Probe selection timed out; composing retry feedback");
                if record_failure(
                    "model probe selection timed out".to_string(),
                    &mut violations,
                    &mut failures,
                    &mut feedback,
                    retry_max,
                ) {
                    return degraded_verdict(anomaly, evidence, violations, steps_taken);
                }
                continue;
            }
        };

        let probe = match turn {
            ModelTurn::Complete => break,
            ModelTurn::Invoke { probe } => probe,
        };

        if evidence.iter().any(|e| e.probe == probe) {
            // the protocol forbids re-running a probe
            warn!(probe = %probe, failures, "Duplicate probe requested; composing retry feedback");
            if record_failure(
                format!(
                    "model requested duplicate probe {probe}; its evidence is already in the transcript"
                ),
                &mut violations,
                &mut failures,
                &mut feedback,
                retry_max,
            ) {
                return degraded_verdict(anomaly, evidence, violations, steps_taken);
            }
            continue;
        }

        steps_taken += 1;
        let request = ProbeRequest {
            kind: probe,
            tenant: tenant.to_string(),
            ad_id: anomaly.ad_id.clone(),
            window_days,
            metric: anomaly.metric,
        };

        match probes::run_probe(store, probe_config, &request).await {
            Ok(ev) => {
                debug!(probe = %probe, fired = ev.fired, "Probe evidence collected");
                evidence.push(ev);
            }
            Err(err) => {
                warn!(probe = %probe, error = %err, "Probe failed; recording inconclusive evidence");
                ::metrics::counter!("adpulse_probe_failures_total").increment(1);
                violations.push(format!("probe {probe} failed: {err}"));
                evidence.push(probes::inconclusive_for_failure(probe, &err));
            }
        }
    }

    let (cause, confidence) = resolve(anomaly, &evidence);
    info!(
        ad_id = %anomaly.ad_id,
        metric = %anomaly.metric,
        cause = %cause,
        confidence = confidence.as_str(),
        steps = steps_taken,
        "Verdict resolved"
    );

    RootCauseVerdict {
        ad_id: anomaly.ad_id.clone(),
        metric: anomaly.metric,
        cause,
        confidence,
        evidence,
        suggested_action: cause.suggested_action().to_string(),
        violations,
        steps_taken,
    }
}

/// Record one model-protocol failure, compose the feedback for the retry,
/// and report whether the retry budget is spent
fn record_failure(
    violation: String,
    violations: &mut Vec<String>,
    failures: &mut usize,
    feedback: &mut Option<String>,
    retry_max: usize,
) -> bool {
    violations.push(violation.clone());
    *failures += 1;
    if *failures > retry_max {
        return true;
    }
    *feedback = Some(GroundedValidator::feedback(&[violation]));
    false
}

/// Degradation after the final retry: UNKNOWN at LOW confidence, with the
/// accumulated violations standing as the rationale
fn degraded_verdict(
    anomaly: &Anomaly,
    evidence: Vec<Evidence>,
    violations: Vec<String>,
    steps_taken: usize,
) -> RootCauseVerdict {
    warn!(
        ad_id = %anomaly.ad_id,
        metric = %anomaly.metric,
        violations = violations.len(),
        "Model retries exhausted; degrading to UNKNOWN"
    );
    ::metrics::counter!("adpulse_rca_fallbacks_total").increment(1);
    RootCauseVerdict {
        ad_id: anomaly.ad_id.clone(),
        metric: anomaly.metric,
        cause: RootCause::Unknown,
        confidence: Confidence::Low,
        evidence,
        suggested_action: RootCause::Unknown.suggested_action().to_string(),
        violations,
        steps_taken,
    }
}

fn timeout_verdict(anomaly: &Anomaly) -> RootCauseVerdict {
    RootCauseVerdict {
        ad_id: anomaly.ad_id.clone(),
        metric: anomaly.metric,
        cause: RootCause::Unknown,
        confidence: Confidence::Low,
        evidence: Vec::new(),
        suggested_action: RootCause::Unknown.suggested_action().to_string(),
        violations: vec!["timeout: diagnosis abandoned at the per-anomaly deadline".to_string()],
        steps_taken: 0,
    }
}

/// Deterministic resolver: evidence in, (tag, confidence) out.
///
/// The first fired probe in the decision-table preference order wins; a
/// fired probe outside the preference list wins next, in evidence order.
/// With nothing fired, a zero-ROAS anomaly whose tracking evidence shows
/// clicks without conversions resolves to TRACKING - an ad that has never
/// converted can't fire the probe's historical-rate test, yet the blackout
/// explains the zero.
pub(crate) fn resolve(anomaly: &Anomaly, evidence: &[Evidence]) -> (RootCause, Confidence) {
    let preferences = probe_preferences(anomaly.metric);

    for kind in preferences {
        if evidence.iter().any(|e| e.probe == *kind && e.fired) {
            return (kind.root_cause(), confidence_from(evidence));
        }
    }
    if let Some(fired) = evidence.iter().find(|e| e.fired) {
        return (fired.probe.root_cause(), confidence_from(evidence));
    }

    if anomaly.metric == Metric::Roas && anomaly.observed == 0.0 {
        let blackout = evidence.iter().any(|e| {
            e.probe == ProbeKind::Tracking
                && !e.inconclusive
                && e.measurements.get("clicks_48h").copied().unwrap_or(0.0) > 0.0
                && e.measurements.get("conversions_48h").copied().unwrap_or(f64::NAN) == 0.0
        });
        if blackout {
            return (RootCause::Tracking, Confidence::High);
        }
    }

    (RootCause::Unknown, Confidence::Low)
}

/// HIGH when a fired probe measured extreme, MEDIUM at significant,
/// LOW otherwise
fn confidence_from(evidence: &[Evidence]) -> Confidence {
    let strongest = evidence
        .iter()
        .filter(|e| e.fired)
        .filter_map(|e| e.severity)
        .max();
    match strongest {
        Some(Severity::Extreme) => Confidence::High,
        Some(Severity::Significant) => Confidence::Medium,
        _ => Confidence::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::model::DecisionTableModel;
    use crate::probes::ProbeSpec;
    use adpulse_core::types::{Direction, Polarity, Provider, SourceCategory};
    use adpulse_core::{Error, Result};
    use adpulse_warehouse::prelude::{FixtureStore, RawAdRow};
    use adpulse_warehouse::TenantRegistry;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn anomaly(metric: Metric, observed: f64) -> Anomaly {
        Anomaly {
            ad_id: "ad-1".to_string(),
            ad_name: "ad-1 name".to_string(),
            provider: Provider::Meta,
            metric,
            observed,
            baseline_mean: 6.88,
            baseline_stddev: 2.0,
            z_score: -2.1,
            direction: Direction::Low,
            severity: Severity::Significant,
            polarity: Polarity::Bad,
            pct_change: -70.0,
            spend: 20_000.0,
        }
    }

    fn evidence(probe: ProbeKind, fired: bool, severity: Option<Severity>) -> Evidence {
        Evidence {
            probe,
            fired,
            inconclusive: false,
            measurements: HashMap::new(),
            interpretation: String::new(),
            window_start: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            window_end: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            severity,
        }
    }

    #[test]
    fn test_cpm_spike_verdict_with_high_confidence() {
        // fired CPM probe at +52% (extreme), fatigue quiet: CPM_SPIKE / HIGH
        let anomaly = anomaly(Metric::Roas, 2.0);
        let transcript = vec![
            evidence(ProbeKind::CpmSpike, true, Some(Severity::Extreme)),
            evidence(ProbeKind::CreativeFatigue, false, None),
        ];
        let (cause, confidence) = resolve(&anomaly, &transcript);
        assert_eq!(cause, RootCause::CpmSpike);
        assert_eq!(confidence, Confidence::High);
    }

    #[test]
    fn test_preference_order_breaks_ties() {
        // both fatigue and landing page fired; for a ROAS drop the
        // preference order puts fatigue first
        let anomaly = anomaly(Metric::Roas, 2.0);
        let transcript = vec![
            evidence(ProbeKind::LandingPage, true, Some(Severity::Significant)),
            evidence(ProbeKind::CreativeFatigue, true, Some(Severity::Significant)),
        ];
        let (cause, confidence) = resolve(&anomaly, &transcript);
        assert_eq!(cause, RootCause::CreativeFatigue);
        assert_eq!(confidence, Confidence::Medium);
    }

    #[test]
    fn test_seasonal_match_is_legitimate_null() {
        let anomaly = anomaly(Metric::Cpm, 18.0);
        let transcript = vec![
            evidence(ProbeKind::CpmSpike, false, None),
            evidence(ProbeKind::Seasonality, true, Some(Severity::Significant)),
        ];
        let (cause, _) = resolve(&anomaly, &transcript);
        assert_eq!(cause, RootCause::Seasonality);
    }

    #[test]
    fn test_nothing_fired_is_unknown_low() {
        let anomaly = anomaly(Metric::Roas, 2.0);
        let transcript = vec![
            evidence(ProbeKind::CpmSpike, false, None),
            evidence(ProbeKind::CreativeFatigue, false, None),
        ];
        let (cause, confidence) = resolve(&anomaly, &transcript);
        assert_eq!(cause, RootCause::Unknown);
        assert_eq!(confidence, Confidence::Low);
    }

    #[test]
    fn test_zero_roas_conversion_blackout_resolves_tracking() {
        // tracking probe could not fire (no historical conversions) but its
        // evidence shows clicks with zero conversions on a zero-ROAS anomaly
        let anomaly = anomaly(Metric::Roas, 0.0);
        let mut tracking = evidence(ProbeKind::Tracking, false, None);
        tracking.measurements.insert("clicks_48h".to_string(), 380.0);
        tracking.measurements.insert("conversions_48h".to_string(), 0.0);
        tracking.measurements.insert("historical_cvr".to_string(), 0.0);

        let (cause, confidence) = resolve(&anomaly, &[tracking]);
        assert_eq!(cause, RootCause::Tracking);
        assert_eq!(confidence, Confidence::High);
    }

    // ------------------------------------------------------------------
    // end-to-end orchestration over the fixture store
    // ------------------------------------------------------------------

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, n).unwrap()
    }

    fn row(date: NaiveDate, cpm: f64) -> RawAdRow {
        RawAdRow {
            ad_id: "ad-1".to_string(),
            ad_name: "ad-1 name".to_string(),
            provider: Provider::Meta,
            store: "us".to_string(),
            campaign_status: "ACTIVE".to_string(),
            category: SourceCategory::AdPlatform,
            date,
            spend: "1000".to_string(),
            roas: "2.0".to_string(),
            impressions: "10000".to_string(),
            clicks: "200".to_string(),
            cpm: Some(cpm.to_string()),
            cpa: None,
            conversions: Some("10".to_string()),
            daily_budget: None,
        }
    }

    fn orchestrator(store: FixtureStore) -> RcaOrchestrator {
        RcaOrchestrator::new(
            Arc::new(store),
            Arc::new(DecisionTableModel::new()),
            RcaConfig::default(),
            ProbeConfig::default(),
            ValidatorConfig::default(),
        )
    }

    fn registry() -> TenantRegistry {
        TenantRegistry::new(HashMap::from([(
            "tl".to_string(),
            "warehouse.tl_daily".to_string(),
        )]))
    }

    fn spiky_cpm_store() -> FixtureStore {
        let cpms = [12.2, 12.2, 12.2, 12.2, 12.2, 12.2, 12.2, 18.5, 18.5, 18.5];
        let rows = cpms
            .iter()
            .enumerate()
            .map(|(i, cpm)| row(day(1 + i as u32), *cpm))
            .collect();
        FixtureStore::new(registry())
            .with_now(day(10))
            .load_rows("tl", rows)
    }

    /// Model that fails its first `failures` turns, then delegates to the
    /// decision table; records whether retries carried feedback
    struct FlakyModel {
        failures: usize,
        calls: AtomicUsize,
        feedback_seen: AtomicUsize,
    }

    impl FlakyModel {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
                feedback_seen: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ModelClient for FlakyModel {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn next_probe(
            &self,
            context: &RcaContext,
            catalog: &[ProbeSpec],
            transcript: &[Evidence],
            feedback: Option<&str>,
        ) -> Result<ModelTurn> {
            if feedback.is_some() {
                self.feedback_seen.fetch_add(1, Ordering::SeqCst);
            }
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(Error::model("probe name not in the catalog"));
            }
            DecisionTableModel::new()
                .next_probe(context, catalog, transcript, feedback)
                .await
        }

        async fn draft_recommendation(
            &self,
            facts: &crate::agents::model::RecommendationFacts,
            feedback: Option<&str>,
        ) -> Result<crate::agents::model::RecommendationDraft> {
            DecisionTableModel::new()
                .draft_recommendation(facts, feedback)
                .await
        }
    }

    #[tokio::test]
    async fn test_orchestrated_cpm_spike_diagnosis() {
        // flat CPM then a 3-day surge: the cpm_spike probe fires first in
        // the ROAS-drop preference order and the loop stops there
        let orchestrator = orchestrator(spiky_cpm_store());
        let anomaly = anomaly(Metric::Roas, 2.0);
        let verdict = orchestrator.diagnose("tl", 10, &anomaly).await;

        assert_eq!(verdict.cause, RootCause::CpmSpike);
        assert_eq!(verdict.confidence, Confidence::High);
        assert_eq!(verdict.suggested_action, "adjust bids or targeting");
        assert_eq!(verdict.steps_taken, 1);
        assert!(verdict.evidence[0].fired);
    }

    #[tokio::test]
    async fn test_step_cap_bounds_the_loop() {
        // no data at all: every probe is inconclusive, loop walks the
        // preference list and stops at its end, under the cap
        let store = FixtureStore::new(registry()).with_now(day(10));

        let orchestrator = orchestrator(store);
        let anomaly = anomaly(Metric::Roas, 2.0);
        let verdict = orchestrator.diagnose("tl", 10, &anomaly).await;

        assert!(verdict.steps_taken <= RcaConfig::default().max_steps);
        assert_eq!(verdict.cause, RootCause::Unknown);
        assert_eq!(verdict.confidence, Confidence::Low);
    }

    #[tokio::test]
    async fn test_diagnose_all_preserves_input_order() {
        let store = FixtureStore::new(registry()).with_now(day(10));
        let orchestrator = orchestrator(store);

        let mut first = anomaly(Metric::Roas, 2.0);
        first.ad_id = "ad-a".to_string();
        let mut second = anomaly(Metric::Cpm, 18.0);
        second.ad_id = "ad-b".to_string();
        second.direction = Direction::High;

        let verdicts = orchestrator
            .diagnose_all("tl", 10, &[first, second])
            .await;
        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts[0].ad_id, "ad-a");
        assert_eq!(verdicts[1].ad_id, "ad-b");
    }

    #[tokio::test]
    async fn test_model_retry_with_feedback_recovers() {
        // one bad turn: the orchestrator feeds the violation back and the
        // model's second answer drives a normal diagnosis
        let model = Arc::new(FlakyModel::new(1));
        let orchestrator = RcaOrchestrator::new(
            Arc::new(spiky_cpm_store()),
            model.clone(),
            RcaConfig::default(),
            ProbeConfig::default(),
            ValidatorConfig::default(),
        );

        let verdict = orchestrator
            .diagnose("tl", 10, &anomaly(Metric::Roas, 2.0))
            .await;

        assert_eq!(verdict.cause, RootCause::CpmSpike);
        assert_eq!(verdict.violations.len(), 1);
        assert!(verdict.violations[0].contains("probe selection failed"));
        assert_eq!(model.feedback_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_degrades_to_unknown_low() {
        // the model never produces a usable turn: after the initial call
        // plus retry_max retries the diagnosis degrades to UNKNOWN / LOW,
        // even though the store holds a firable CPM spike
        let retry_max = ValidatorConfig::default().retry_max;
        let model = Arc::new(FlakyModel::new(usize::MAX));
        let orchestrator = RcaOrchestrator::new(
            Arc::new(spiky_cpm_store()),
            model.clone(),
            RcaConfig::default(),
            ProbeConfig::default(),
            ValidatorConfig::default(),
        );

        let verdict = orchestrator
            .diagnose("tl", 10, &anomaly(Metric::Roas, 2.0))
            .await;

        assert_eq!(verdict.cause, RootCause::Unknown);
        assert_eq!(verdict.confidence, Confidence::Low);
        assert_eq!(verdict.violations.len(), retry_max + 1);
        assert_eq!(verdict.steps_taken, 0);
        assert!(verdict.evidence.is_empty());
        assert_eq!(model.feedback_seen.load(Ordering::SeqCst), retry_max);
    }
}
