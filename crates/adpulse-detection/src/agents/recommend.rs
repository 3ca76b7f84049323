//! Recommendation generation.
//!
//! Converts classified ads into budget actions with dollar-impact
//! estimates. The guideline table is the source of truth; a diagnosed root
//! cause may override it in sanctioned ways (a fatigued creative turns a
//! hold into a refresh). With model reasoning enabled, drafts go through
//! the grounded validator with retry-and-feedback; after the retry cap the
//! deterministic table classification is substituted with the violations
//! attached.

use crate::agents::model::{ModelClient, RecommendationDraft, RecommendationFacts};
use crate::agents::validator::{GroundedValidator, QUALIFY_DAYS, QUALIFY_SPEND};
use adpulse_core::types::{
    AccountBaseline, Action, AdSummary, Anomaly, Confidence, Metric, Priority, Recommendation,
    RootCause, RootCauseVerdict,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Spend gate for the PAUSE row of the guideline table
const PAUSE_SPEND: f64 = 5_000.0;
/// Spend gate for the REDUCE rows of the guideline table
const REDUCE_SPEND: f64 = 10_000.0;

/// Deterministic outcome of the guideline table for one ad
#[derive(Debug, Clone)]
pub(crate) struct TableDecision {
    pub(crate) action: Action,
    pub(crate) change_pct: f64,
    pub(crate) confidence: Confidence,
    pub(crate) priority: Priority,
    pub(crate) rationale: String,
}

/// Classification guideline table, keyed on ROAS vs the account mean,
/// window spend, and days active.
pub(crate) fn table_classification(facts: &RecommendationFacts) -> TableDecision {
    let ratio = if facts.account_mean_roas > 0.0 {
        facts.roas / facts.account_mean_roas
    } else if facts.roas > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    if facts.spend < QUALIFY_SPEND || facts.days_active < QUALIFY_DAYS {
        return TableDecision {
            action: Action::Wait,
            change_pct: 0.0,
            confidence: Confidence::Medium,
            priority: Priority::Low,
            rationale: format!(
                "Only ${:.0} spent over {} active days; too little history to act on",
                facts.spend, facts.days_active
            ),
        };
    }

    if facts.roas == 0.0 && facts.spend >= PAUSE_SPEND {
        return TableDecision {
            action: Action::Pause,
            change_pct: -100.0,
            confidence: Confidence::High,
            priority: Priority::Critical,
            rationale: format!(
                "ROAS 0.00 with ${:.0} spent over {} days; every further dollar is waste",
                facts.spend, facts.days_active
            ),
        };
    }

    if ratio >= 2.0 {
        // +30% at 2x the account mean, growing 15 points per extra multiple
        let raw = 30.0 + (ratio - 2.0) * 15.0;
        let change_pct = (raw.clamp(30.0, 100.0) / 5.0).round() * 5.0;
        return TableDecision {
            action: Action::Scale,
            change_pct,
            confidence: if ratio >= 3.0 {
                Confidence::High
            } else {
                Confidence::Medium
            },
            priority: if ratio >= 5.0 {
                Priority::High
            } else {
                Priority::Medium
            },
            rationale: format!(
                "ROAS {:.2} is {:.1}x the account mean {:.2} on ${:.0} spend; proven winner with headroom",
                facts.roas, ratio, facts.account_mean_roas, facts.spend
            ),
        };
    }

    if ratio < 1.0 && facts.spend >= REDUCE_SPEND {
        let change_pct = if ratio < 0.5 {
            -50.0
        } else {
            // -20% just under the mean, deepening toward -50% at half of it
            let raw = -(20.0 + (1.0 - ratio) * 60.0);
            (raw.clamp(-50.0, -20.0) / 5.0).round() * 5.0
        };
        return TableDecision {
            action: Action::Reduce,
            change_pct,
            confidence: if ratio < 0.5 {
                Confidence::High
            } else {
                Confidence::Medium
            },
            priority: if change_pct <= -50.0 {
                Priority::High
            } else {
                Priority::Medium
            },
            rationale: format!(
                "ROAS {:.2} sits at {:.1}x the account mean {:.2} with ${:.0} committed; cut the burn",
                facts.roas, ratio, facts.account_mean_roas, facts.spend
            ),
        };
    }

    // [1.0, 2.0)x at healthy spend, and the under-mean mid-spend gap,
    // both hold steady
    TableDecision {
        action: Action::Monitor,
        change_pct: 0.0,
        confidence: if ratio >= 1.0 {
            Confidence::Medium
        } else {
            Confidence::Low
        },
        priority: Priority::Low,
        rationale: format!(
            "ROAS {:.2} vs account mean {:.2} on ${:.0} spend; no change warranted yet",
            facts.roas, facts.account_mean_roas, facts.spend
        ),
    }
}

/// Sanctioned verdict override for the deterministic path
fn apply_verdict_override(decision: TableDecision, cause: Option<RootCause>) -> TableDecision {
    match (cause, decision.action) {
        (Some(RootCause::CreativeFatigue), Action::Monitor) => TableDecision {
            action: Action::RefreshCreative,
            change_pct: 0.0,
            priority: Priority::Medium,
            rationale: format!(
                "{}; diagnosed CREATIVE_FATIGUE, so rotate new variants instead of holding",
                decision.rationale
            ),
            ..decision
        },
        (Some(RootCause::Seasonality), Action::Reduce) => TableDecision {
            action: Action::Monitor,
            change_pct: 0.0,
            priority: Priority::Low,
            rationale: format!(
                "{}; diagnosed SEASONALITY, the dip matches historical pattern, hold budget",
                decision.rationale
            ),
            ..decision
        },
        _ => decision,
    }
}

/// Totals attached to a batch of recommendations
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RecommendationSummary {
    /// Recommendations emitted
    pub total: usize,
    /// Count per action name
    pub by_action: HashMap<String, usize>,
    /// Count per priority name
    pub by_priority: HashMap<String, usize>,
    /// Spend freed by REDUCE/PAUSE actions
    pub total_potential_savings: f64,
    /// Revenue delta promised by SCALE actions
    pub total_potential_revenue: f64,
    /// Savings plus revenue
    pub net_impact: f64,
}

/// Generates one recommendation per ad, grounded in source metrics
pub struct RecommendationGenerator {
    model: Arc<dyn ModelClient>,
    validator: GroundedValidator,
}

impl std::fmt::Debug for RecommendationGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecommendationGenerator")
            .field("model", &self.model.name())
            .finish()
    }
}

impl RecommendationGenerator {
    /// Create a generator over the given model backend and validator
    pub fn new(model: Arc<dyn ModelClient>, validator: GroundedValidator) -> Self {
        Self { model, validator }
    }

    /// Generate recommendations for every summarized ad.
    ///
    /// `use_model` routes drafting through the model + validator; otherwise
    /// the guideline table classifies directly (the reproducible path).
    pub async fn generate(
        &self,
        summaries: &[AdSummary],
        baseline: &AccountBaseline,
        anomalies: &[Anomaly],
        verdicts: &[RootCauseVerdict],
        use_model: bool,
    ) -> (Vec<Recommendation>, RecommendationSummary) {
        let account_mean_roas = baseline.get(Metric::Roas).map(|b| b.mean).unwrap_or(0.0);

        let mut recommendations = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let facts = self.facts_for(summary, account_mean_roas, anomalies, verdicts);
            let recommendation = if use_model {
                self.generate_with_model(&facts).await
            } else {
                self.generate_deterministic(&facts)
            };
            recommendations.push(recommendation);
        }

        recommendations.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| {
                    b.expected_revenue_change
                        .abs()
                        .partial_cmp(&a.expected_revenue_change.abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.ad_id.cmp(&b.ad_id))
        });

        let summary = summarize(&recommendations);
        info!(
            total = summary.total,
            savings = summary.total_potential_savings,
            revenue = summary.total_potential_revenue,
            "Recommendations generated"
        );
        ::metrics::counter!("adpulse_recommendations_total").increment(summary.total as u64);
        (recommendations, summary)
    }

    fn facts_for(
        &self,
        summary: &AdSummary,
        account_mean_roas: f64,
        anomalies: &[Anomaly],
        verdicts: &[RootCauseVerdict],
    ) -> RecommendationFacts {
        // strongest anomaly for the ad carries the cited z-score
        let z_score = anomalies
            .iter()
            .filter(|a| a.ad_id == summary.ad_id)
            .map(|a| a.z_score)
            .max_by(|a, b| {
                a.abs()
                    .partial_cmp(&b.abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        let root_cause = verdicts
            .iter()
            .find(|v| v.ad_id == summary.ad_id && v.cause != RootCause::Unknown)
            .map(|v| v.cause);

        RecommendationFacts {
            ad_id: summary.ad_id.clone(),
            ad_name: summary.ad_name.clone(),
            provider: summary.provider,
            spend: summary.spend,
            roas: summary.roas,
            days_active: summary.days_active,
            account_mean_roas,
            z_score,
            root_cause,
        }
    }

    fn generate_deterministic(&self, facts: &RecommendationFacts) -> Recommendation {
        let decision = apply_verdict_override(table_classification(facts), facts.root_cause);
        build_recommendation(facts, &decision, Vec::new())
    }

    async fn generate_with_model(&self, facts: &RecommendationFacts) -> Recommendation {
        let mut feedback: Option<String> = None;
        let mut last_violations = Vec::new();

        for attempt in 0..=self.validator.retry_max() {
            let draft = match self.model.draft_recommendation(facts, feedback.as_deref()).await {
                Ok(draft) => draft,
                Err(err) => {
                    warn!(ad_id = %facts.ad_id, attempt, error = %err, "Model draft failed");
                    last_violations.push(format!("model call failed: {err}"));
                    break;
                }
            };

            let violations = self.validator.validate(&draft, facts);
            if violations.is_empty() {
                debug!(ad_id = %facts.ad_id, attempt, "Draft accepted");
                return accept_draft(facts, &draft);
            }

            warn!(
                ad_id = %facts.ad_id,
                attempt,
                violations = violations.len(),
                "Draft failed grounding, retrying with feedback"
            );
            ::metrics::counter!("adpulse_validator_retries_total").increment(1);
            feedback = Some(GroundedValidator::feedback(&violations));
            last_violations = violations;
        }

        // degrade: deterministic classification carrying the violations
        ::metrics::counter!("adpulse_validator_fallbacks_total").increment(1);
        let decision = apply_verdict_override(table_classification(facts), facts.root_cause);
        build_recommendation(facts, &decision, last_violations)
    }
}

/// Convert a validated draft into the final recommendation.
///
/// Safe to parse the closed-set strings here: enumeration membership was
/// checked by the validator before acceptance.
fn accept_draft(facts: &RecommendationFacts, draft: &RecommendationDraft) -> Recommendation {
    let action = draft
        .action
        .as_deref()
        .and_then(parse_action)
        .unwrap_or(Action::Monitor);
    let confidence = match draft.confidence.as_deref() {
        Some("HIGH") => Confidence::High,
        Some("LOW") => Confidence::Low,
        _ => Confidence::Medium,
    };
    let change_pct = draft.proposed_change_pct.unwrap_or(0.0);
    let proposed_new_spend = draft
        .proposed_new_spend
        .unwrap_or(facts.spend * (1.0 + change_pct / 100.0));
    let expected = draft
        .expected_revenue_change
        .unwrap_or(((proposed_new_spend - facts.spend) * facts.roas).round());

    Recommendation {
        ad_id: facts.ad_id.clone(),
        ad_name: facts.ad_name.clone(),
        provider: facts.provider,
        action,
        priority: priority_for(action, change_pct, facts),
        current_spend: facts.spend,
        proposed_change_pct: change_pct,
        proposed_new_spend,
        expected_revenue_change: expected,
        observed_roas: facts.roas,
        confidence,
        rationale: draft.rationale.clone().unwrap_or_default(),
        root_cause: facts.root_cause,
        violations: Vec::new(),
    }
}

fn build_recommendation(
    facts: &RecommendationFacts,
    decision: &TableDecision,
    violations: Vec<String>,
) -> Recommendation {
    let proposed_new_spend = facts.spend * (1.0 + decision.change_pct / 100.0);
    let expected_revenue_change = ((proposed_new_spend - facts.spend) * facts.roas).round();

    Recommendation {
        ad_id: facts.ad_id.clone(),
        ad_name: facts.ad_name.clone(),
        provider: facts.provider,
        action: decision.action,
        priority: decision.priority,
        current_spend: facts.spend,
        proposed_change_pct: decision.change_pct,
        proposed_new_spend,
        expected_revenue_change,
        observed_roas: facts.roas,
        confidence: decision.confidence,
        rationale: decision.rationale.clone(),
        root_cause: facts.root_cause,
        violations,
    }
}

fn parse_action(raw: &str) -> Option<Action> {
    match raw {
        "SCALE" => Some(Action::Scale),
        "REDUCE" => Some(Action::Reduce),
        "PAUSE" => Some(Action::Pause),
        "REFRESH_CREATIVE" => Some(Action::RefreshCreative),
        "MONITOR" => Some(Action::Monitor),
        "WAIT" => Some(Action::Wait),
        _ => None,
    }
}

fn priority_for(action: Action, change_pct: f64, facts: &RecommendationFacts) -> Priority {
    let ratio = if facts.account_mean_roas > 0.0 {
        facts.roas / facts.account_mean_roas
    } else {
        0.0
    };
    match action {
        Action::Pause => Priority::Critical,
        Action::Reduce if change_pct <= -50.0 => Priority::High,
        Action::Reduce => Priority::Medium,
        Action::Scale if ratio >= 5.0 => Priority::High,
        Action::Scale => Priority::Medium,
        Action::RefreshCreative => Priority::Medium,
        Action::Monitor | Action::Wait => Priority::Low,
    }
}

fn summarize(recommendations: &[Recommendation]) -> RecommendationSummary {
    let mut by_action: HashMap<String, usize> = HashMap::new();
    let mut by_priority: HashMap<String, usize> = HashMap::new();
    let mut savings = 0.0;
    let mut revenue = 0.0;

    for rec in recommendations {
        *by_action.entry(rec.action.as_str().to_string()).or_default() += 1;
        let priority = format!("{:?}", rec.priority).to_lowercase();
        *by_priority.entry(priority).or_default() += 1;

        match rec.action {
            Action::Reduce | Action::Pause => {
                savings += rec.current_spend - rec.proposed_new_spend;
            }
            Action::Scale => {
                revenue += rec.expected_revenue_change;
            }
            _ => {}
        }
    }

    RecommendationSummary {
        total: recommendations.len(),
        by_action,
        by_priority,
        total_potential_savings: (savings * 100.0).round() / 100.0,
        total_potential_revenue: (revenue * 100.0).round() / 100.0,
        net_impact: ((savings + revenue) * 100.0).round() / 100.0,
    }
}
