//! Grounded output validation.
//!
//! Stateless, deterministic checks that a model-drafted recommendation
//! never contradicts the warehouse:
//!
//! 1. schema completeness - required fields present
//! 2. enumeration membership - action/confidence within the closed sets
//! 3. numeric grounding - cited figures match source facts within tolerance
//! 4. chain completeness - reasoning carries every required step, and the
//!    qualification flags are arithmetically true
//! 5. arithmetic consistency - derived quantities recompute from their
//!    cited inputs
//!
//! Violations come back all at once so the retry feedback can name each
//! one. Classification judgment itself is not second-guessed here beyond
//! the guideline table and its sanctioned verdict overrides.

use crate::agents::model::{RecommendationDraft, RecommendationFacts};
use crate::agents::recommend::table_classification;
use adpulse_core::config::ValidatorConfig;
use adpulse_core::types::{Action, Confidence, RootCause};

/// Spend gate in the guideline table (dollars over the window)
pub(crate) const QUALIFY_SPEND: f64 = 1000.0;
/// Age gate in the guideline table (distinct active days)
pub(crate) const QUALIFY_DAYS: u32 = 7;

const VALID_ACTIONS: [Action; 6] = [
    Action::Scale,
    Action::Reduce,
    Action::Pause,
    Action::RefreshCreative,
    Action::Monitor,
    Action::Wait,
];

const VALID_CONFIDENCE: [Confidence; 3] = [Confidence::High, Confidence::Medium, Confidence::Low];

/// Stateless grounded-output validator
#[derive(Debug, Clone)]
pub struct GroundedValidator {
    config: ValidatorConfig,
}

impl GroundedValidator {
    /// Create a validator with the given tolerances
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Retry cap before the deterministic fallback takes over
    pub fn retry_max(&self) -> usize {
        self.config.retry_max
    }

    /// Check a draft against its source facts. Empty result means valid.
    pub fn validate(&self, draft: &RecommendationDraft, facts: &RecommendationFacts) -> Vec<String> {
        let mut violations = Vec::new();

        self.check_completeness(draft, &mut violations);
        let action = self.check_enums(draft, &mut violations);
        self.check_grounding(draft, facts, &mut violations);
        self.check_chain(draft, facts, action, &mut violations);
        self.check_arithmetic(draft, facts, &mut violations);
        if let Some(action) = action {
            self.check_table_conformance(draft, facts, action, &mut violations);
        }

        violations
    }

    /// Compose the feedback message for a retry
    pub fn feedback(violations: &[String]) -> String {
        format!(
            "Validation failed; correct every issue and respond again. Issues: {}",
            violations.join("; ")
        )
    }

    fn check_completeness(&self, draft: &RecommendationDraft, violations: &mut Vec<String>) {
        let required: [(&str, bool); 7] = [
            ("ad_id", draft.ad_id.is_some()),
            ("action", draft.action.is_some()),
            ("confidence", draft.confidence.is_some()),
            ("cited_spend", draft.cited_spend.is_some()),
            ("cited_roas", draft.cited_roas.is_some()),
            ("rationale", draft.rationale.is_some()),
            ("chain", draft.chain.is_some()),
        ];
        for (field, present) in required {
            if !present {
                violations.push(format!("missing field: {field}"));
            }
        }
    }

    fn check_enums(&self, draft: &RecommendationDraft, violations: &mut Vec<String>) -> Option<Action> {
        let mut action = None;
        if let Some(raw) = &draft.action {
            match VALID_ACTIONS.iter().find(|a| a.as_str() == raw) {
                Some(found) => action = Some(*found),
                None => violations.push(format!(
                    "invalid action {raw:?}; must be one of SCALE, REDUCE, PAUSE, REFRESH_CREATIVE, MONITOR, WAIT"
                )),
            }
        }
        if let Some(raw) = &draft.confidence {
            if !VALID_CONFIDENCE.iter().any(|c| c.as_str() == raw) {
                violations.push(format!(
                    "invalid confidence {raw:?}; must be one of HIGH, MEDIUM, LOW"
                ));
            }
        }
        action
    }

    fn check_grounding(
        &self,
        draft: &RecommendationDraft,
        facts: &RecommendationFacts,
        violations: &mut Vec<String>,
    ) {
        if let Some(id) = &draft.ad_id {
            if *id != facts.ad_id {
                violations.push(format!(
                    "ad_id mismatch: cited {id:?}, source {:?}",
                    facts.ad_id
                ));
            }
        }
        if let Some(cited) = draft.cited_spend {
            if (cited - facts.spend).abs() > self.config.spend_tolerance_abs {
                violations.push(format!(
                    "spend mismatch: cited {cited}, source {}",
                    facts.spend
                ));
            }
        }
        if let Some(cited) = draft.cited_roas {
            if !within_relative(cited, facts.roas, self.config.ratio_tolerance_rel) {
                violations.push(format!(
                    "roas mismatch: cited {cited}, source {}",
                    facts.roas
                ));
            }
        }
        match (draft.cited_z, facts.z_score) {
            (Some(cited), Some(source)) => {
                if (cited - source).abs() > self.config.z_tolerance_abs {
                    violations.push(format!("z-score mismatch: cited {cited}, source {source}"));
                }
            }
            (Some(cited), None) => {
                violations.push(format!("z-score {cited} cited but no anomaly exists"));
            }
            _ => {}
        }
    }

    fn check_chain(
        &self,
        draft: &RecommendationDraft,
        facts: &RecommendationFacts,
        action: Option<Action>,
        violations: &mut Vec<String>,
    ) {
        let Some(chain) = &draft.chain else { return };

        if chain.comparison.is_none() {
            violations.push("missing chain step: comparison".to_string());
        }
        if chain.classification.is_none() {
            violations.push("missing chain step: classification".to_string());
        }
        if chain.confidence_rationale.is_none() {
            violations.push("missing chain step: confidence_rationale".to_string());
        }

        match &chain.data {
            None => violations.push("missing chain step: data".to_string()),
            Some(data) => {
                if let Some(spend) = data.spend {
                    if (spend - facts.spend).abs() > self.config.spend_tolerance_abs {
                        violations.push(format!(
                            "chain data.spend={spend} does not match source spend={}",
                            facts.spend
                        ));
                    }
                }
                if let Some(roas) = data.roas {
                    if !within_relative(roas, facts.roas, self.config.ratio_tolerance_rel) {
                        violations.push(format!(
                            "chain data.roas={roas} does not match source roas={}",
                            facts.roas
                        ));
                    }
                }
                if let Some(days) = data.days {
                    if days != facts.days_active {
                        violations.push(format!(
                            "chain data.days={days} does not match source days_active={}",
                            facts.days_active
                        ));
                    }
                }
            }
        }

        match &chain.qualification {
            None => violations.push("missing chain step: qualification".to_string()),
            Some(qualification) => {
                let actual_spend_ok = facts.spend >= QUALIFY_SPEND;
                let actual_days_ok = facts.days_active >= QUALIFY_DAYS;
                if let Some(flag) = qualification.spend_ok {
                    if flag != actual_spend_ok {
                        violations.push(format!(
                            "qualification.spend_ok={flag} but spend={} against the ${QUALIFY_SPEND} gate",
                            facts.spend
                        ));
                    }
                }
                if let Some(flag) = qualification.days_ok {
                    if flag != actual_days_ok {
                        violations.push(format!(
                            "qualification.days_ok={flag} but days_active={} against the {QUALIFY_DAYS}-day gate",
                            facts.days_active
                        ));
                    }
                }
            }
        }

        if let (Some(stated), Some(action)) = (&chain.classification, action) {
            if stated != action.as_str() {
                violations.push(format!(
                    "chain classification {stated:?} does not match action {}",
                    action.as_str()
                ));
            }
        }
    }

    fn check_arithmetic(
        &self,
        draft: &RecommendationDraft,
        facts: &RecommendationFacts,
        violations: &mut Vec<String>,
    ) {
        if let (Some(pct), Some(new_spend)) = (draft.proposed_change_pct, draft.proposed_new_spend)
        {
            let recomputed = facts.spend * (1.0 + pct / 100.0);
            if (recomputed - new_spend).abs() > self.config.spend_tolerance_abs {
                violations.push(format!(
                    "proposed_new_spend={new_spend} but spend {} changed by {pct}% is {recomputed:.2}"
                    , facts.spend
                ));
            }
        }
        if let (Some(new_spend), Some(expected)) =
            (draft.proposed_new_spend, draft.expected_revenue_change)
        {
            let recomputed = ((new_spend - facts.spend) * facts.roas).round();
            let tolerance = self
                .config
                .spend_tolerance_abs
                .max(recomputed.abs() * self.config.ratio_tolerance_rel);
            if (recomputed - expected).abs() > tolerance {
                violations.push(format!(
                    "expected_revenue_change={expected} but (new - current) x roas recomputes to {recomputed}"
                ));
            }
        }
    }

    /// The draft may deviate from the guideline table only when the
    /// diagnosed root cause argues for it and the rationale cites it.
    fn check_table_conformance(
        &self,
        draft: &RecommendationDraft,
        facts: &RecommendationFacts,
        action: Action,
        violations: &mut Vec<String>,
    ) {
        let table = table_classification(facts);
        if action == table.action {
            return;
        }
        if let Some(cause) = facts.root_cause {
            if override_permitted(cause, table.action, action) {
                let cites_cause = draft
                    .rationale
                    .as_deref()
                    .map(|r| r.to_uppercase().contains(cause.as_str()))
                    .unwrap_or(false);
                if !cites_cause {
                    violations.push(format!(
                        "action {} deviates from the guideline ({}) without citing root cause {}",
                        action.as_str(),
                        table.action.as_str(),
                        cause.as_str()
                    ));
                }
                return;
            }
        }
        violations.push(format!(
            "action {} contradicts the guideline table ({})",
            action.as_str(),
            table.action.as_str()
        ));
    }
}

/// Overrides the verdict sanctions: fatigue turns a hold into a creative
/// refresh; budget exhaustion justifies holding rather than scaling.
pub(crate) fn override_permitted(cause: RootCause, table: Action, chosen: Action) -> bool {
    match cause {
        RootCause::CreativeFatigue => {
            chosen == Action::RefreshCreative && matches!(table, Action::Monitor | Action::Reduce)
        }
        RootCause::BudgetExhaustion => chosen == Action::Monitor && table == Action::Scale,
        RootCause::Seasonality => chosen == Action::Monitor,
        _ => false,
    }
}

fn within_relative(cited: f64, source: f64, tolerance: f64) -> bool {
    if source == 0.0 {
        return cited.abs() <= tolerance;
    }
    ((cited - source) / source).abs() <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::model::DecisionTableModel;
    use crate::agents::model::ModelClient;
    use adpulse_core::types::Provider;

    fn facts() -> RecommendationFacts {
        RecommendationFacts {
            ad_id: "ad-1".to_string(),
            ad_name: "ad-1 name".to_string(),
            provider: Provider::Meta,
            spend: 88_000.0,
            roas: 0.0,
            days_active: 45,
            account_mean_roas: 6.88,
            z_score: Some(-3.44),
            root_cause: Some(RootCause::Tracking),
        }
    }

    async fn valid_draft() -> RecommendationDraft {
        DecisionTableModel::new()
            .draft_recommendation(&facts(), None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_table_draft_passes_clean() {
        let validator = GroundedValidator::new(Default::default());
        let violations = validator.validate(&valid_draft().await, &facts());
        assert!(violations.is_empty(), "unexpected violations: {violations:?}");
    }

    #[tokio::test]
    async fn test_revalidating_reserialized_output_is_clean() {
        // round-trip through JSON and validate again: still zero violations
        let validator = GroundedValidator::new(Default::default());
        let draft = valid_draft().await;
        let json = serde_json::to_string(&draft).unwrap();
        let reparsed: RecommendationDraft = serde_json::from_str(&json).unwrap();
        assert!(validator.validate(&reparsed, &facts()).is_empty());
    }

    #[tokio::test]
    async fn test_missing_fields_reported() {
        let validator = GroundedValidator::new(Default::default());
        let draft = RecommendationDraft::default();
        let violations = validator.validate(&draft, &facts());
        assert!(violations.iter().any(|v| v.contains("missing field: action")));
        assert!(violations.iter().any(|v| v.contains("missing field: chain")));
    }

    #[tokio::test]
    async fn test_out_of_vocabulary_action_rejected() {
        let validator = GroundedValidator::new(Default::default());
        let mut draft = valid_draft().await;
        draft.action = Some("YOLO_SCALE".to_string());
        let violations = validator.validate(&draft, &facts());
        assert!(violations.iter().any(|v| v.contains("invalid action")));
    }

    #[tokio::test]
    async fn test_ungrounded_spend_rejected() {
        let validator = GroundedValidator::new(Default::default());
        let mut draft = valid_draft().await;
        draft.cited_spend = Some(123.0);
        let violations = validator.validate(&draft, &facts());
        assert!(violations.iter().any(|v| v.contains("spend mismatch")));
    }

    #[tokio::test]
    async fn test_spend_within_dollar_tolerance_accepted() {
        let validator = GroundedValidator::new(Default::default());
        let mut draft = valid_draft().await;
        draft.cited_spend = Some(88_000.6);
        if let Some(chain) = &mut draft.chain {
            if let Some(data) = &mut chain.data {
                data.spend = Some(88_000.6);
            }
        }
        assert!(validator.validate(&draft, &facts()).is_empty());
    }

    #[tokio::test]
    async fn test_arithmetic_inconsistency_rejected() {
        let validator = GroundedValidator::new(Default::default());
        let mut draft = valid_draft().await;
        draft.expected_revenue_change = Some(999_999.0);
        let violations = validator.validate(&draft, &facts());
        assert!(violations.iter().any(|v| v.contains("expected_revenue_change")));
    }

    #[tokio::test]
    async fn test_wrong_qualification_flag_rejected() {
        let validator = GroundedValidator::new(Default::default());
        let mut draft = valid_draft().await;
        if let Some(chain) = &mut draft.chain {
            if let Some(q) = &mut chain.qualification {
                q.spend_ok = Some(false); // spend is 88,000: the flag is a lie
            }
        }
        let violations = validator.validate(&draft, &facts());
        assert!(violations.iter().any(|v| v.contains("qualification.spend_ok")));
    }

    #[tokio::test]
    async fn test_unsanctioned_table_deviation_rejected() {
        let validator = GroundedValidator::new(Default::default());
        let mut draft = valid_draft().await;
        // table says PAUSE for a zero-ROAS heavy spender; SCALE is absurd
        draft.action = Some("SCALE".to_string());
        if let Some(chain) = &mut draft.chain {
            chain.classification = Some("SCALE".to_string());
        }
        let violations = validator.validate(&draft, &facts());
        assert!(violations.iter().any(|v| v.contains("contradicts the guideline")));
    }

    #[tokio::test]
    async fn test_fatigue_override_with_citation_accepted() {
        let validator = GroundedValidator::new(Default::default());
        let mut monitor_facts = facts();
        // 1.5x account mean, healthy spend: table row says MONITOR
        monitor_facts.roas = 10.0;
        monitor_facts.account_mean_roas = 6.88;
        monitor_facts.spend = 5_000.0;
        monitor_facts.z_score = None;
        monitor_facts.root_cause = Some(RootCause::CreativeFatigue);

        let mut draft = DecisionTableModel::new()
            .draft_recommendation(&monitor_facts, None)
            .await
            .unwrap();
        draft.action = Some("REFRESH_CREATIVE".to_string());
        draft.rationale = Some(
            "CTR decay confirmed as CREATIVE_FATIGUE; rotate new variants instead of holding"
                .to_string(),
        );
        if let Some(chain) = &mut draft.chain {
            chain.classification = Some("REFRESH_CREATIVE".to_string());
        }

        let violations = validator.validate(&draft, &monitor_facts);
        assert!(violations.is_empty(), "unexpected violations: {violations:?}");
    }

    #[test]
    fn test_feedback_names_every_violation() {
        let feedback = GroundedValidator::feedback(&[
            "spend mismatch: cited 1, source 2".to_string(),
            "missing field: chain".to_string(),
        ]);
        assert!(feedback.contains("spend mismatch"));
        assert!(feedback.contains("missing field: chain"));
    }
}
