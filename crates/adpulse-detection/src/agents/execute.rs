//! Execution simulator.
//!
//! Walks a session's recommendations through a small state machine:
//! not-approved recommendations skip, recommendations whose ad no longer
//! resolves in the session fail, and everything else succeeds
//! deterministically under dry-run. Live execution needs a
//! [`PlatformWriter`]; none ships, so without one a live request reports
//! FAILED per item rather than pretending success. The simulator is pure
//! over its inputs - calling it any number of times with the same session,
//! approved set, and dry-run flag produces identical results.

use adpulse_core::session::Session;
use adpulse_core::types::{Action, ExecutionResult, ExecutionStatus, Recommendation};
use adpulse_core::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};

/// Seam for the future live path: applies one recommendation to the ad
/// platform and returns a human-readable confirmation
#[async_trait]
pub trait PlatformWriter: Send + Sync {
    /// Apply the recommendation for real
    async fn apply(&self, recommendation: &Recommendation) -> Result<String>;
}

/// Batch totals for one execution pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Recommendations processed
    pub total_processed: usize,
    /// Terminal SUCCESS count
    pub success: usize,
    /// Terminal FAILED count
    pub failed: usize,
    /// Terminal SKIPPED count
    pub skipped: usize,
    /// Whether this pass was a dry run
    pub dry_run: bool,
}

/// Deterministic executor over a session's recommendations
#[derive(Default)]
pub struct ExecutionSimulator {
    writer: Option<Arc<dyn PlatformWriter>>,
}

impl std::fmt::Debug for ExecutionSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionSimulator")
            .field("has_writer", &self.writer.is_some())
            .finish()
    }
}

impl ExecutionSimulator {
    /// Simulator with no live writer (dry-run only)
    pub fn new() -> Self {
        Self { writer: None }
    }

    /// Attach a live platform writer for non-dry-run execution
    pub fn with_writer(writer: Arc<dyn PlatformWriter>) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    /// Process the session's recommendations.
    ///
    /// `approved` restricts execution to the listed ad identifiers; absent,
    /// every recommendation is attempted.
    #[instrument(skip_all, fields(session_id = %session.id, dry_run))]
    pub async fn execute(
        &self,
        session: &Session,
        approved: Option<&HashSet<String>>,
        dry_run: bool,
    ) -> (Vec<ExecutionResult>, ExecutionSummary) {
        let mut results = Vec::with_capacity(session.recommendations.len());

        for recommendation in &session.recommendations {
            let result = self.process_one(session, recommendation, approved, dry_run).await;
            results.push(result);
        }

        let summary = ExecutionSummary {
            total_processed: results.len(),
            success: count(&results, ExecutionStatus::Success),
            failed: count(&results, ExecutionStatus::Failed),
            skipped: count(&results, ExecutionStatus::Skipped),
            dry_run,
        };
        info!(
            total = summary.total_processed,
            success = summary.success,
            failed = summary.failed,
            skipped = summary.skipped,
            "Execution pass complete"
        );
        (results, summary)
    }

    async fn process_one(
        &self,
        session: &Session,
        recommendation: &Recommendation,
        approved: Option<&HashSet<String>>,
        dry_run: bool,
    ) -> ExecutionResult {
        let base = |status: ExecutionStatus, message: String| ExecutionResult {
            ad_id: recommendation.ad_id.clone(),
            ad_name: recommendation.ad_name.clone(),
            action: recommendation.action,
            status,
            message,
            dry_run,
        };

        if let Some(approved) = approved {
            if !approved.contains(&recommendation.ad_id) {
                return base(ExecutionStatus::Skipped, "not approved".to_string());
            }
        }

        if session.summary(&recommendation.ad_id).is_none() {
            return base(
                ExecutionStatus::Failed,
                format!(
                    "ad {} no longer resolves in this session",
                    recommendation.ad_id
                ),
            );
        }

        if dry_run {
            return base(ExecutionStatus::Success, dry_run_message(recommendation));
        }

        match &self.writer {
            Some(writer) => match writer.apply(recommendation).await {
                Ok(message) => base(ExecutionStatus::Success, message),
                Err(err) => base(ExecutionStatus::Failed, err.to_string()),
            },
            None => base(
                ExecutionStatus::Failed,
                "no platform writer configured; live execution unavailable".to_string(),
            ),
        }
    }
}

fn dry_run_message(recommendation: &Recommendation) -> String {
    match recommendation.action {
        Action::Pause => format!(
            "[dry run] would pause {} on {}, stopping ${:.2} of spend",
            recommendation.ad_id,
            recommendation.provider.as_str(),
            recommendation.current_spend
        ),
        Action::Scale | Action::Reduce => format!(
            "[dry run] would move {} budget ${:.2} -> ${:.2} ({:+.0}%)",
            recommendation.ad_id,
            recommendation.current_spend,
            recommendation.proposed_new_spend,
            recommendation.proposed_change_pct
        ),
        Action::RefreshCreative => format!(
            "[dry run] would flag {} for creative refresh (manual follow-up)",
            recommendation.ad_id
        ),
        Action::Monitor | Action::Wait => format!(
            "[dry run] no platform change for {}; {} only records intent",
            recommendation.ad_id,
            recommendation.action.as_str()
        ),
    }
}

fn count(results: &[ExecutionResult], status: ExecutionStatus) -> usize {
    results.iter().filter(|r| r.status == status).count()
}
