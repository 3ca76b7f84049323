//! Execute handler
//!
//! - POST /api/v1/execute - simulate approved recommendations

use crate::service::AnalysisService;
use crate::{error_response, SuccessResponse};
use adpulse_core::types::{ExecutionResult, SessionId};
use adpulse_detection::agents::ExecutionSummary;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

fn default_dry_run() -> bool {
    true
}

/// Request to execute a session's recommendations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Session returned by analyze
    pub session_id: SessionId,
    /// Restrict execution to these ad identifiers; absent, attempt all
    #[serde(default)]
    pub approved_ad_ids: Option<Vec<String>>,
    /// Dry-run flag; defaults to true
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

/// Response from execute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// One result per processed recommendation, in recommendation order
    pub results: Vec<ExecutionResult>,
    /// Status counts for the pass
    pub summary: ExecutionSummary,
}

/// POST /api/v1/execute
#[instrument(skip(service, request), fields(session_id = %request.session_id))]
pub async fn execute(
    State(service): State<Arc<AnalysisService>>,
    Json(request): Json<ExecuteRequest>,
) -> impl IntoResponse {
    info!(dry_run = request.dry_run, "Processing execute request");

    match service
        .execute(request.session_id, request.approved_ad_ids, request.dry_run)
        .await
    {
        Ok((results, summary)) => (
            StatusCode::OK,
            Json(SuccessResponse::new(ExecuteResponse { results, summary })),
        )
            .into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}
