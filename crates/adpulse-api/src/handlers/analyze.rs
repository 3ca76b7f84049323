//! Analyze handler
//!
//! - POST /api/v1/analyze - detect anomalies and diagnose root causes
//! - DELETE /api/v1/sessions/:id - release a session early

use crate::service::{AnalysisService, AnalyzeSummary};
use crate::{error_response, SuccessResponse};
use adpulse_core::types::SessionId;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Request to analyze a tenant's window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    /// Tenant short code
    pub tenant: String,
    /// Lookback window in whole days
    pub window_days: u32,
    /// Advisory hint about the preferred data source
    #[serde(default)]
    pub source_hint: Option<String>,
}

/// Response from analyze
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    /// Session to pass to recommend / execute
    pub session_id: SessionId,
    /// Anomaly counts and baseline snapshot
    pub summary: AnalyzeSummary,
}

/// POST /api/v1/analyze
#[instrument(skip(service, request), fields(tenant = %request.tenant))]
pub async fn analyze(
    State(service): State<Arc<AnalysisService>>,
    Json(request): Json<AnalyzeRequest>,
) -> impl IntoResponse {
    info!(window_days = request.window_days, "Processing analyze request");

    match service
        .analyze(
            &request.tenant,
            request.window_days,
            request.source_hint.as_deref(),
        )
        .await
    {
        Ok((session_id, summary)) => (
            StatusCode::OK,
            Json(SuccessResponse::new(AnalyzeResponse {
                session_id,
                summary,
            })),
        )
            .into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

/// DELETE /api/v1/sessions/:id
#[instrument(skip(service))]
pub async fn release_session(
    State(service): State<Arc<AnalysisService>>,
    Path(session_id): Path<SessionId>,
) -> impl IntoResponse {
    let released = service.release(session_id);
    let status = if released {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (
        status,
        Json(SuccessResponse::new(serde_json::json!({
            "released": released
        }))),
    )
}
