//! Recommend handler
//!
//! - POST /api/v1/recommend - generate recommendations for a session

use crate::service::AnalysisService;
use crate::{error_response, SuccessResponse};
use adpulse_core::types::{Recommendation, SessionId};
use adpulse_detection::agents::RecommendationSummary;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Request to generate recommendations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendRequest {
    /// Session returned by analyze
    pub session_id: SessionId,
    /// Route drafting through the model + grounded validator; off, the
    /// guideline table classifies directly
    #[serde(default)]
    pub use_model_reasoning: bool,
}

/// Response from recommend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendResponse {
    /// One recommendation per ad, priority-ordered
    pub recommendations: Vec<Recommendation>,
    /// Counts by action/priority plus dollar totals
    pub summary: RecommendationSummary,
}

/// POST /api/v1/recommend
#[instrument(skip(service, request), fields(session_id = %request.session_id))]
pub async fn recommend(
    State(service): State<Arc<AnalysisService>>,
    Json(request): Json<RecommendRequest>,
) -> impl IntoResponse {
    info!(
        use_model = request.use_model_reasoning,
        "Processing recommend request"
    );

    match service
        .recommend(request.session_id, request.use_model_reasoning)
        .await
    {
        Ok((recommendations, summary)) => (
            StatusCode::OK,
            Json(SuccessResponse::new(RecommendResponse {
                recommendations,
                summary,
            })),
        )
            .into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}
