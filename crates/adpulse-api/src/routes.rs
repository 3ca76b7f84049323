//! API route definitions.
//!
//! All operations are exposed through a single service:
//!
//! ## Pipeline Endpoints
//! - `POST /api/v1/analyze` - detect anomalies and diagnose root causes
//! - `POST /api/v1/recommend` - generate grounded recommendations
//! - `POST /api/v1/execute` - simulate approved recommendations
//! - `DELETE /api/v1/sessions/:id` - release a session early
//!
//! ## Infrastructure Endpoints
//! - `/health`, `/health/live`, `/health/ready` - health checks
//! - `/metrics` - Prometheus metrics

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{
    analyze, execute, health, liveness, metrics_handler, readiness, recommend, release_session,
    HealthState, MetricsState,
};
use crate::middleware::{cors_middleware, logging_middleware};
use crate::service::AnalysisService;
use crate::ApiConfig;

/// Assemble the full router over the pipeline coordinator
pub fn create_router(
    config: ApiConfig,
    service: Arc<AnalysisService>,
    health_state: Arc<HealthState>,
    metrics_state: Arc<MetricsState>,
) -> Router {
    let api_v1 = Router::new()
        .route("/analyze", post(analyze))
        .route("/recommend", post(recommend))
        .route("/execute", post(execute))
        .route("/sessions/:id", delete(release_session))
        .with_state(service);

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .with_state(health_state);

    let metrics_route = Router::new()
        .route(&config.metrics_path, get(metrics_handler))
        .with_state(metrics_state);

    let app = Router::new()
        .nest("/api/v1", api_v1)
        .merge(health_routes)
        .merge(metrics_route);

    let app = if config.enable_logging {
        app.layer(middleware::from_fn(logging_middleware))
    } else {
        app
    };

    app.layer(cors_middleware(config.cors_origins))
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeout_secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use adpulse_core::config::Config;
    use adpulse_warehouse::prelude::FixtureStore;
    use adpulse_warehouse::TenantRegistry;

    #[test]
    fn test_router_creation() {
        let registry = TenantRegistry::new(
            [("tl".to_string(), "warehouse.tl_daily".to_string())]
                .into_iter()
                .collect(),
        );
        let mut config = Config::default();
        config.tenants.insert("tl".into(), "warehouse.tl_daily".into());

        let store = Arc::new(FixtureStore::new(registry));
        let service = Arc::new(AnalysisService::new(store, config).unwrap());

        let health_state = Arc::new(HealthState {
            version: "0.1.0".to_string(),
            service: service.clone(),
        });
        let metrics_state = Arc::new(MetricsState::new(
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .build_recorder()
                .handle(),
        ));

        let router = create_router(ApiConfig::default(), service, health_state, metrics_state);
        drop(router);
    }
}
