//! adpulse main binary.
//!
//! Wires the components of the diagnosis service:
//! - Warehouse: fixture-backed metric store (per-tenant row files)
//! - Detection: baselines, anomaly detection, probes
//! - Agents: RCA orchestration, recommendations, execution simulation
//! - API: REST surface with health and metrics endpoints

use adpulse_api::prelude::*;
use adpulse_api::handlers::MetricsState;
use adpulse_core::config::Config;
use adpulse_warehouse::prelude::{FixtureStore, RawAdRow};
use adpulse_warehouse::TenantRegistry;
use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// adpulse CLI arguments
#[derive(Debug, Parser)]
#[clap(name = "adpulse", version, about = "Ad performance anomaly detection and RCA")]
struct Cli {
    /// Fixture file with warehouse rows (JSON map: tenant -> rows)
    #[clap(short, long, env = "ADPULSE_FIXTURE")]
    fixture: Option<PathBuf>,

    /// Address the API server binds
    #[clap(long, env = "ADPULSE_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[clap(long, env = "ADPULSE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[clap(long, env = "ADPULSE_LOG_JSON")]
    log_json: bool,

    /// Validate configuration and exit without serving
    #[clap(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    info!("Starting adpulse v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        tenants = config.tenants.len(),
        model = ?config.model.provider,
        "Configuration loaded"
    );

    if cli.check {
        info!("Check mode - configuration validated, exiting");
        return Ok(());
    }

    // Metric store over fixture rows
    let registry = TenantRegistry::new(config.tenants.clone());
    let mut store = FixtureStore::new(registry);
    if let Some(path) = &cli.fixture {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {path:?}"))?;
        let rows: HashMap<String, Vec<RawAdRow>> =
            serde_json::from_str(&raw).context("Malformed fixture file")?;
        for (tenant, tenant_rows) in rows {
            info!(tenant, rows = tenant_rows.len(), "Loading fixture rows");
            store = store.load_rows(&tenant, tenant_rows);
        }
    }

    // Prometheus recorder for the /metrics route
    let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;

    // Pipeline coordinator
    let service = Arc::new(
        AnalysisService::new(Arc::new(store), config).context("Failed to wire the pipeline")?,
    );
    info!("Pipeline components initialized");

    let api_config = ApiConfig {
        bind_addr: cli.bind,
        ..ApiConfig::default()
    };
    let health_state = Arc::new(HealthState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: service.clone(),
    });
    let metrics_state = Arc::new(MetricsState::new(prometheus));

    let router = create_router(api_config.clone(), service, health_state, metrics_state);
    let server = ApiServer::new(api_config, router);

    tokio::select! {
        result = server.serve() => {
            result.context("API server exited")?;
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received");
        }
    }

    info!("adpulse stopped");
    Ok(())
}

/// Initialize logging based on CLI arguments
fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .context("Invalid log level")?;

    if cli.log_json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            )
            .with(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(log_level.into()),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true),
            )
            .with(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(log_level.into()),
            )
            .init();
    }

    Ok(())
}

/// Block until the process is told to stop (interrupt, or SIGTERM on unix)
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!(error = %err, "SIGTERM handler unavailable; interrupt only");
                let _ = signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => info!("Interrupt received, shutting down"),
            _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("Interrupt received, shutting down");
    }
}
