//! Loan Approval Server - Main Entry Point
//!
//! Serves the loan approval classifier over HTTP, running each prediction in
//! a short-lived worker process.
//!
//! # Usage
//! ```sh
//! loan-approval-serving [config/config.toml]
//! ```

use anyhow::Result;
use loan_approval_serving::{
    config::AppConfig,
    metrics::{MetricsReporter, ServingMetrics},
    server::{self, ServingState},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config_found = Path::new(&config_path).exists();
    let config = if config_found {
        AppConfig::load_from_path(&config_path)?
    } else {
        AppConfig::default()
    };

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("loan_approval_serving={}", config.logging.level).parse()?);
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format.as_str() {
        "json" => subscriber.json().init(),
        _ => subscriber.pretty().init(),
    }

    info!("Starting Loan Approval Model Server {}", env!("CARGO_PKG_VERSION"));
    if config_found {
        info!(path = %config_path, "Configuration loaded");
    } else {
        warn!(path = %config_path, "Configuration file not found, using defaults");
    }
    info!(
        model = %config.model.name,
        version = %config.model.version,
        artifact = %config.model.artifact_path.display(),
        "Serving model"
    );

    let metrics = Arc::new(ServingMetrics::new());
    let state = Arc::new(ServingState::from_config(&config, metrics.clone()));

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
        info!(
            "Metrics reporter started (interval: {}s)",
            config.metrics.report_interval_secs
        );
    }

    info!("Endpoints available:");
    info!("   GET  /health   - Health check");
    info!("   GET  /metadata - Model information");
    info!("   GET  /         - API documentation");
    info!("   POST {} - Direct predictions", server::DIRECT_ROUTE);
    info!("   POST {} - Class probabilities", server::CLASS_PROBABILITIES_ROUTE);
    info!("   POST {} - Generic serving", server::GENERIC_SERVING_ROUTE);

    server::run_server(config.server.bind_addr()?, state).await?;

    info!("Server shutting down...");
    metrics.print_summary();

    Ok(())
}
