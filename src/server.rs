//! HTTP surface of the loan approval server.
//!
//! All three prediction routes share one pipeline (normalize, invoke the
//! worker, shape the response) and differ only in their [`ResponseEnvelope`].

use crate::config::AppConfig;
use crate::error::ServingError;
use crate::metrics::ServingMetrics;
use crate::models::artifact::ModelArtifact;
use crate::models::inference::{Predictor, ScriptWorker};
use crate::normalizer::RequestNormalizer;
use crate::types::envelope::{ModelIdentity, ResponseEnvelope};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const DIRECT_ROUTE: &str = "/predict";
pub const CLASS_PROBABILITIES_ROUTE: &str = "/api/v1.0/predictions";
pub const GENERIC_SERVING_ROUTE: &str = "/v1/models/loan-approval/predict";

/// Everything a request handler needs, built once at startup.
pub struct ServingState {
    normalizer: RequestNormalizer,
    predictor: Arc<dyn Predictor>,
    artifact: Arc<ModelArtifact>,
    metrics: Arc<ServingMetrics>,
    model: ModelIdentity,
    deadline: Duration,
}

impl ServingState {
    pub fn new(
        predictor: Arc<dyn Predictor>,
        artifact: Arc<ModelArtifact>,
        metrics: Arc<ServingMetrics>,
        model: ModelIdentity,
        deadline: Duration,
    ) -> Self {
        Self {
            normalizer: RequestNormalizer::new(),
            predictor,
            artifact,
            metrics,
            model,
            deadline,
        }
    }

    /// Build the serving state with a subprocess worker from configuration
    pub fn from_config(config: &AppConfig, metrics: Arc<ServingMetrics>) -> Self {
        let predictor = ScriptWorker::new(&config.worker, &config.model.artifact_path);
        let artifact = ModelArtifact::new(&config.model.artifact_path, &config.model.version);

        info!(
            worker = %predictor.describe(),
            timeout_ms = config.worker.timeout_ms,
            "Prediction worker configured"
        );

        Self::new(
            Arc::new(predictor),
            Arc::new(artifact),
            metrics,
            ModelIdentity {
                name: config.model.name.clone(),
                version: config.model.version.clone(),
            },
            config.worker.timeout(),
        )
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn metrics(&self) -> &ServingMetrics {
        &self.metrics
    }

    /// Run one prediction request end to end.
    ///
    /// Every outcome, including failures, becomes a response in the
    /// requested envelope.
    pub async fn handle_prediction(&self, envelope: ResponseEnvelope, body: &[u8]) -> Response {
        let span = info_span!(
            "predict",
            request_id = %Uuid::new_v4(),
            envelope = envelope.as_str()
        );

        async move {
            self.metrics.record_request(envelope);

            let record = match self.normalizer.normalize_bytes(body) {
                Ok(record) => record,
                Err(e) => {
                    self.metrics.record_validation_error();
                    warn!(error = %e, "Rejected prediction request");
                    return failure_response(envelope, e.into());
                }
            };

            info!(input = %record, "Processing prediction request");
            let started = Instant::now();

            match self.predictor.predict(&record, self.deadline).await {
                Ok(result) => {
                    self.metrics.record_prediction(started.elapsed(), &result);
                    info!(
                        prediction = %result.label,
                        confidence = format!("{:.2}", result.confidence),
                        "Prediction served"
                    );
                    let body = envelope.render(&record, &result, &self.model);
                    (StatusCode::OK, Json(body)).into_response()
                }
                Err(e) => {
                    self.metrics.record_failure(e.kind(), started.elapsed());
                    error!(kind = %e.kind(), error = %e, "Prediction failed");
                    failure_response(envelope, e.into())
                }
            }
        }
        .instrument(span)
        .await
    }
}

fn failure_response(envelope: ResponseEnvelope, err: ServingError) -> Response {
    (err.status_code(), Json(envelope.render_error(&err))).into_response()
}

/// Build the application router.
pub fn router(state: Arc<ServingState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metadata", get(metadata))
        .route(DIRECT_ROUTE, post(predict_direct))
        .route(CLASS_PROBABILITIES_ROUTE, post(predict_class_probabilities))
        .route(GENERIC_SERVING_ROUTE, post(predict_generic_serving))
        .with_state(state)
}

/// Bind, finish startup while already accepting requests, and serve until
/// Ctrl+C. Health reports `loading` until the artifact check has run.
pub async fn run_server(addr: SocketAddr, state: Arc<ServingState>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "Loan approval server listening");

    let server = tokio::spawn(serve(listener, state.clone()));
    state.artifact().load();

    server.await.context("HTTP server task panicked")?
}

/// Serve the router on an already bound listener until Ctrl+C.
pub async fn serve(listener: TcpListener, state: Arc<ServingState>) -> Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}

// Handlers

async fn root(State(state): State<Arc<ServingState>>) -> Json<Value> {
    Json(json!({
        "message": "Loan Approval Model Server",
        "version": state.model.version,
        "endpoints": {
            "health": "GET /health - Health check",
            "metadata": "GET /metadata - Model information",
            "predict": format!("POST {} - Make predictions", DIRECT_ROUTE),
            "class_probabilities": format!(
                "POST {} - Per-class probabilities [[denied, approved]]",
                CLASS_PROBABILITIES_ROUTE
            ),
            "generic_serving": format!(
                "POST {} - Prediction with feature importance",
                GENERIC_SERVING_ROUTE
            ),
        },
        "example_request": {
            "age": 35,
            "income": 75000,
            "education": 16,
            "experience": 10,
            "credit_score": 750
        }
    }))
}

async fn health(State(state): State<Arc<ServingState>>) -> Response {
    let report = state.artifact.health();
    let status = StatusCode::from_u16(report.status.to_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(report)).into_response()
}

async fn metadata(State(state): State<Arc<ServingState>>) -> Json<Value> {
    let inputs: Vec<Value> = state
        .normalizer
        .feature_names()
        .iter()
        .map(|name| json!({"name": name, "datatype": "INT32", "shape": [1]}))
        .collect();

    Json(json!({
        "name": "loan-approval-model",
        "versions": [state.model.version],
        "platform": "R + RandomForest",
        "inputs": inputs,
        "outputs": [
            {"name": "prediction", "datatype": "STR", "shape": [1]},
            {"name": "probability", "datatype": "FP64", "shape": [1]},
            {"name": "confidence", "datatype": "FP64", "shape": [1]}
        ]
    }))
}

async fn predict_direct(State(state): State<Arc<ServingState>>, body: Bytes) -> Response {
    state
        .handle_prediction(ResponseEnvelope::Direct, &body)
        .await
}

async fn predict_class_probabilities(
    State(state): State<Arc<ServingState>>,
    body: Bytes,
) -> Response {
    state
        .handle_prediction(ResponseEnvelope::ClassProbabilities, &body)
        .await
}

async fn predict_generic_serving(
    State(state): State<Arc<ServingState>>,
    body: Bytes,
) -> Response {
    state
        .handle_prediction(ResponseEnvelope::GenericServing, &body)
        .await
}
