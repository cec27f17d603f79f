//! Model artifact handle and readiness reporting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Health of the serving process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Artifact present, predictions can be served
    Healthy,
    /// Artifact missing
    Unhealthy,
    /// Startup has not finished
    Loading,
    /// The artifact check itself failed
    Error,
}

impl HealthStatus {
    /// Convert to HTTP status code.
    pub fn to_status_code(&self) -> u16 {
        match self {
            HealthStatus::Healthy => 200,
            HealthStatus::Unhealthy | HealthStatus::Loading => 503,
            HealthStatus::Error => 500,
        }
    }
}

/// Health query response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub model_loaded: bool,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Trained classifier artifact on disk.
///
/// The worker process loads the file itself; this handle only answers
/// whether it is there. Presence is re-checked on every query so deleting
/// or restoring the file takes effect without a restart.
pub struct ModelArtifact {
    path: PathBuf,
    version: String,
    /// Set once when startup completes
    loaded: AtomicBool,
}

impl ModelArtifact {
    pub fn new(path: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
            loaded: AtomicBool::new(false),
        }
    }

    /// Finish startup. Logs whether the artifact is in place.
    pub fn load(&self) {
        if self.is_ready() {
            info!(path = %self.path.display(), "Model artifact found");
        } else {
            warn!(
                path = %self.path.display(),
                "Model artifact not found, health will report unhealthy until it appears"
            );
        }
        self.loaded.store(true, Ordering::Release);
    }

    /// Whether startup has completed
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Whether the artifact file exists right now
    pub fn is_ready(&self) -> bool {
        self.path.try_exists().unwrap_or(false)
    }

    /// Full health report
    pub fn health(&self) -> HealthReport {
        let (status, model_loaded, message) = if !self.is_loaded() {
            (HealthStatus::Loading, false, Some("Model server is starting".to_string()))
        } else {
            match self.path.try_exists() {
                Ok(true) => (HealthStatus::Healthy, true, None),
                Ok(false) => (
                    HealthStatus::Unhealthy,
                    false,
                    Some("Model file not found".to_string()),
                ),
                Err(e) => (HealthStatus::Error, false, Some(e.to_string())),
            }
        };

        HealthReport {
            status,
            model_loaded,
            version: self.version.clone(),
            message,
            checked_at: Utc::now(),
        }
    }
}
