//! Model readiness and out-of-process inference

pub mod artifact;
pub mod inference;

pub use artifact::{HealthReport, HealthStatus, ModelArtifact};
pub use inference::{Predictor, ScriptWorker};
