//! Loan Approval Serving Library
//!
//! Serves a pre-trained loan approval classifier over HTTP. Requests in any
//! of the accepted encodings are normalized into a feature record, scored by
//! an out-of-process worker, and shaped into the caller's response envelope.

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod normalizer;
pub mod server;
pub mod types;

pub use config::AppConfig;
pub use error::{InvocationError, ServingError, ValidationError};
pub use models::{ModelArtifact, Predictor, ScriptWorker};
pub use normalizer::RequestNormalizer;
pub use server::ServingState;
pub use types::{FeatureRecord, PredictionResult, ResponseEnvelope};
