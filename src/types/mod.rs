//! Type definitions for the loan approval server

pub mod envelope;
pub mod features;
pub mod prediction;

pub use envelope::{ModelIdentity, ResponseEnvelope};
pub use features::{FeatureRecord, FeatureValue, FEATURE_NAMES};
pub use prediction::{Label, PredictionResult};
