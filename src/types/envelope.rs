//! Response envelopes for the supported calling conventions

use crate::error::ServingError;
use crate::types::features::FeatureRecord;
use crate::types::prediction::{Label, PredictionResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Static per-feature weights reported by the generic-serving envelope.
///
/// These are fixed values, not derived from the model.
pub const FEATURE_IMPORTANCE: FeatureImportance = FeatureImportance {
    age: 0.2,
    income: 0.3,
    education: 0.15,
    experience: 0.15,
    credit_score: 0.2,
};

/// Response shape requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseEnvelope {
    /// Plain REST: predictions with echoed input plus model identity
    Direct,
    /// `[[prob_denied, prob_approved]]` for per-class probability consumers
    ClassProbabilities,
    /// Probability list, class, confidence and feature importance
    GenericServing,
}

impl ResponseEnvelope {
    pub const ALL: [ResponseEnvelope; 3] = [
        ResponseEnvelope::Direct,
        ResponseEnvelope::ClassProbabilities,
        ResponseEnvelope::GenericServing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseEnvelope::Direct => "direct",
            ResponseEnvelope::ClassProbabilities => "class_probabilities",
            ResponseEnvelope::GenericServing => "generic_serving",
        }
    }

    /// Render a successful prediction.
    pub fn render(
        &self,
        record: &FeatureRecord,
        result: &PredictionResult,
        model: &ModelIdentity,
    ) -> Value {
        match self {
            ResponseEnvelope::Direct => json!(DirectResponse {
                predictions: vec![DirectPrediction {
                    probability: result.probability,
                    prediction: result.label,
                    confidence: result.confidence,
                    input: record.clone(),
                }],
                model_name: model.name.clone(),
                model_version: model.version.clone(),
            }),
            ResponseEnvelope::ClassProbabilities => json!([result.class_probabilities()]),
            ResponseEnvelope::GenericServing => json!(GenericServingResponse {
                predictions: vec![result.probability],
                prediction_class: result.label.as_str().to_string(),
                confidence: result.confidence,
                feature_importance: Some(FEATURE_IMPORTANCE),
                error: None,
            }),
        }
    }

    /// Render a failure body.
    pub fn render_error(&self, err: &ServingError) -> Value {
        match self {
            ResponseEnvelope::Direct | ResponseEnvelope::ClassProbabilities => {
                json!({ "error": err.to_string() })
            }
            ResponseEnvelope::GenericServing => json!(GenericServingResponse {
                predictions: vec![0.0],
                prediction_class: "error".to_string(),
                confidence: 0.0,
                feature_importance: None,
                error: Some(err.to_string()),
            }),
        }
    }
}

/// Name and version reported alongside predictions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelIdentity {
    pub name: String,
    pub version: String,
}

/// Fixed importance weight per input feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub age: f64,
    pub income: f64,
    pub education: f64,
    pub experience: f64,
    pub credit_score: f64,
}

/// Direct envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectResponse {
    pub predictions: Vec<DirectPrediction>,
    pub model_name: String,
    pub model_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectPrediction {
    pub probability: f64,
    pub prediction: Label,
    pub confidence: f64,
    pub input: FeatureRecord,
}

/// Generic-serving envelope, also used for its error form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericServingResponse {
    pub predictions: Vec<f64>,
    pub prediction_class: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_importance: Option<FeatureImportance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InvocationError, ValidationError};
    use std::time::Duration;

    fn model() -> ModelIdentity {
        ModelIdentity {
            name: "loan-approval-rf".to_string(),
            version: "1.0.0".to_string(),
        }
    }

    #[test]
    fn test_direct_envelope() {
        let record = FeatureRecord::new(35, 75000, 16, 10, 750);
        let result = PredictionResult::from_probability(0.82);

        let body = ResponseEnvelope::Direct.render(&record, &result, &model());

        let prediction = &body["predictions"][0];
        assert_eq!(prediction["probability"], 0.82);
        assert_eq!(prediction["prediction"], "approved");
        assert!((prediction["confidence"].as_f64().unwrap() - 0.64).abs() < 1e-12);
        assert_eq!(prediction["input"]["credit_score"], 750);
        assert_eq!(body["model_name"], "loan-approval-rf");
        assert_eq!(body["model_version"], "1.0.0");
    }

    #[test]
    fn test_class_probability_envelope() {
        let record = FeatureRecord::new(35, 75000, 16, 10, 750);
        let result = PredictionResult::from_probability(0.75);

        let body = ResponseEnvelope::ClassProbabilities.render(&record, &result, &model());
        assert_eq!(body, json!([[0.25, 0.75]]));
    }

    #[test]
    fn test_generic_serving_envelope() {
        let record = FeatureRecord::new(35, 75000, 16, 10, 750);
        let result = PredictionResult::from_probability(0.3);

        let body = ResponseEnvelope::GenericServing.render(&record, &result, &model());
        assert_eq!(body["predictions"], json!([0.3]));
        assert_eq!(body["prediction_class"], "denied");
        assert_eq!(body["feature_importance"]["income"], 0.3);
        assert_eq!(body["feature_importance"]["experience"], 0.15);
        assert!(body.get("error").is_none());
    }

    #[test]
    fn test_error_envelopes() {
        let missing: ServingError = ValidationError::MissingField("age").into();
        assert_eq!(
            ResponseEnvelope::Direct.render_error(&missing),
            json!({"error": "Missing required feature: age"})
        );

        let timeout: ServingError = InvocationError::Timeout(Duration::from_secs(30)).into();
        let body = ResponseEnvelope::GenericServing.render_error(&timeout);
        assert_eq!(body["predictions"], json!([0.0]));
        assert_eq!(body["prediction_class"], "error");
        assert_eq!(body["confidence"], 0.0);
        assert_eq!(body["error"], "Prediction timeout after 30000ms");
        assert!(body.get("feature_importance").is_none());
    }
}
