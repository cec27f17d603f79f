//! Prediction result data structures

use serde::{Deserialize, Serialize};
use std::fmt;

/// Probability above which an application is approved
pub const APPROVAL_THRESHOLD: f64 = 0.5;

/// Loan decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Approved,
    Denied,
}

impl Label {
    /// Decide from the "approved" class probability
    pub fn from_probability(probability: f64) -> Self {
        if probability > APPROVAL_THRESHOLD {
            Label::Approved
        } else {
            Label::Denied
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Approved => "approved",
            Label::Denied => "denied",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Probability of the "approved" class (0.0 - 1.0)
    pub probability: f64,
    /// Decision derived from the probability
    pub label: Label,
    /// Distance from the decision boundary, scaled to 0.0 - 1.0
    pub confidence: f64,
}

impl PredictionResult {
    /// Derive label and confidence from the approved-class probability.
    ///
    /// Confidence is `|p - 0.5| * 2`, unrounded.
    pub fn from_probability(probability: f64) -> Self {
        Self {
            probability,
            label: Label::from_probability(probability),
            confidence: (probability - APPROVAL_THRESHOLD).abs() * 2.0,
        }
    }

    /// Per-class probabilities as `[denied, approved]`
    pub fn class_probabilities(&self) -> [f64; 2] {
        [1.0 - self.probability, self.probability]
    }
}
