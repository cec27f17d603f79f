//! Feature record for loan approval inference

use serde::{Deserialize, Serialize};
use std::fmt;

/// Input features in the exact order the classifier was trained on.
pub const FEATURE_NAMES: [&str; 5] = ["age", "income", "education", "experience", "credit_score"];

/// A single numeric-coercible feature value.
///
/// Numeric strings are kept verbatim so the worker receives exactly what the
/// caller sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(serde_json::Number),
    Text(String),
}

impl FeatureValue {
    /// Accept a JSON number, or a string that parses as one.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => Some(FeatureValue::Number(n.clone())),
            serde_json::Value::String(s)
                if s.trim().parse::<f64>().is_ok_and(|v| v.is_finite()) =>
            {
                Some(FeatureValue::Text(s.clone()))
            }
            _ => None,
        }
    }
}

impl From<i64> for FeatureValue {
    fn from(value: i64) -> Self {
        FeatureValue::Number(value.into())
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Number(n) => write!(f, "{}", n),
            FeatureValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Canonical loan application handed to the prediction worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Applicant age in years
    pub age: FeatureValue,

    /// Annual income
    pub income: FeatureValue,

    /// Years of education
    pub education: FeatureValue,

    /// Years of work experience
    pub experience: FeatureValue,

    /// Credit score
    pub credit_score: FeatureValue,
}

impl FeatureRecord {
    /// Build a record from plain integers, in canonical order.
    pub fn new(age: i64, income: i64, education: i64, experience: i64, credit_score: i64) -> Self {
        Self {
            age: age.into(),
            income: income.into(),
            education: education.into(),
            experience: experience.into(),
            credit_score: credit_score.into(),
        }
    }

    /// Values in canonical feature order
    pub fn values(&self) -> [&FeatureValue; 5] {
        [
            &self.age,
            &self.income,
            &self.education,
            &self.experience,
            &self.credit_score,
        ]
    }

    /// Compact JSON object sent to the worker.
    pub fn to_worker_input(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for FeatureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = FEATURE_NAMES
            .iter()
            .zip(self.values())
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        write!(f, "{}", pairs.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_worker_input_is_ordered_flat_object() {
        let record = FeatureRecord::new(35, 75000, 16, 10, 750);

        let input = record.to_worker_input().unwrap();
        assert_eq!(
            input,
            r#"{"age":35,"income":75000,"education":16,"experience":10,"credit_score":750}"#
        );
    }

    #[test]
    fn test_numeric_strings_pass_through() {
        let value = FeatureValue::from_json(&json!("75000")).unwrap();
        assert_eq!(value, FeatureValue::Text("75000".to_string()));
        assert!(FeatureValue::from_json(&json!(" 1e3 ")).is_some());

        assert!(FeatureValue::from_json(&json!("seventy")).is_none());
        assert!(FeatureValue::from_json(&json!(null)).is_none());
        assert!(FeatureValue::from_json(&json!(true)).is_none());
    }

    #[test]
    fn test_non_finite_strings_rejected() {
        for text in ["NaN", "nan", "inf", "-Infinity", "+infinity"] {
            assert!(FeatureValue::from_json(&json!(text)).is_none(), "{text} accepted");
        }
    }

    #[test]
    fn test_display() {
        let record = FeatureRecord::new(35, 75000, 16, 10, 750);
        assert_eq!(
            record.to_string(),
            "age=35 income=75000 education=16 experience=10 credit_score=750"
        );
    }
}
