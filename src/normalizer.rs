//! Request normalization for loan approval inference.
//!
//! Callers send applications in several encodings: a plain object, a
//! positional array, or one of the serving-framework envelopes. This module
//! resolves all of them into a [`FeatureRecord`] in canonical order.

use crate::error::ValidationError;
use crate::types::features::{FeatureRecord, FeatureValue, FEATURE_NAMES};
use serde_json::{Map, Value};

/// Resolved record before field validation
#[derive(Clone, Copy)]
enum RawRecord<'a> {
    Named(&'a Map<String, Value>),
    Positional(&'a [Value]),
}

/// Turns request bodies into feature records.
///
/// Envelopes are tried in priority order: `instances`, then `data`
/// (with or without `ndarray`), then the body itself.
pub struct RequestNormalizer;

impl RequestNormalizer {
    /// Create a new request normalizer.
    pub fn new() -> Self {
        Self
    }

    /// Parse raw body bytes, then normalize.
    pub fn normalize_bytes(&self, body: &[u8]) -> Result<FeatureRecord, ValidationError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ValidationError::NoData);
        }
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ValidationError::InvalidJson(e.to_string()))?;
        self.normalize(&value)
    }

    /// Normalize a JSON body into a feature record.
    pub fn normalize(&self, body: &Value) -> Result<FeatureRecord, ValidationError> {
        if is_empty(body) {
            return Err(ValidationError::NoData);
        }

        let raw = match body {
            Value::Object(map) if map.contains_key("instances") => {
                let first = match &map["instances"] {
                    Value::Array(instances) => instances.first().ok_or(ValidationError::NoData)?,
                    _ => return Err(ValidationError::UnsupportedShape),
                };
                Self::resolve(first)?
            }
            Value::Object(map) if map.contains_key("data") => {
                let data = &map["data"];
                match data.get("ndarray") {
                    Some(ndarray) => Self::resolve_array(ndarray)?,
                    None => Self::resolve(data)?,
                }
            }
            other => Self::resolve(other)?,
        };

        Self::validate(raw)
    }

    /// Feature names in canonical order.
    pub fn feature_names(&self) -> &'static [&'static str] {
        &FEATURE_NAMES
    }

    fn resolve(value: &Value) -> Result<RawRecord<'_>, ValidationError> {
        match value {
            Value::Object(map) => Ok(RawRecord::Named(map)),
            Value::Array(_) => Self::resolve_array(value),
            Value::Null => Err(ValidationError::NoData),
            _ => Err(ValidationError::UnsupportedShape),
        }
    }

    /// Positional input; a nested array is a batch and only its first row is used.
    fn resolve_array(value: &Value) -> Result<RawRecord<'_>, ValidationError> {
        let rows = value.as_array().ok_or(ValidationError::UnsupportedShape)?;
        let row = match rows.first() {
            None => return Err(ValidationError::NoData),
            Some(Value::Array(first_row)) => first_row,
            Some(_) => rows,
        };

        if row.len() < FEATURE_NAMES.len() {
            return Err(ValidationError::InsufficientLength {
                got: row.len(),
                need: FEATURE_NAMES.len(),
            });
        }
        Ok(RawRecord::Positional(row))
    }

    fn validate(raw: RawRecord<'_>) -> Result<FeatureRecord, ValidationError> {
        let field = |index: usize| -> Result<FeatureValue, ValidationError> {
            let name = FEATURE_NAMES[index];
            let value = match raw {
                RawRecord::Named(map) => map.get(name),
                RawRecord::Positional(row) => row.get(index),
            }
            .ok_or(ValidationError::MissingField(name))?;

            FeatureValue::from_json(value).ok_or(ValidationError::NonNumeric(name))
        };

        // Fields are checked in canonical order, so the first missing one is reported.
        Ok(FeatureRecord {
            age: field(0)?,
            income: field(1)?,
            education: field(2)?,
            experience: field(3)?,
            credit_score: field(4)?,
        })
    }
}

impl Default for RequestNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn is_empty(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
