//! Feature value extraction.
//!
//! Resolution finds the record; extraction turns it into the `{date, value}` pair the
//! scoring layer consumes. Timestamps are normalized to minute precision so callers see one
//! shape regardless of how precisely the upstream system recorded the moment.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ScoringError, ScoringResult};
use crate::resolve::ResourceQueryResult;

static DATE_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])T([01]\d|2[0-3]):[0-5]\d")
        .expect("date-time pattern is valid")
});

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])").expect("date pattern is valid")
});

/// A feature value in one of the shapes clinical records carry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Num(f64),
    Text(String),
}

impl ScalarValue {
    /// The numeric reading of this value, when it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Num(value) => Some(*value),
            _ => None,
        }
    }

    /// Read a scalar out of a raw JSON value. Arrays, objects and null have
    /// no scalar reading.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(flag) => Some(Self::Bool(*flag)),
            Value::Number(number) => number.as_f64().map(Self::Num),
            Value::String(text) => Some(Self::Text(text.clone())),
            _ => None,
        }
    }
}

/// One extracted feature: the value plus the stamp of the record it came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureValue {
    pub date: Option<String>,
    pub value: ScalarValue,
}

/// Turn a resolved query result into a [`FeatureValue`].
///
/// # Errors
///
/// Returns `ScoringError::MalformedResource` when an Observation record carries neither a
/// quantity nor a string value, or when a component-sourced record has no component coded
/// with the queried code set.
pub fn extract(
    result: &ResourceQueryResult,
    reference: DateTime<Utc>,
) -> ScoringResult<FeatureValue> {
    match result {
        ResourceQueryResult::Condition { record } => Ok(FeatureValue {
            date: record
                .as_ref()
                .and_then(|record| record.recorded_date())
                .and_then(normalize_timestamp),
            value: ScalarValue::Bool(record.is_some()),
        }),
        ResourceQueryResult::Observation {
            record,
            component_sourced,
            code,
        } => {
            let value = if *component_sourced {
                let quantity = record.component_quantity(code).ok_or_else(|| {
                    ScoringError::MalformedResource(format!(
                        "component-sourced record has no component coded {code}"
                    ))
                })?;
                ScalarValue::Num(quantity)
            } else if let Some(quantity) = record.value_quantity() {
                ScalarValue::Num(quantity)
            } else if let Some(text) = record.value_string() {
                ScalarValue::Text(text.to_string())
            } else {
                return Err(ScoringError::MalformedResource(
                    "record has neither a quantity nor a string value".to_string(),
                ));
            };

            Ok(FeatureValue {
                date: record.effective_datetime().and_then(normalize_timestamp),
                value,
            })
        }
        ResourceQueryResult::Patient { value } => Ok(FeatureValue {
            date: Some(reference.format("%Y-%m-%d").to_string()),
            value: value.clone(),
        }),
    }
}

/// Normalize a record timestamp to minute precision.
///
/// Date-time inputs are cut after the minutes (`YYYY-MM-DDThh:mm`, seconds and offsets
/// dropped); date-only inputs get `T00:00` appended. Anything else yields no timestamp
/// rather than an error.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    if DATE_TIME_RE.is_match(raw) {
        return raw.get(..16).map(str::to_string);
    }
    if DATE_RE.is_match(raw) {
        return raw.get(..10).map(|date| format!("{date}T00:00"));
    }
    None
}
