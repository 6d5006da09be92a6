//! Untyped clinical record access.
//!
//! Records come back from the store as raw JSON resources. Rather than
//! committing to strict wire structs for every resource type, this module
//! wraps the raw value and exposes only the named path accessors the
//! resolution layer actually reads: codings, components, quantity and string
//! values, and the handful of timestamp fields.
//!
//! Code matching understands the feature-table conventions: a code set is a
//! comma-separated OR-list, and each token is either a bare code or a
//! `system|code` pair.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::FhirResult;

/// A raw clinical record as returned by the record store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Value);

impl Record {
    /// Wrap a raw resource value.
    pub fn new(resource: Value) -> Self {
        Self(resource)
    }

    /// Parse a record from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError::Json`] if the string is not valid JSON.
    pub fn from_json(raw: &str) -> FhirResult<Self> {
        Ok(Self(serde_json::from_str(raw)?))
    }

    /// Borrow the underlying JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// The resource's `resourceType` field.
    pub fn resource_type(&self) -> Option<&str> {
        self.0.get("resourceType").and_then(Value::as_str)
    }

    /// The resource's logical id.
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// Generic top-level field access.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Whether this record's subject reference points at `patient_id`.
    ///
    /// Subject references are either a bare id or a `Type/id` path; both
    /// forms match.
    pub fn subject_matches(&self, patient_id: &str) -> bool {
        let Some(reference) = self
            .0
            .get("subject")
            .and_then(|subject| subject.get("reference"))
            .and_then(Value::as_str)
        else {
            return false;
        };

        reference == patient_id || reference.rsplit('/').next() == Some(patient_id)
    }

    /// Whether any primary coding (`code.coding[*]`) matches a token of the
    /// given code set.
    pub fn matches_code(&self, code_set: &str) -> bool {
        codings_match(self.0.get("code"), code_set)
    }

    /// Whether any component carries a coding matching the given code set.
    pub fn has_component_code(&self, code_set: &str) -> bool {
        self.matching_component(code_set).is_some()
    }

    /// The quantity value of the first component whose coding matches the
    /// given code set.
    pub fn component_quantity(&self, code_set: &str) -> Option<f64> {
        self.matching_component(code_set)
            .and_then(|component| component.get("valueQuantity"))
            .and_then(|quantity| quantity.get("value"))
            .and_then(Value::as_f64)
    }

    fn matching_component(&self, code_set: &str) -> Option<&Value> {
        self.0
            .get("component")
            .and_then(Value::as_array)?
            .iter()
            .find(|component| codings_match(component.get("code"), code_set))
    }

    /// The record's top-level quantity value (`valueQuantity.value`).
    pub fn value_quantity(&self) -> Option<f64> {
        self.0
            .get("valueQuantity")
            .and_then(|quantity| quantity.get("value"))
            .and_then(Value::as_f64)
    }

    /// The record's top-level string value (`valueString`).
    pub fn value_string(&self) -> Option<&str> {
        self.0.get("valueString").and_then(Value::as_str)
    }

    /// The raw effective timestamp: `effectiveDateTime`, falling back to
    /// `effectivePeriod.start`.
    pub fn effective_datetime(&self) -> Option<&str> {
        if let Some(instant) = self.0.get("effectiveDateTime").and_then(Value::as_str) {
            return Some(instant);
        }
        self.0
            .get("effectivePeriod")
            .and_then(|period| period.get("start"))
            .and_then(Value::as_str)
    }

    /// The effective timestamp parsed to an instant, for ordering and window
    /// comparisons.
    pub fn effective_instant(&self) -> Option<DateTime<Utc>> {
        self.effective_datetime().and_then(parse_instant)
    }

    /// The raw `recordedDate` field.
    pub fn recorded_date(&self) -> Option<&str> {
        self.0.get("recordedDate").and_then(Value::as_str)
    }

    /// The `recordedDate` field parsed to an instant.
    pub fn recorded_instant(&self) -> Option<DateTime<Utc>> {
        self.recorded_date().and_then(parse_instant)
    }

    /// The raw `birthDate` field.
    pub fn birth_date(&self) -> Option<&str> {
        self.0.get("birthDate").and_then(Value::as_str)
    }
}

/// Whether any coding under a `CodeableConcept` value matches a token of the
/// code set.
fn codings_match(concept: Option<&Value>, code_set: &str) -> bool {
    let Some(codings) = concept
        .and_then(|concept| concept.get("coding"))
        .and_then(Value::as_array)
    else {
        return false;
    };

    codings
        .iter()
        .any(|coding| code_set.split(',').any(|token| coding_matches(coding, token)))
}

/// Whether one coding matches one code-set token.
///
/// A `system|code` token must match both fields; a bare token matches the
/// code alone, whatever the system.
fn coding_matches(coding: &Value, token: &str) -> bool {
    let code = coding.get("code").and_then(Value::as_str);
    match token.split_once('|') {
        Some((system, bare)) => {
            code == Some(bare) && coding.get("system").and_then(Value::as_str) == Some(system)
        }
        None => code == Some(token),
    }
}

/// Parse a FHIR timestamp string to a UTC instant.
///
/// Accepts full RFC 3339 instants, offset-less date-times (read as UTC), and
/// plain dates (read as UTC midnight).
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_observation() -> Record {
        Record::from_json(
            r#"{
                "resourceType": "Observation",
                "id": "obs-1",
                "subject": {"reference": "Patient/test-01"},
                "code": {
                    "coding": [
                        {"system": "http://loinc.org", "code": "9279-1"}
                    ]
                },
                "effectiveDateTime": "2021-03-05T10:15:30Z",
                "valueQuantity": {"value": 25.0, "unit": "/min"},
                "component": [
                    {
                        "code": {"coding": [{"system": "http://loinc.org", "code": "8480-6"}]},
                        "valueQuantity": {"value": 120.0}
                    },
                    {
                        "code": {"coding": [{"code": "8462-4"}]},
                        "valueQuantity": {"value": 80.0}
                    }
                ]
            }"#,
        )
        .expect("parse sample observation")
    }

    #[test]
    fn matches_bare_and_prefixed_code_tokens() {
        let record = sample_observation();

        assert!(record.matches_code("9279-1"));
        assert!(record.matches_code("http://loinc.org|9279-1"));
        assert!(record.matches_code("0000-0,9279-1"));
        assert!(!record.matches_code("8480-6"));
        assert!(!record.matches_code("http://snomed.info/sct|9279-1"));
    }

    #[test]
    fn finds_quantity_of_matching_component() {
        let record = sample_observation();

        assert!(record.has_component_code("8462-4"));
        assert_eq!(record.component_quantity("8480-6"), Some(120.0));
        assert_eq!(
            record.component_quantity("http://loinc.org|8480-6"),
            Some(120.0)
        );
        assert_eq!(record.component_quantity("9999-9"), None);
    }

    #[test]
    fn subject_matches_with_and_without_resource_prefix() {
        let record = sample_observation();

        assert!(record.subject_matches("test-01"));
        assert!(!record.subject_matches("test-02"));

        let bare = Record::from_json(r#"{"subject": {"reference": "test-01"}}"#)
            .expect("parse bare subject");
        assert!(bare.subject_matches("test-01"));
    }

    #[test]
    fn effective_datetime_falls_back_to_period_start() {
        let record = Record::from_json(
            r#"{
                "resourceType": "Observation",
                "effectivePeriod": {"start": "2021-03-05T08:00:00Z", "end": "2021-03-05T09:00:00Z"}
            }"#,
        )
        .expect("parse period observation");

        assert_eq!(record.effective_datetime(), Some("2021-03-05T08:00:00Z"));
    }

    #[test]
    fn parses_instants_with_varying_precision() {
        let full = parse_instant("2021-03-05T10:15:30+08:00").expect("offset instant");
        assert_eq!(full.to_rfc3339(), "2021-03-05T02:15:30+00:00");

        let naive = parse_instant("2021-03-05T10:15:30").expect("naive instant");
        assert_eq!(naive.to_rfc3339(), "2021-03-05T10:15:30+00:00");

        let date_only = parse_instant("2021-03-05").expect("date-only instant");
        assert_eq!(date_only.to_rfc3339(), "2021-03-05T00:00:00+00:00");

        assert!(parse_instant("not a date").is_none());
    }
}
