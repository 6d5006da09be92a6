//! Search parameters for record-store queries.
//!
//! This models the query surface the resolution layer actually uses, and
//! renders it to FHIR REST query pairs for the HTTP client. The in-memory
//! store interprets the same parameters directly.

use chrono::{DateTime, SecondsFormat, Utc};

/// The record kinds the scoring service queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Observation,
    Condition,
    Patient,
}

impl RecordKind {
    /// The FHIR resource type name.
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Observation => "Observation",
            RecordKind::Condition => "Condition",
            RecordKind::Patient => "Patient",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A date field a search can sort on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortField {
    /// The clinically effective time of a record.
    Date,
    /// The time a record was entered.
    RecordedDate,
}

impl SortField {
    fn as_str(self) -> &'static str {
        match self {
            SortField::Date => "date",
            SortField::RecordedDate => "recorded-date",
        }
    }
}

/// Sort order for search results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub descending: bool,
}

impl Sort {
    pub fn ascending(field: SortField) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub fn descending(field: SortField) -> Self {
        Self {
            field,
            descending: true,
        }
    }
}

/// Parameters of one record-store search.
///
/// `code` and `component_code` take a comma-separated code set; the comma is
/// an OR, and each token may carry a `system|` prefix.
#[derive(Clone, Debug, Default)]
pub struct SearchParams {
    /// Restrict to records whose subject is this patient.
    pub subject: Option<String>,
    /// Restrict to records whose primary coding matches this code set.
    pub code: Option<String>,
    /// Restrict to records with a component coding matching this code set.
    pub component_code: Option<String>,
    /// Restrict to the record with this logical id.
    pub id: Option<String>,
    /// Inclusive lower bound on the record's effective time.
    pub date_ge: Option<DateTime<Utc>>,
    pub sort: Option<Sort>,
    pub limit: Option<u32>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render the parameters as FHIR REST query pairs.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(subject) = &self.subject {
            pairs.push(("subject", subject.clone()));
        }
        if let Some(code) = &self.code {
            pairs.push(("code", code.clone()));
        }
        if let Some(component_code) = &self.component_code {
            pairs.push(("component-code", component_code.clone()));
        }
        if let Some(id) = &self.id {
            pairs.push(("_id", id.clone()));
        }
        if let Some(date_ge) = &self.date_ge {
            pairs.push((
                "date",
                format!("ge{}", date_ge.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ));
        }
        if let Some(sort) = &self.sort {
            let field = sort.field.as_str();
            let value = if sort.descending {
                format!("-{field}")
            } else {
                field.to_string()
            };
            pairs.push(("_sort", value));
        }
        if let Some(limit) = self.limit {
            pairs.push(("_count", limit.to_string()));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn renders_windowed_observation_query() {
        let params = SearchParams {
            subject: Some("test-01".into()),
            code: Some("9279-1,8310-5".into()),
            date_ge: Some(Utc.with_ymd_and_hms(2021, 3, 5, 10, 15, 30).unwrap()),
            sort: Some(Sort::descending(SortField::Date)),
            limit: Some(1),
            ..SearchParams::default()
        };

        assert_eq!(
            params.to_query_pairs(),
            vec![
                ("subject", "test-01".to_string()),
                ("code", "9279-1,8310-5".to_string()),
                ("date", "ge2021-03-05T10:15:30Z".to_string()),
                ("_sort", "-date".to_string()),
                ("_count", "1".to_string()),
            ]
        );
    }

    #[test]
    fn renders_component_fallback_and_ascending_sort() {
        let params = SearchParams {
            subject: Some("test-01".into()),
            component_code: Some("8480-6".into()),
            sort: Some(Sort::ascending(SortField::RecordedDate)),
            ..SearchParams::default()
        };

        assert_eq!(
            params.to_query_pairs(),
            vec![
                ("subject", "test-01".to_string()),
                ("component-code", "8480-6".to_string()),
                ("_sort", "recorded-date".to_string()),
            ]
        );
    }

    #[test]
    fn renders_id_lookup() {
        let params = SearchParams {
            id: Some("test-01".into()),
            limit: Some(1),
            ..SearchParams::default()
        };

        assert_eq!(
            params.to_query_pairs(),
            vec![("_id", "test-01".to_string()), ("_count", "1".to_string())]
        );
    }
}
