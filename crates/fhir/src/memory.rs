//! In-process record store.
//!
//! Applies the same filter/sort/limit semantics as a FHIR server to a plain
//! record list. Backs unit tests and local runs without a live endpoint.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::record::Record;
use crate::search::{RecordKind, SearchParams, Sort, SortField};
use crate::store::{BoxFuture, RecordStore};
use crate::FhirResult;

/// A [`RecordStore`] over an in-memory record list.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: Vec<Record>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record to the store.
    pub fn insert(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Add a record from raw JSON.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError::Json`] if the string is not valid JSON.
    pub fn insert_json(&mut self, raw: &str) -> FhirResult<()> {
        self.records.push(Record::from_json(raw)?);
        Ok(())
    }

    fn matches(record: &Record, kind: RecordKind, params: &SearchParams) -> bool {
        if record.resource_type() != Some(kind.as_str()) {
            return false;
        }
        if let Some(id) = &params.id {
            if record.id() != Some(id.as_str()) {
                return false;
            }
        }
        if let Some(subject) = &params.subject {
            if !record.subject_matches(subject) {
                return false;
            }
        }
        if let Some(code) = &params.code {
            if !record.matches_code(code) {
                return false;
            }
        }
        if let Some(component_code) = &params.component_code {
            if !record.has_component_code(component_code) {
                return false;
            }
        }
        if let Some(date_ge) = &params.date_ge {
            // Undated records never satisfy a date-filtered search.
            match record.effective_instant() {
                Some(instant) if instant >= *date_ge => {}
                _ => return false,
            }
        }
        true
    }

    fn sort_key(record: &Record, field: SortField) -> Option<DateTime<Utc>> {
        match field {
            SortField::Date => record.effective_instant(),
            SortField::RecordedDate => record.recorded_instant(),
        }
    }
}

impl RecordStore for MemoryStore {
    fn search(
        &self,
        kind: RecordKind,
        params: SearchParams,
    ) -> BoxFuture<'_, FhirResult<Vec<Record>>> {
        Box::pin(async move {
            let mut results: Vec<Record> = self
                .records
                .iter()
                .filter(|record| Self::matches(record, kind, &params))
                .cloned()
                .collect();

            if let Some(Sort { field, descending }) = params.sort {
                results.sort_by(|a, b| {
                    cmp_optional_instants(
                        Self::sort_key(a, field),
                        Self::sort_key(b, field),
                        descending,
                    )
                });
            }

            if let Some(limit) = params.limit {
                results.truncate(limit as usize);
            }

            Ok(results)
        })
    }
}

/// Compare sort keys so that undated records always order last.
fn cmp_optional_instants(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
    descending: bool,
) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            if descending {
                b.cmp(&a)
            } else {
                a.cmp(&b)
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
