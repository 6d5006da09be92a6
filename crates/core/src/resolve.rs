//! Record retrieval strategies.
//!
//! Each feature's `type_of_data` selects how its record comes out of the store:
//! observations are searched inside the feature's alive window with a component-code
//! fallback, conditions are fetched without a window (absence is itself data), and patient
//! demographics are read off the patient record. The strategies sit in a registry keyed by
//! the lowercased `type_of_data` value, populated once at startup.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use fhir::{Record, RecordKind, RecordStore, SearchParams, Sort, SortField};

use crate::catalog::FeatureDefinition;
use crate::error::{ScoringError, ScoringResult};
use crate::extract::ScalarValue;

/// What one retrieval strategy found for one feature.
#[derive(Clone, Debug)]
pub enum ResourceQueryResult {
    Observation {
        record: Record,
        /// Whether the record was found through its component codings rather
        /// than its primary coding. Extraction reads the value from the
        /// matching component in that case.
        component_sourced: bool,
        /// The code set the search ran with.
        code: String,
    },
    Condition {
        /// The matched record, or `None` when the condition was never
        /// recorded for the patient.
        record: Option<Record>,
    },
    Patient {
        /// The demographic attribute, already read off the record.
        value: ScalarValue,
    },
}

/// The retrieval strategies the registry can dispatch to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolverKind {
    Observation,
    Condition,
    Patient,
}

impl ResolverKind {
    /// Run this strategy for one feature.
    pub async fn resolve(
        self,
        store: &dyn RecordStore,
        patient_id: &str,
        definition: &FeatureDefinition,
        reference: DateTime<Utc>,
    ) -> ScoringResult<ResourceQueryResult> {
        match self {
            ResolverKind::Observation => {
                resolve_observation(store, patient_id, definition, reference).await
            }
            ResolverKind::Condition => resolve_condition(store, patient_id, definition).await,
            ResolverKind::Patient => {
                resolve_patient(store, patient_id, definition, reference).await
            }
        }
    }
}

/// Retrieval strategies keyed by `type_of_data`. Lookups are case-insensitive.
#[derive(Clone, Debug, Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, ResolverKind>,
}

impl ResolverRegistry {
    pub fn register(&mut self, type_of_data: &str, kind: ResolverKind) {
        self.resolvers.insert(type_of_data.to_lowercase(), kind);
    }

    /// # Errors
    ///
    /// Returns `ScoringError::UnsupportedDataType` for unregistered names.
    pub fn get(&self, type_of_data: &str) -> ScoringResult<ResolverKind> {
        self.resolvers
            .get(&type_of_data.to_lowercase())
            .copied()
            .ok_or_else(|| ScoringError::UnsupportedDataType(type_of_data.to_string()))
    }

    /// The production registry: `observation`, `condition` and `patient`.
    pub fn standard() -> Self {
        let mut registry = Self::default();
        registry.register("observation", ResolverKind::Observation);
        registry.register("condition", ResolverKind::Condition);
        registry.register("patient", ResolverKind::Patient);
        registry
    }

    /// Resolve one feature through the strategy its definition names.
    pub async fn resolve(
        &self,
        store: &dyn RecordStore,
        patient_id: &str,
        definition: &FeatureDefinition,
        reference: DateTime<Utc>,
    ) -> ScoringResult<ResourceQueryResult> {
        self.get(definition.type_of_data())?
            .resolve(store, patient_id, definition, reference)
            .await
    }
}

async fn resolve_observation(
    store: &dyn RecordStore,
    patient_id: &str,
    definition: &FeatureDefinition,
    reference: DateTime<Utc>,
) -> ScoringResult<ResourceQueryResult> {
    let window_start = definition.alive_window().window_start(reference)?;
    let base = SearchParams {
        subject: Some(patient_id.to_string()),
        date_ge: Some(window_start),
        sort: Some(Sort::descending(SortField::Date)),
        limit: Some(1),
        ..SearchParams::default()
    };

    let mut primary = base.clone();
    primary.code = Some(definition.code().to_string());
    if let Some(record) = store
        .search(RecordKind::Observation, primary)
        .await?
        .into_iter()
        .next()
    {
        return Ok(ResourceQueryResult::Observation {
            record,
            component_sourced: false,
            code: definition.code().to_string(),
        });
    }

    // The code may sit on a component of a panel record rather than on the
    // record itself.
    let mut fallback = base;
    fallback.component_code = Some(definition.code().to_string());
    if let Some(record) = store
        .search(RecordKind::Observation, fallback)
        .await?
        .into_iter()
        .next()
    {
        return Ok(ResourceQueryResult::Observation {
            record,
            component_sourced: true,
            code: definition.code().to_string(),
        });
    }

    Err(ScoringError::DataNotFound {
        code: definition.code().to_string(),
        window_start,
    })
}

async fn resolve_condition(
    store: &dyn RecordStore,
    patient_id: &str,
    definition: &FeatureDefinition,
) -> ScoringResult<ResourceQueryResult> {
    let params = SearchParams {
        subject: Some(patient_id.to_string()),
        code: Some(definition.code().to_string()),
        sort: Some(Sort::ascending(SortField::RecordedDate)),
        limit: Some(1),
        ..SearchParams::default()
    };

    let record = store
        .search(RecordKind::Condition, params)
        .await?
        .into_iter()
        .next();
    Ok(ResourceQueryResult::Condition { record })
}

async fn resolve_patient(
    store: &dyn RecordStore,
    patient_id: &str,
    definition: &FeatureDefinition,
    reference: DateTime<Utc>,
) -> ScoringResult<ResourceQueryResult> {
    let params = SearchParams {
        id: Some(patient_id.to_string()),
        limit: Some(1),
        ..SearchParams::default()
    };

    let Some(record) = store
        .search(RecordKind::Patient, params)
        .await?
        .into_iter()
        .next()
    else {
        return Err(ScoringError::DataNotFound {
            code: definition.code().to_string(),
            window_start: reference,
        });
    };

    let value = match definition.code() {
        "age" => {
            let birth_date = record.birth_date().ok_or_else(|| {
                ScoringError::MalformedResource("patient record has no birthDate".to_string())
            })?;
            let birth = NaiveDate::parse_from_str(birth_date, "%Y-%m-%d").map_err(|_| {
                ScoringError::MalformedResource(format!("unreadable birthDate {birth_date}"))
            })?;
            let days = reference
                .date_naive()
                .signed_duration_since(birth)
                .num_days();
            ScalarValue::Num((days / 365) as f64)
        }
        attribute => {
            let raw = record.field(attribute).ok_or_else(|| {
                ScoringError::MalformedResource(format!(
                    "patient record has no attribute {attribute}"
                ))
            })?;
            ScalarValue::from_json(raw).ok_or_else(|| {
                ScoringError::MalformedResource(format!(
                    "patient attribute {attribute} is not a scalar"
                ))
            })?
        }
    };

    Ok(ResourceQueryResult::Patient { value })
}
