//! The scoring service.
//!
//! Ties the catalog, the resolver registry, the record store and the model registry
//! together behind the three operations the request layer consumes: resolve a patient's
//! features, score a feature map, or both in one step.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fhir::RecordStore;
use futures::future::join_all;

use crate::catalog::FeatureCatalog;
use crate::error::{ScoringError, ScoringResult};
use crate::extract::{extract, FeatureValue};
use crate::resolve::ResolverRegistry;
use crate::score::ModelRegistry;

/// Per-feature resolution outcomes for one patient.
///
/// A failure on one feature never discards what the other features already found; callers
/// decide how to present partial results.
#[derive(Debug, Default)]
pub struct PatientFeatures {
    pub features: BTreeMap<String, FeatureValue>,
    pub failures: BTreeMap<String, ScoringError>,
}

/// The outcome of resolving and scoring one patient.
#[derive(Debug)]
pub struct ScoreReport {
    pub features: BTreeMap<String, FeatureValue>,
    pub failures: BTreeMap<String, ScoringError>,
    /// The model's score, present only when every feature resolved.
    pub score: Option<i64>,
}

/// Patient scoring over a clinical record store.
pub struct ScoringService {
    store: Arc<dyn RecordStore>,
    catalog: FeatureCatalog,
    resolvers: ResolverRegistry,
    models: ModelRegistry,
}

impl ScoringService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        catalog: FeatureCatalog,
        resolvers: ResolverRegistry,
        models: ModelRegistry,
    ) -> Self {
        Self {
            store,
            catalog,
            resolvers,
            models,
        }
    }

    pub fn catalog(&self) -> &FeatureCatalog {
        &self.catalog
    }

    /// Resolve every feature of a model for one patient.
    ///
    /// Features are resolved concurrently; each failure is recorded against its feature
    /// rather than aborting the rest.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::UnknownModel` when the feature table has no rows for the
    /// model.
    pub async fn resolve_features(
        &self,
        patient_id: &str,
        model: &str,
        reference: DateTime<Utc>,
    ) -> ScoringResult<PatientFeatures> {
        let definitions = self.catalog.get_model(model)?;

        let lookups = definitions.iter().map(|(feature, definition)| async move {
            let outcome = self
                .resolvers
                .resolve(self.store.as_ref(), patient_id, definition, reference)
                .await
                .and_then(|result| extract(&result, reference));
            (feature.clone(), outcome)
        });

        let mut resolved = PatientFeatures::default();
        for (feature, outcome) in join_all(lookups).await {
            match outcome {
                Ok(value) => {
                    resolved.features.insert(feature, value);
                }
                Err(error) => {
                    tracing::warn!("failed to resolve feature '{}': {}", feature, error);
                    resolved.failures.insert(feature, error);
                }
            }
        }

        Ok(resolved)
    }

    /// Score an already-resolved feature map with the named model.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::UnknownModel` for unregistered models, and whatever the
    /// model itself fails with.
    pub fn score(
        &self,
        model: &str,
        features: &mut BTreeMap<String, FeatureValue>,
    ) -> ScoringResult<i64> {
        self.models.get(model)?.score(features)
    }

    /// Resolve a patient's features and score them in one step.
    ///
    /// The score is attached only when every feature resolved; with partial failures the
    /// report carries the resolved features and the per-feature errors, unscored.
    pub async fn score_patient(
        &self,
        patient_id: &str,
        model: &str,
        reference: DateTime<Utc>,
    ) -> ScoringResult<ScoreReport> {
        let PatientFeatures {
            mut features,
            failures,
        } = self.resolve_features(patient_id, model, reference).await?;

        let score = if failures.is_empty() {
            Some(self.score(model, &mut features)?)
        } else {
            None
        };

        Ok(ScoreReport {
            features,
            failures,
            score,
        })
    }
}
