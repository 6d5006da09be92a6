//! Severity score aggregation.
//!
//! A scoring model turns a resolved feature map into an integer severity score. Models are
//! held in a registry keyed by name, so the request layer can dispatch on the model segment
//! of a URL without knowing any model's type.

use std::collections::{BTreeMap, HashMap};

use crate::error::{ScoringError, ScoringResult};
use crate::extract::{FeatureValue, ScalarValue};
use crate::mask::MaskMart;

/// A scoring model.
///
/// `score` may normalize the feature map in place; the caller-visible map shows any
/// normalized values afterwards.
pub trait ScoreModel: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, features: &mut BTreeMap<String, FeatureValue>) -> ScoringResult<i64>;
}

/// The quick COVID-19 severity index.
///
/// Respiratory rate, pulse oximetry and oxygen flow rate each contribute an integer band;
/// the score is their sum. A textual flow rate is first mined for a number through the
/// device mart.
pub struct QcsiModel {
    mask_mart: MaskMart,
}

impl QcsiModel {
    pub fn new(mask_mart: MaskMart) -> Self {
        Self { mask_mart }
    }

    /// Replace a textual `o2_flow_rate` value with the number mined out of it.
    fn normalize_flow_rate(
        &self,
        features: &mut BTreeMap<String, FeatureValue>,
    ) -> ScoringResult<()> {
        let Some(flow_rate) = features.get_mut("o2_flow_rate") else {
            return Ok(());
        };
        let ScalarValue::Text(text) = &flow_rate.value else {
            return Ok(());
        };

        match self.mask_mart.treatment_mining(text) {
            Some(mined) => {
                flow_rate.value = ScalarValue::Num(f64::from(mined.value));
                Ok(())
            }
            None => Err(ScoringError::UnrecognizedFlowRateText(text.clone())),
        }
    }
}

impl ScoreModel for QcsiModel {
    fn name(&self) -> &str {
        "qcsi"
    }

    fn score(&self, features: &mut BTreeMap<String, FeatureValue>) -> ScoringResult<i64> {
        self.normalize_flow_rate(features)?;
        Ok(features
            .iter()
            .map(|(feature, value)| contribution(feature, value))
            .sum())
    }
}

/// One feature's contribution to the qCSI total. Features the model does not
/// know, and values without a numeric reading, contribute nothing.
fn contribution(feature: &str, value: &FeatureValue) -> i64 {
    let Some(value) = value.value.as_f64() else {
        tracing::debug!("feature '{}' is not used for scoring", feature);
        return 0;
    };

    match feature {
        "respiratory_rate" => {
            if value <= 22.0 {
                0
            } else if value >= 28.0 {
                2
            } else {
                1
            }
        }
        "spo2" => {
            if value <= 88.0 {
                5
            } else if value > 92.0 {
                0
            } else {
                2
            }
        }
        "o2_flow_rate" => {
            if value <= 2.0 {
                0
            } else if value >= 5.0 {
                5
            } else {
                4
            }
        }
        other => {
            tracing::debug!("feature '{}' is not used for scoring", other);
            0
        }
    }
}

/// Scoring models keyed by name. Populated at startup; lookups are exact.
#[derive(Default)]
pub struct ModelRegistry {
    models: HashMap<String, Box<dyn ScoreModel>>,
}

impl ModelRegistry {
    pub fn register(&mut self, model: Box<dyn ScoreModel>) {
        self.models.insert(model.name().to_string(), model);
    }

    /// # Errors
    ///
    /// Returns `ScoringError::UnknownModel` for unregistered names.
    pub fn get(&self, name: &str) -> ScoringResult<&dyn ScoreModel> {
        self.models
            .get(name)
            .map(|model| model.as_ref())
            .ok_or_else(|| ScoringError::UnknownModel(name.to_string()))
    }

    /// The production registry: the qCSI model over the standard device mart.
    pub fn standard() -> ScoringResult<Self> {
        let mut registry = Self::default();
        registry.register(Box::new(QcsiModel::new(MaskMart::standard()?)));
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(entries: &[(&str, ScalarValue)]) -> BTreeMap<String, FeatureValue> {
        entries
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    FeatureValue {
                        date: Some("2022-01-19T11:53".to_string()),
                        value: value.clone(),
                    },
                )
            })
            .collect()
    }

    fn model() -> QcsiModel {
        QcsiModel::new(MaskMart::standard().expect("standard mart should build"))
    }

    #[test]
    fn test_score_sums_the_contribution_of_every_feature() {
        let mut features = features(&[
            ("respiratory_rate", ScalarValue::Num(25.0)),
            ("spo2", ScalarValue::Num(90.0)),
            ("o2_flow_rate", ScalarValue::Num(3.0)),
        ]);

        let score = model().score(&mut features).expect("scoring should succeed");

        assert_eq!(score, 7);
    }

    #[test]
    fn test_score_bands_change_exactly_at_the_documented_boundaries() {
        let cases = [
            ("respiratory_rate", 22.0, 0),
            ("respiratory_rate", 28.0, 2),
            ("spo2", 88.0, 5),
            ("spo2", 93.0, 0),
            ("o2_flow_rate", 2.0, 0),
            ("o2_flow_rate", 5.0, 5),
        ];

        for (name, value, expected) in cases {
            let mut features = features(&[(name, ScalarValue::Num(value))]);
            let score = model().score(&mut features).unwrap();
            assert_eq!(score, expected, "{name}={value}");
        }
    }

    #[test]
    fn test_textual_flow_rates_are_mined_and_replaced_in_place() {
        let mut features = features(&[
            ("respiratory_rate", ScalarValue::Num(25.0)),
            ("spo2", ScalarValue::Num(90.0)),
            (
                "o2_flow_rate",
                ScalarValue::Text("O2 nasal 3l/min use".to_string()),
            ),
        ]);

        let score = model().score(&mut features).expect("scoring should succeed");

        assert_eq!(score, 7);
        assert_eq!(features["o2_flow_rate"].value, ScalarValue::Num(3.0));
    }

    #[test]
    fn test_unminable_flow_rate_text_is_an_error() {
        let mut features = features(&[("o2_flow_rate", ScalarValue::Text("room air".to_string()))]);

        let err = model().score(&mut features).expect_err("mining should fail");

        match err {
            ScoringError::UnrecognizedFlowRateText(text) => assert_eq!(text, "room air"),
            _ => panic!("Expected UnrecognizedFlowRateText error"),
        }
    }

    #[test]
    fn test_features_outside_the_model_are_skipped() {
        let mut features = features(&[
            ("respiratory_rate", ScalarValue::Num(25.0)),
            ("temperature", ScalarValue::Num(38.2)),
            ("fio2", ScalarValue::Text(String::new())),
        ]);

        assert_eq!(model().score(&mut features).unwrap(), 1);
    }

    #[test]
    fn test_scoring_without_a_flow_rate_skips_normalization() {
        let mut features = features(&[("spo2", ScalarValue::Num(95.0))]);

        assert_eq!(model().score(&mut features).unwrap(), 0);
    }

    #[test]
    fn test_registry_rejects_unknown_models() {
        let registry = ModelRegistry::standard().expect("standard registry should build");
        assert!(registry.get("qcsi").is_ok());

        let err = registry.get("news2").err().expect("model should be unknown");
        match err {
            ScoringError::UnknownModel(name) => assert_eq!(name, "news2"),
            _ => panic!("Expected UnknownModel error"),
        }
    }
}
