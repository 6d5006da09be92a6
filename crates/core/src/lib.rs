//! # qCSI Core
//!
//! Core business logic for the quick COVID-19 severity index service.
//!
//! This crate contains the scoring pipeline and the pieces it is assembled from:
//! - Feature catalog parsing, including alive-window durations
//! - Per-data-type record retrieval strategies over a clinical record store
//! - Value extraction, treatment text mining and score aggregation
//!
//! **No API concerns**: HTTP routing and service interfaces belong in the root binary.

pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod mask;
pub mod resolve;
pub mod score;
pub mod service;

pub use catalog::{AliveWindow, FeatureCatalog, FeatureDefinition, FeatureRow};
pub use config::CoreConfig;
pub use error::{ScoringError, ScoringResult};
pub use extract::{extract, FeatureValue, ScalarValue};
pub use mask::{MaskMart, MaskPattern, MaskType, MiningResult};
pub use resolve::{ResolverKind, ResolverRegistry, ResourceQueryResult};
pub use score::{ModelRegistry, QcsiModel, ScoreModel};
pub use service::{PatientFeatures, ScoreReport, ScoringService};
