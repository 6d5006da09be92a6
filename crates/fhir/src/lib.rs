//! FHIR wire/boundary support for the qCSI scoring service.
//!
//! This crate is the only place that knows how clinical records travel and
//! what their raw JSON looks like:
//! - untyped [`Record`] wrappers with named path accessors (codings,
//!   components, quantity/string values, timestamp fields)
//! - the [`SearchParams`] query surface and its FHIR REST rendering
//! - the object-safe async [`RecordStore`] trait, with a REST implementation
//!   ([`RestStore`]) and an in-process implementation ([`MemoryStore`]) for
//!   tests and local runs
//!
//! The scoring core treats all of this as an opaque query/fetch service:
//! retrieval *policy* (time windows, fallback cascades, dispatch) lives in
//! `qcsi-core`, never here.

pub mod client;
pub mod memory;
pub mod record;
pub mod search;
pub mod store;

// Re-export facades
pub use client::RestStore;
pub use memory::MemoryStore;
pub use record::Record;
pub use search::{RecordKind, SearchParams, Sort, SortField};
pub use store::{BoxFuture, RecordStore};

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid record JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed search bundle: {0}")]
    MalformedBundle(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
