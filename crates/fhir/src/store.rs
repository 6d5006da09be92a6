//! The record-store capability.

use std::future::Future;
use std::pin::Pin;

use crate::record::Record;
use crate::search::{RecordKind, SearchParams};
use crate::FhirResult;

/// A boxed future, as returned by object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An ordered query/fetch service over clinical records.
///
/// Implementations must return results already filtered, sorted, and limited
/// per the given parameters; callers never re-sort. The trait stays object
/// safe so services can hold an `Arc<dyn RecordStore>` and tests can swap in
/// [`crate::MemoryStore`].
pub trait RecordStore: Send + Sync {
    /// Search for records of one kind.
    fn search(
        &self,
        kind: RecordKind,
        params: SearchParams,
    ) -> BoxFuture<'_, FhirResult<Vec<Record>>>;
}
