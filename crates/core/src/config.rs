//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and
//! then passed into core services. The intent is to avoid reading process-wide environment
//! variables during request handling, which can lead to inconsistent behaviour in
//! multi-threaded runtimes and test harnesses.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ScoringError, ScoringResult};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    record_store_url: String,
    feature_table_path: PathBuf,
    request_timeout: Duration,
    search_retries: u32,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::InvalidInput` when the record-store URL is empty or the
    /// request timeout is zero.
    pub fn new(
        record_store_url: String,
        feature_table_path: PathBuf,
        request_timeout: Duration,
        search_retries: u32,
    ) -> ScoringResult<Self> {
        if record_store_url.trim().is_empty() {
            return Err(ScoringError::InvalidInput(
                "record_store_url cannot be empty".into(),
            ));
        }
        if request_timeout.is_zero() {
            return Err(ScoringError::InvalidInput(
                "request_timeout cannot be zero".into(),
            ));
        }

        Ok(Self {
            record_store_url,
            feature_table_path,
            request_timeout,
            search_retries,
        })
    }

    pub fn record_store_url(&self) -> &str {
        &self.record_store_url
    }

    pub fn feature_table_path(&self) -> &Path {
        &self.feature_table_path
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn search_retries(&self) -> u32 {
        self.search_retries
    }
}
