//! REST client for a FHIR record store.
//!
//! Searches are read-only GETs against `{base}/{Kind}` with the rendered
//! query pairs. Responses are searchset bundles; entries are unwrapped into
//! raw [`Record`]s without further interpretation. Each call carries the
//! configured timeout, and transient transport failures are retried a small
//! bounded number of times.

use std::time::Duration;

use serde_json::Value;

use crate::record::Record;
use crate::search::{RecordKind, SearchParams};
use crate::store::{BoxFuture, RecordStore};
use crate::{FhirError, FhirResult};

const RETRY_DELAY: Duration = Duration::from_millis(250);

/// A [`RecordStore`] backed by a FHIR REST endpoint.
pub struct RestStore {
    base_url: String,
    retries: u32,
    http: reqwest::Client,
}

impl RestStore {
    /// Create a new `RestStore`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Root of the FHIR endpoint (e.g. `http://host:8080/fhir`).
    /// * `timeout` - Per-request timeout.
    /// * `retries` - Additional attempts after a retryable failure.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidInput`] for an empty base URL and
    /// [`FhirError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration, retries: u32) -> FhirResult<Self> {
        let base_url = base_url.into();
        if base_url.trim().is_empty() {
            return Err(FhirError::InvalidInput(
                "record store base URL cannot be empty".into(),
            ));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            retries,
            http,
        })
    }

    async fn search_once(
        &self,
        kind: RecordKind,
        params: &SearchParams,
    ) -> FhirResult<Vec<Record>> {
        let url = format!("{}/{}", self.base_url, kind.as_str());
        let response = self
            .http
            .get(&url)
            .query(&params.to_query_pairs())
            .send()
            .await?
            .error_for_status()?;

        let bundle: Value = response.json().await?;
        parse_search_bundle(&bundle)
    }
}

impl RecordStore for RestStore {
    fn search(
        &self,
        kind: RecordKind,
        params: SearchParams,
    ) -> BoxFuture<'_, FhirResult<Vec<Record>>> {
        Box::pin(async move {
            let mut attempt = 0;
            loop {
                match self.search_once(kind, &params).await {
                    Ok(records) => return Ok(records),
                    Err(err) if attempt < self.retries && retryable(&err) => {
                        attempt += 1;
                        tracing::warn!(
                            "record store search for {} failed (attempt {}): {}, retrying",
                            kind,
                            attempt,
                            err
                        );
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                    Err(err) => return Err(err),
                }
            }
        })
    }
}

/// Whether a failed attempt is worth repeating: timeouts, connection
/// failures, and server-side errors. Client-side rejections are not.
fn retryable(err: &FhirError) -> bool {
    match err {
        FhirError::Transport(transport) => {
            transport.is_timeout()
                || transport.is_connect()
                || transport
                    .status()
                    .is_some_and(|status| status.is_server_error())
        }
        _ => false,
    }
}

/// Unwrap a searchset bundle into its entry resources.
fn parse_search_bundle(bundle: &Value) -> FhirResult<Vec<Record>> {
    let resource_type = bundle.get("resourceType").and_then(Value::as_str);
    if resource_type != Some("Bundle") {
        return Err(FhirError::MalformedBundle(format!(
            "expected resourceType Bundle, got {}",
            resource_type.unwrap_or("none")
        )));
    }

    let Some(entries) = bundle.get("entry").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    entries
        .iter()
        .map(|entry| {
            entry
                .get("resource")
                .cloned()
                .map(Record::new)
                .ok_or_else(|| FhirError::MalformedBundle("entry without resource".into()))
        })
        .collect()
}
