use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("feature {0} has no code")]
    MalformedFeatureRow(String),
    #[error("time format is incorrect, {0}")]
    InvalidAliveWindowFormat(String),
    #[error("model {0} does not exist in the feature table")]
    UnknownModel(String),
    #[error("unknown type of data: {0}")]
    UnsupportedDataType(String),
    #[error("could not find the resources {code} under time {window_start}, no enough data for the patient")]
    DataNotFound {
        code: String,
        window_start: DateTime<Utc>,
    },
    #[error("malformed resource: {0}")]
    MalformedResource(String),
    #[error("the o2 flow rate string \"{0}\" cannot be identified, please fill in the flow rate manually")]
    UnrecognizedFlowRateText(String),
    #[error("invalid timestamp")]
    InvalidTimestamp,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to read feature table: {0}")]
    FeatureTableRead(#[from] csv::Error),
    #[error("invalid device pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("record store error: {0}")]
    Store(#[from] fhir::FhirError),
}

pub type ScoringResult<T> = std::result::Result<T, ScoringError>;
