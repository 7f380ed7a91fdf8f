use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Error taxonomy for an ingestion run.
///
/// Per-row failures (`Validation`, `Transform`, `Upsert`) are recorded and
/// dropped by the stage that produced them; the variants here are the ones
/// that surface to the orchestrator.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Retry budget exhausted or a non-retryable HTTP status. Fatal to the run.
    #[error("network error: {0}")]
    Network(String),

    /// The cleaner found no event rows in the payload. Fatal to the run.
    #[error("no calendar rows found in payload")]
    NoRowsFound,

    /// Every chunk failed extraction; zero events produced. Fatal to the run.
    #[error("extraction produced no events: {0}")]
    Extraction(String),

    /// Per-row validation failure. Recorded, row dropped, run continues.
    #[error("validation error: {0}")]
    Validation(String),

    /// Per-row transformation failure. Recorded, row dropped, run continues.
    #[error("transform error: {0}")]
    Transform(String),

    /// Per-row store failure. Recorded, run continues.
    #[error("upsert error: {0}")]
    Upsert(String),

    #[error("cache read error: {0}")]
    CacheRead(String),

    #[error("cache write error: {0}")]
    CacheWrite(String),

    /// Run cancelled by the caller or the per-run timeout.
    #[error("run cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
