use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StockpileError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Resource not found")]
    NotFound,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Entity not found upstream: {0}")]
    EntityNotFound(String),

    #[error("Invalid entity id: {0:?}")]
    InvalidEntity(String),

    #[error("Field {field} is not supported by provider {provider}")]
    UnsupportedField {
        provider: &'static str,
        field: &'static str,
    },

    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Cache write failed for {path}: {source}")]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job panicked: {0}")]
    JobPanicked(String),

    #[error(
        "Unexpected content type from URL {url}. Expected pattern {expected_pattern}, but got Content-Type: {got_content_type}. Content preview: {content_preview}..."
    )]
    UnexpectedContentType {
        url: String,
        expected_pattern: String,
        got_content_type: String,
        content_preview: String,
    },
}

pub type Result<T> = std::result::Result<T, StockpileError>;
