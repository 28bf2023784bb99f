//! Error taxonomy shared by all providers.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by provider construction and queries.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Invalid or unsupported configuration, detected before any network I/O.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("tokenization error: {0}")]
    Tokenization(#[from] TokenizationError),
    /// Writing the answer to the output sink failed.
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    pub fn config(message: impl Into<String>) -> Self {
        ProviderError::Configuration(message.into())
    }
}

/// Failures of the outbound backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("stream error: {0}")]
    Stream(String),
    #[error("backend returned no text")]
    EmptyResponse,
    #[error("request cancelled")]
    Cancelled,
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs may carry query parameters; keep them out of messages.
        BackendError::Http(err.without_url())
    }
}

/// The token sizer could not count a text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenizationError {
    #[error("no tokenizer known for model '{0}'")]
    UnknownModel(String),
    #[error("tokenizer failed: {0}")]
    Tokenizer(String),
}
