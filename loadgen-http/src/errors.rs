//! HTTP error types

/// Failure to get a response from the target. A response with an error
/// status is not an `HttpError`; callers judge statuses themselves.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(String),

    #[error("Invalid header value for {0}")]
    InvalidHeaderValue(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl HttpError {
    /// The request timed out before a response arrived
    pub fn is_timeout(&self) -> bool {
        matches!(self, HttpError::Transport(e) if e.is_timeout())
    }

    /// The target could not be reached at all
    pub fn is_connect(&self) -> bool {
        matches!(self, HttpError::Transport(e) if e.is_connect())
    }
}
