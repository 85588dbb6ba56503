use thiserror::Error;

/// Unified error type for the fetchgate library.
#[derive(Debug, Error)]
pub enum FetchgateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("environment variable not set: {0}")]
    EnvVar(String),

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("invalid header {0}")]
    InvalidHeader(String),

    #[error("server error: {0}")]
    Server(String),
}

pub type Result<T> = std::result::Result<T, FetchgateError>;
