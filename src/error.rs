use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type for benchmark operations.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Errors that abort a benchmark or a metrics computation.
#[derive(Debug, Error)]
pub enum BenchError {
    /// A statistic was requested over no data
    #[error("cannot compute statistics over an empty input")]
    EmptyInput,

    /// The price table has no entry for the model
    #[error("no price table entry for model '{0}'")]
    UnknownModel(String),

    /// Suite name is not registered
    #[error("unknown suite '{name}'. Available: {available}")]
    SuiteNotFound { name: String, available: String },

    /// Static configuration is unusable (empty suite, zero concurrency, ...)
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A request-level failure that escaped per-prompt recovery
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Reading a suite, price table or result file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON export or import failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML suite or price table could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Per-request failures surfaced by a [`ChatTransport`](crate::client::ChatTransport).
///
/// These are recovered by the runner: the prompt's sample is marked failed
/// and the suite keeps going.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The client gave up after the configured deadline
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The server or a gateway answered 408/504
    #[error("server timed out (HTTP {0})")]
    ServerTimeout(u16),

    #[error("authentication failed (HTTP {0})")]
    Auth(u16),

    #[error("rate limited by the API")]
    RateLimit,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("connection error: {0}")]
    Connection(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Timeout(_) | TransportError::ServerTimeout(_) => ErrorKind::Timeout,
            TransportError::Auth(_) => ErrorKind::Auth,
            TransportError::RateLimit => ErrorKind::RateLimit,
            TransportError::Malformed(_) => ErrorKind::Malformed,
            TransportError::Status { .. } => ErrorKind::Status,
            TransportError::Connection(_) => ErrorKind::Connection,
        }
    }

    /// Map a non-success HTTP status onto the transport taxonomy.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => TransportError::Auth(status),
            429 => TransportError::RateLimit,
            408 | 504 => TransportError::ServerTimeout(status),
            _ => TransportError::Status { status, body },
        }
    }

    /// Map a reqwest failure; `timeout` is the deadline the request was sent with.
    pub fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(timeout.as_millis() as u64)
        } else if e.is_decode() {
            TransportError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::from_status(status.as_u16(), e.to_string())
        } else {
            TransportError::Connection(e.to_string())
        }
    }
}

/// Serializable classification of a [`TransportError`], stored on failed samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Auth,
    RateLimit,
    Malformed,
    Status,
    Connection,
}
