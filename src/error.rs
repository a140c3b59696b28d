//! Error types for the recorder.
//!
//! `RecorderError` consolidates every failure mode named in the error-kind
//! table: source/inlet failures, writer misuse, I/O, and control-plane
//! validation. Each variant carries a stable `kind()` string so the control
//! server can echo it in its JSON error envelope without re-deriving it from
//! the `Display` text.

use thiserror::Error;

/// Convenience alias for results using the recorder's error type.
pub type Result<T> = std::result::Result<T, RecorderError>;

#[derive(Error, Debug)]
pub enum RecorderError {
    /// The stream source could not be opened (vanished between discovery and open).
    #[error("stream source unavailable: {0}")]
    SourceUnavailable(String),

    /// An open inlet was permanently severed.
    #[error("stream source lost: {0}")]
    SourceLost(String),

    /// A recoverable, transient failure (time-correction, metadata query).
    #[error("transient failure: {0}")]
    Transient(String),

    /// Writer contract was misused (e.g. samples written before a header).
    #[error("chunk order violation: {0}")]
    OrderViolation(String),

    /// A filesystem or I/O failure, fatal to the writer that hit it.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A control command was issued in a session state that forbids it.
    #[error("invalid state for this operation: {0}")]
    InvalidState(String),

    /// Malformed control message or filename template.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// `start` was requested with no streams selected.
    #[error("no streams selected")]
    NoSelection,

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RecorderError {
    /// Stable machine-readable kind, used as the `error.kind` field in
    /// control-server responses (spec.md §4.6 / §7).
    pub fn kind(&self) -> &'static str {
        match self {
            RecorderError::SourceUnavailable(_) => "SourceUnavailable",
            RecorderError::SourceLost(_) => "SourceLost",
            RecorderError::Transient(_) => "Transient",
            RecorderError::OrderViolation(_) => "OrderViolation",
            RecorderError::Io(_) => "IOError",
            RecorderError::InvalidState(_) => "InvalidState",
            RecorderError::BadRequest(_) => "BadRequest",
            RecorderError::NoSelection => "NoSelection",
            RecorderError::Configuration(_) => "Configuration",
        }
    }
}

impl From<figment::Error> for RecorderError {
    fn from(err: figment::Error) -> Self {
        RecorderError::Configuration(err.to_string())
    }
}
