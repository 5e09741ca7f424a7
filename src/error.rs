//! Crate-wide error type.
//!
//! Nothing in the tuner core is fatal: estimate failures degrade to a missed
//! tick, rejected user input leaves state untouched. The variants exist so
//! callers can tell which of those happened.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TunerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP {status} from {path}")]
    HttpStatus { status: u16, path: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("catalog is empty, nothing to match against")]
    NoMatch,

    #[error("invalid pitch: {0:?}")]
    InvalidPitch(String),

    #[error("target is managed by auto mode")]
    AutoModeActive,

    #[error("unknown string: {0}")]
    UnknownString(String),

    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),
}

pub type Result<T> = std::result::Result<T, TunerError>;
