//! Error types for the sync layer.

use thiserror::Error;

/// Raised when section data from the catalog fails validation.
///
/// Names the offending field so bad upstream data can be traced; callers must
/// not coerce it into something that looks valid.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Section.{field} is invalid: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    pub fn missing(field: &'static str) -> Self {
        Self::new(field, "undefined or null")
    }
}

/// Errors surfaced by the API client and the autosave orchestrator.
#[derive(Debug, Error, Clone)]
pub enum SyncError {
    /// Network/HTTP request failed
    #[error("Network error: {message}")]
    Network { message: String },

    /// Server answered with a status the endpoint does not expect
    #[error("Unexpected status {status} from {endpoint}: {body}")]
    UnexpectedStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Response body could not be decoded
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// URL parsing/construction failed
    #[error("URL error: {message}")]
    Url { message: String },

    /// Section data failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A card's course string is not `<SUBJECT> <NUMBER>`
    #[error("Invalid course identifier: {course:?}")]
    InvalidCourse { course: String },

    /// No card lives at the given index
    #[error("No course card at index {index}")]
    UnknownCard { index: usize },

    /// An operation needed an active term but none is set
    #[error("No active term")]
    NoTerm,

    /// Configuration file is missing or malformed
    #[error("Config error: {message}")]
    Config { message: String },
}

impl SyncError {
    /// Returns true if this error is potentially transient.
    ///
    /// The sync layer never retries on its own; this is for the calling layer.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network { .. } => true,
            SyncError::UnexpectedStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Parse {
                message: err.to_string(),
            }
        } else {
            SyncError::Network {
                message: err.to_string(),
            }
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::Url {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Parse {
            message: err.to_string(),
        }
    }
}
