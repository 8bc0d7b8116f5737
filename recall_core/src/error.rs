//! Error types for the recall_core library.

use crate::CardId;
use std::io;
use std::time::Duration;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for recall_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad input to add/edit
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown card id
    #[error("Card not found: {0}")]
    NotFound(CardId),

    /// A review session was started with nothing due
    #[error("No cards to review")]
    EmptyQueue,

    /// Illegal review session transition
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// Persistence adapter failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Persistence call did not finish in time
    #[error("Persistence timed out after {0:?}")]
    Timeout(Duration),

    /// State management error
    #[error("State error: {0}")]
    State(String),
}

impl Error {
    /// Whether the caller may retry the failed operation unchanged.
    ///
    /// Only persistence failures qualify; everything else is a programming
    /// or input error that will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Persistence(_) | Error::Timeout(_))
    }

    /// Fold an adapter-level failure into the persistence class.
    pub(crate) fn into_persistence(self) -> Error {
        match self {
            Error::Persistence(_) | Error::Timeout(_) => self,
            other => Error::Persistence(other.to_string()),
        }
    }
}
