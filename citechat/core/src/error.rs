//! Error Types
//!
//! Every failure path in the core leaves the timeline in a well-defined state
//! and hands the error to the caller. Nothing here is retried internally.
//!
//! # Taxonomy
//!
//! - [`TransportError`]: the request itself failed before any streaming began
//! - [`ChatError::TurnNotFound`]: an edit referenced a turn that does not exist
//! - [`ChatError::StreamInterrupted`]: the byte stream broke mid-answer
//!
//! False-positive delimiter matches inside the citation payload are handled by
//! the decoder and never surface as errors.

use thiserror::Error;

/// Failure of a request to the chat backend
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Backend answered with a non-success status
    #[error("backend returned {status}: {reason}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Canonical reason phrase for the status
        reason: String,
    },

    /// Connection-level failure (DNS, TLS, reset, timeout)
    #[error("network error: {0}")]
    Network(String),

    /// A non-streaming response body could not be decoded
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Errors returned by timeline driver operations
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    /// The backend request failed before streaming began
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// `edit_at` referenced a turn id that is not in the timeline
    #[error("message with id {id} not found")]
    TurnNotFound {
        /// The identifier that failed to match
        id: String,
    },

    /// The answer stream failed after it started
    #[error("stream interrupted: {reason}")]
    StreamInterrupted {
        /// Upstream failure description
        reason: String,
    },

    /// Edit or regenerate was requested before any topic exists
    #[error("no active topic; send a message first")]
    NoActiveTopic,

    /// An operation needed a last turn but the timeline is empty
    #[error("timeline is empty")]
    EmptyTimeline,
}

impl From<StreamFailure> for ChatError {
    fn from(failure: StreamFailure) -> Self {
        Self::StreamInterrupted {
            reason: failure.reason,
        }
    }
}

/// Terminal error carried through a fragment stream
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct StreamFailure {
    /// What went wrong upstream
    pub reason: String,
}

impl StreamFailure {
    /// Create a failure with the given reason
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Returned to a fragment producer once the consumer has gone away
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("fragment stream cancelled by consumer")]
pub struct Cancelled;
