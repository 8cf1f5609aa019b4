//! Session Failure Taxonomy
//!
//! Every failure is terminal to the session that produced it and is never
//! retried by the controller. Failures reach the host only as a
//! [`StreamFailure`] passed to the observer; cancellation is not a failure
//! and is never reported.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::category::Category;
use crate::decoder::DecodeError;
use crate::session::SessionId;
use crate::source::SourceError;

/// Where in the session lifecycle a failure happened
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The stream could not be established; nothing was published
    Open,
    /// Reading or decoding failed after the stream was established
    MidStream,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "failed to open stream"),
            Self::MidStream => write!(f, "stream failed mid-stream"),
        }
    }
}

/// Internal error of one session
#[derive(Debug, Error)]
pub enum SessionError {
    /// Opening the stream failed
    #[error("{0}")]
    Open(#[source] SourceError),

    /// A read on the open stream failed
    #[error("{0}")]
    Read(#[source] SourceError),

    /// The byte stream could not be decoded
    #[error("{0}")]
    Decode(#[from] DecodeError),
}

impl SessionError {
    /// Lifecycle phase of the failure
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Open(_) => FailureKind::Open,
            Self::Read(_) | Self::Decode(_) => FailureKind::MidStream,
        }
    }
}

/// Failure descriptor delivered to `on_stream_error`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind} ({category}, {session}): {message}")]
pub struct StreamFailure {
    /// Session that failed
    pub session: SessionId,
    /// Category the session was bound to
    pub category: Category,
    /// Lifecycle phase of the failure
    pub kind: FailureKind,
    /// Human-readable cause
    pub message: String,
}

impl StreamFailure {
    /// Build the descriptor for `error`
    #[must_use]
    pub fn new(session: SessionId, category: Category, error: &SessionError) -> Self {
        Self {
            session,
            category,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}
