//! Error types for the network layer.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::definition::ChannelKind;

/// Why a request did not produce a value on the authoritative side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// The channel has no bound action.
    NoHandler,
    /// The action returned an error.
    HandlerFailed,
    /// The action panicked.
    HandlerPanicked,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteErrorKind::NoHandler => write!(f, "no handler"),
            RemoteErrorKind::HandlerFailed => write!(f, "handler failed"),
            RemoteErrorKind::HandlerPanicked => write!(f, "handler panicked"),
        }
    }
}

/// The error half of a request response.
///
/// Produced by the dispatcher and carried back to the invoking side, so a
/// failing handler yields a distinguishable error instead of a hang.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{communicator}.{channel}: {kind}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub communicator: String,
    pub channel: String,
    pub message: String,
}

/// Errors that can occur in the network layer.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Registration or lookup failed.
    #[error(transparent)]
    Core(#[from] trellis_core::Error),

    /// A request operation was attempted on a fire channel, or vice versa.
    #[error("{communicator}.{channel} is a {actual} channel, not a {expected} channel")]
    KindMismatch {
        communicator: String,
        channel: String,
        expected: ChannelKind,
        actual: ChannelKind,
    },

    /// The transport primitive has no inbound callback installed.
    #[error("no handler bound to {communicator}.{channel}")]
    NoHandler {
        communicator: String,
        channel: String,
    },

    /// The authoritative side answered with an error.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// No response arrived in time.
    #[error("{communicator}.{channel} timed out after {after:?}")]
    Timeout {
        communicator: String,
        channel: String,
        after: Duration,
    },

    /// The transport failed for another reason.
    #[error("transport error: {message}")]
    Transport { message: String },
}

impl NetworkError {
    /// The response error, if the remote handler produced one.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            NetworkError::Remote(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type alias for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;
