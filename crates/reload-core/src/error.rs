use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ConnectionState;

/// Broad error category used for caller handling and retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReloadErrorCategory {
    /// Missing or invalid local configuration. Never retried.
    Config,
    /// Opening the channel or announcing startup failed.
    Connection,
    /// Reading from or writing to an open channel failed.
    Transport,
    /// Operation not allowed in the current lifecycle state.
    InvalidState,
    /// Internal bug or invariant break.
    Internal,
}

/// Stable error payload returned from `run` and friends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct ReloadError {
    /// High-level error category.
    pub category: ReloadErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ReloadError {
    /// Construct a new error.
    pub fn new(
        category: ReloadErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn config(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ReloadErrorCategory::Config, code, message)
    }

    pub fn connection(code: impl Into<String>, err: &TransportError) -> Self {
        Self::new(ReloadErrorCategory::Connection, code, err.to_string())
    }

    pub fn transport(code: impl Into<String>, err: &TransportError) -> Self {
        Self::new(ReloadErrorCategory::Transport, code, err.to_string())
    }

    /// Build a standard invalid-state-transition error.
    pub fn invalid_state(current: ConnectionState, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            ReloadErrorCategory::InvalidState,
            "invalid_state_transition",
            format!("cannot run '{action}' while connection is in state {current:?}"),
        )
    }

    /// Whether retrying the failed operation may help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category,
            ReloadErrorCategory::Connection | ReloadErrorCategory::Transport
        )
    }
}

/// Failures reported by a transport handle.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The channel could not be opened.
    #[error("unable to connect: {0}")]
    Connect(#[source] io::Error),
    /// I/O failed on an open channel.
    #[error("transport i/o failed: {0}")]
    Io(#[from] io::Error),
    /// The channel was closed locally or by the peer.
    #[error("transport is closed")]
    Closed,
    /// A frame exceeded the negotiated size limit.
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },
    /// The operation did not finish within its deadline.
    #[error("transport operation timed out")]
    Timeout,
}
