use std::time::Duration;

use thiserror::Error;
use tool_adapters::traits::AdapterError;
use tool_discovery::DiscoveryError;
use tool_primitives::ErrorKind;

use crate::session::{SessionEvent, SessionState};

/// Result alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors surfaced by the dispatch controller.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Controller configuration was invalid.
    #[error("invalid dispatch configuration: {0}")]
    InvalidConfig(&'static str),

    /// Tool discovery failed while connecting.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// The event is not allowed from the current state.
    #[error("invalid session transition from {from} via {event:?}")]
    InvalidTransition {
        /// State prior to the attempted transition.
        from: SessionState,
        /// Event that triggered the failure.
        event: SessionEvent,
    },

    /// The session has ended and accepts no further instructions.
    #[error("session has ended")]
    SessionEnded,

    /// The model kept proposing tool calls past the round limit.
    #[error("no final answer after {limit} model rounds")]
    MaxIterationsExceeded {
        /// Configured round limit.
        limit: usize,
    },

    /// The model did not answer in time.
    #[error("model `{model}` did not answer within {after:?}")]
    ModelTimeout {
        /// Model identifier.
        model: String,
        /// Timeout that elapsed.
        after: Duration,
    },

    /// The model adapter failed.
    #[error("adapter `{provider}` for model `{model}` failed: {source}")]
    Model {
        /// Adapter provider.
        provider: &'static str,
        /// Model identifier.
        model: String,
        /// Underlying adapter error.
        #[source]
        source: AdapterError,
    },
}

impl DispatchError {
    /// Returns the wire-level kind for errors that have one.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Discovery(_) => Some(ErrorKind::DiscoveryError),
            Self::MaxIterationsExceeded { .. } => Some(ErrorKind::MaxIterationsExceeded),
            Self::ModelTimeout { .. } => Some(ErrorKind::Timeout),
            Self::InvalidConfig(_)
            | Self::InvalidTransition { .. }
            | Self::SessionEnded
            | Self::Model { .. } => None,
        }
    }
}
