//! Per-session state machine.

use std::fmt;

use tracing::debug;

use crate::error::{DispatchError, DispatchResult};

/// States a dispatch session moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next instruction.
    Idle,
    /// A model round is outstanding.
    AwaitingModel,
    /// A proposed tool call is outstanding.
    AwaitingTool,
    /// The session is over; no further instructions are accepted.
    Ended,
}

impl SessionState {
    /// Returns `true` once the session has ended.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ended)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::AwaitingModel => "awaiting_model",
            Self::AwaitingTool => "awaiting_tool",
            Self::Ended => "ended",
        })
    }
}

/// Events that drive session transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The caller submitted an instruction.
    Submit,
    /// The model produced a final answer.
    Answered,
    /// The model proposed a tool call.
    ToolProposed,
    /// The proposed tool call finished, successfully or not.
    ToolReturned,
    /// The model round failed or timed out.
    ModelFailed,
    /// The per-instruction round limit was hit.
    LimitReached,
    /// An in-flight instruction was abandoned before it finished.
    Cancelled,
    /// The caller ended the session.
    End,
}

/// Tracks the current [`SessionState`] and rejects illegal moves.
#[derive(Debug, Clone, Copy)]
pub struct SessionLifecycle {
    state: SessionState,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLifecycle {
    /// Starts a lifecycle in [`SessionState::Idle`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Applies an event, returning the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SessionEnded`] for a submission after the
    /// session ended, and [`DispatchError::InvalidTransition`] for any other
    /// event not allowed from the current state.
    pub fn transition(&mut self, event: SessionEvent) -> DispatchResult<SessionState> {
        let next = match (self.state, event) {
            (SessionState::Idle, SessionEvent::Submit)
            | (SessionState::AwaitingTool, SessionEvent::ToolReturned) => {
                Some(SessionState::AwaitingModel)
            }
            (SessionState::AwaitingModel, SessionEvent::Answered | SessionEvent::ModelFailed)
            | (
                SessionState::AwaitingModel | SessionState::AwaitingTool,
                SessionEvent::Cancelled,
            ) => Some(SessionState::Idle),
            (SessionState::AwaitingModel, SessionEvent::ToolProposed) => {
                Some(SessionState::AwaitingTool)
            }
            (SessionState::AwaitingModel, SessionEvent::LimitReached)
            | (_, SessionEvent::End) => Some(SessionState::Ended),
            _ => None,
        };

        let Some(next_state) = next else {
            if self.state.is_terminal() && event == SessionEvent::Submit {
                return Err(DispatchError::SessionEnded);
            }
            return Err(DispatchError::InvalidTransition {
                from: self.state,
                event,
            });
        };

        if next_state != self.state {
            debug!(from = %self.state, to = %next_state, ?event, "session transition");
            self.state = next_state;
        }

        Ok(self.state)
    }
}
