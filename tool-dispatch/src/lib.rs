//! Dispatch controller: turns natural-language instructions into model rounds
//! and tool invocations.
//!
//! A [`DispatchController`] pairs a [`ModelAdapter`](tool_adapters::traits::ModelAdapter)
//! with a [`ToolInvoker`](tool_discovery::ToolInvoker). Each
//! [`DispatchSession`] it creates owns an append-only [`Transcript`] and walks
//! the [`SessionState`] machine:
//!
//! ```text
//! Idle -> AwaitingModel -> AwaitingTool -> AwaitingModel -> ... -> Idle
//!                                   any state -> Ended
//! ```
//!
//! Tool failures are written to the transcript and shown to the model; model
//! failures and the round limit surface as [`DispatchError`]s.

#![warn(missing_docs, clippy::pedantic)]

mod controller;
mod error;
pub mod observer;
pub mod session;
pub mod transcript;

pub use controller::{
    DEFAULT_MAX_ITERATIONS, DEFAULT_MODEL_TIMEOUT, DEFAULT_TOOL_TIMEOUT, DispatchConfig,
    DispatchController, DispatchSession,
};
pub use error::{DispatchError, DispatchResult};
pub use observer::{
    CollectingObserver, DispatchObserver, Exchange, ExchangeOutcome, ToolCallRecord,
    TracingDispatchObserver,
};
pub use session::{SessionEvent, SessionLifecycle, SessionState};
pub use transcript::{ConversationTurn, Transcript};
