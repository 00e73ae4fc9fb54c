//! Hooks notified after every instruction completes.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tool_primitives::{ErrorKind, InvocationResult};
use tracing::{info, warn};

/// One tool call made while answering an instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallRecord {
    /// Tool name as proposed by the model.
    pub tool: String,
    /// Arguments as proposed by the model.
    pub arguments: Value,
    /// Outcome fed back to the model.
    pub result: InvocationResult,
}

/// How an instruction ended.
#[derive(Clone, Debug, PartialEq)]
pub enum ExchangeOutcome {
    /// The model produced a final answer.
    Answered(String),
    /// The instruction failed.
    Failed {
        /// Wire-level kind, when the failure has one.
        kind: Option<ErrorKind>,
        /// Error text.
        message: String,
    },
}

/// Summary of one instruction's processing.
#[derive(Clone, Debug, PartialEq)]
pub struct Exchange {
    /// Instruction text.
    pub instruction: String,
    /// Tool calls in the order they were made.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Number of model rounds used.
    pub model_rounds: usize,
    /// Final outcome.
    pub outcome: ExchangeOutcome,
}

/// Observer notified when an instruction completes.
pub trait DispatchObserver: Send + Sync {
    /// Records a completed exchange.
    fn on_exchange(&self, exchange: &Exchange);
}

/// Observer that logs exchanges through `tracing`.
#[derive(Debug, Default)]
pub struct TracingDispatchObserver;

impl DispatchObserver for TracingDispatchObserver {
    fn on_exchange(&self, exchange: &Exchange) {
        let tools: Vec<&str> = exchange
            .tool_calls
            .iter()
            .map(|call| call.tool.as_str())
            .collect();
        match &exchange.outcome {
            ExchangeOutcome::Answered(answer) => info!(
                instruction = %exchange.instruction,
                rounds = exchange.model_rounds,
                tools = ?tools,
                answer = %answer,
                "instruction answered"
            ),
            ExchangeOutcome::Failed { kind, message } => warn!(
                instruction = %exchange.instruction,
                rounds = exchange.model_rounds,
                tools = ?tools,
                kind = ?kind,
                error = %message,
                "instruction failed"
            ),
        }
    }
}

/// Observer used in tests to capture exchanges.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    exchanges: Mutex<Vec<Exchange>>,
}

impl CollectingObserver {
    /// Creates a new collecting observer.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns and clears the collected exchanges.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex has been poisoned by a previous panic.
    #[must_use]
    pub fn drain(&self) -> Vec<Exchange> {
        let mut lock = self.exchanges.lock().expect("collecting observer poisoned");
        lock.drain(..).collect()
    }
}

impl DispatchObserver for CollectingObserver {
    fn on_exchange(&self, exchange: &Exchange) {
        self.exchanges
            .lock()
            .expect("collecting observer poisoned")
            .push(exchange.clone());
    }
}
