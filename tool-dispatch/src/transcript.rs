//! Append-only conversation record owned by one session.

use serde::Serialize;
use serde_json::Value;
use tool_adapters::traits::{MessageRole, PromptMessage, ToolCallProposal};
use tool_primitives::InvocationResult;

/// One entry in a session transcript.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "turn", rename_all = "snake_case")]
pub enum ConversationTurn {
    /// Instruction submitted by the caller.
    User {
        /// Instruction text.
        content: String,
    },
    /// Final answer produced by the model.
    Assistant {
        /// Answer text.
        content: String,
    },
    /// The model asked for a tool to be run.
    ToolCall {
        /// The proposal as produced by the model.
        proposal: ToolCallProposal,
    },
    /// Outcome of a proposed tool call.
    Tool {
        /// Identifier of the call this answers.
        call_id: String,
        /// Name of the tool that was called.
        tool: String,
        /// Structured outcome.
        result: InvocationResult,
    },
}

impl ConversationTurn {
    /// Returns the chat role of this turn.
    #[must_use]
    pub const fn role(&self) -> MessageRole {
        match self {
            Self::User { .. } => MessageRole::User,
            Self::Assistant { .. } | Self::ToolCall { .. } => MessageRole::Assistant,
            Self::Tool { .. } => MessageRole::Tool,
        }
    }

    /// Renders the turn as text.
    #[must_use]
    pub fn content(&self) -> String {
        match self {
            Self::User { content } | Self::Assistant { content } => content.clone(),
            Self::ToolCall { proposal } => {
                format!("call {}({})", proposal.name(), proposal.arguments())
            }
            Self::Tool { result, .. } => render_result(result),
        }
    }

    pub(crate) fn to_prompt_message(&self) -> PromptMessage {
        match self {
            Self::User { content } => PromptMessage::new(MessageRole::User, content.clone()),
            Self::Assistant { content } => {
                PromptMessage::new(MessageRole::Assistant, content.clone())
            }
            Self::ToolCall { proposal } => PromptMessage::assistant_tool_call(proposal.clone()),
            Self::Tool {
                call_id,
                tool,
                result,
            } => PromptMessage::tool_result(call_id.clone(), tool.clone(), render_result(result)),
        }
    }
}

/// Text the model sees for a tool outcome.
fn render_result(result: &InvocationResult) -> String {
    match result {
        InvocationResult::Ok {
            result: Value::String(text),
        } => text.clone(),
        InvocationResult::Ok { result } => result.to_string(),
        InvocationResult::Error { kind, message } => format!("error ({kind}): {message}"),
    }
}

/// Ordered turns of one session.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    /// Creates an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Drops the turns of an instruction that never completed.
    pub(crate) fn rewind(&mut self, len: usize) {
        self.turns.truncate(len);
    }

    /// Returns the turns in order.
    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Returns the number of turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns `true` when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns the most recent final answer, if any.
    #[must_use]
    pub fn last_answer(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|turn| match turn {
            ConversationTurn::Assistant { content } => Some(content.as_str()),
            _ => None,
        })
    }

    pub(crate) fn prompt_messages(&self) -> Vec<PromptMessage> {
        self.turns
            .iter()
            .map(ConversationTurn::to_prompt_message)
            .collect()
    }
}
