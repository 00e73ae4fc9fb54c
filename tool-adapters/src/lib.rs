//! Model adapters used by the dispatch controller.
//!
//! A model adapter receives the conversation so far plus the catalog of
//! callable tools and replies with either a final answer or a single tool-call
//! proposal. The shared interface lives in [`traits`]; [`openai`] talks to the
//! chat-completions API and [`scripted`] replays canned replies.

#![warn(missing_docs, clippy::pedantic)]

pub mod http_client;
pub mod openai;
pub mod scripted;
pub mod traits;
