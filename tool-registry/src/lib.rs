//! Tool definitions and the registry that owns them.
//!
//! A [`ToolRegistry`] is built once at server start-up and then shared. It
//! validates arguments against each tool's declared parameters before the
//! handler runs, and converts every handler fault (including panics) into a
//! structured [`InvocationResult`](tool_primitives::InvocationResult).

#![warn(missing_docs, clippy::pedantic)]

pub mod definition;
pub mod registry;

pub use definition::{ToolArguments, ToolDefinition, ToolDefinitionBuilder, ToolFailure, ToolHandler};
pub use registry::{RegistryError, RegistryResult, ToolRegistry};
