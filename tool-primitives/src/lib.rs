//! Core shared types for toolmesh servers and clients.
//!
//! Everything in this crate crosses the wire: tool names, parameter schemas,
//! catalog entries, and the structured result of an invocation.

#![warn(missing_docs, clippy::pedantic)]

mod catalog;
mod error;
mod invocation;
mod name;

/// Catalog projection of a tool and its parameter schema.
pub use catalog::{ParamType, ParameterSpec, ToolCatalogEntry};
/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Invocation requests, results, and the error-kind taxonomy.
pub use invocation::{ErrorKind, InvocationFailure, InvocationRequest, InvocationResult};
/// Validated tool identifier.
pub use name::ToolName;
