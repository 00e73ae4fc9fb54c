//! Runtime registry for tool definitions and invocation.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::{Map, Value};
use thiserror::Error;
use tool_primitives::{ErrorKind, InvocationResult, ToolCatalogEntry};
use tracing::{debug, info};

use crate::definition::{ToolArguments, ToolDefinition};

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Default)]
struct RegistryInner {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

/// Process-local catalog mapping tool names to definitions.
///
/// Listing order is registration order.
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<RegistryInner>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("tool registry poisoned");
        let names: Vec<_> = inner.tools.iter().map(|tool| tool.name().as_str()).collect();
        f.debug_struct("ToolRegistry")
            .field("registered", &names)
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool definition.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTool`] if the name is already present;
    /// the existing registration is left untouched.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn register(&self, definition: ToolDefinition) -> RegistryResult<()> {
        let mut inner = self.inner.write().expect("tool registry poisoned");
        let name = definition.name().as_str().to_owned();
        if inner.index.contains_key(&name) {
            return Err(RegistryError::DuplicateTool { name });
        }

        info!(tool = %name, "tool registered");
        let position = inner.tools.len();
        inner.tools.push(definition);
        inner.index.insert(name, position);
        Ok(())
    }

    /// Returns the definition matching the supplied name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ToolDefinition> {
        let inner = self.inner.read().ok()?;
        inner
            .index
            .get(name)
            .map(|&position| inner.tools[position].clone())
    }

    /// Lists the catalog in registration order.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn list(&self) -> Vec<ToolCatalogEntry> {
        let inner = self.inner.read().expect("tool registry poisoned");
        inner.tools.iter().map(|tool| tool.entry().clone()).collect()
    }

    /// Returns the number of registered tools.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("tool registry poisoned").tools.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validates the arguments and runs the named tool.
    ///
    /// Never fails at the Rust level: unknown tools, invalid arguments, and
    /// handler faults all come back as [`InvocationResult::Error`].
    pub async fn invoke(&self, name: &str, arguments: Value) -> InvocationResult {
        match self.prepare(name, arguments) {
            Ok((definition, arguments)) => definition.run(arguments).await,
            Err(err) => {
                debug!(tool = name, error = %err, "tool invocation rejected");
                InvocationResult::error(err.kind(), err.to_string())
            }
        }
    }

    fn prepare(
        &self,
        name: &str,
        arguments: Value,
    ) -> RegistryResult<(ToolDefinition, ToolArguments)> {
        let definition = self.get(name).ok_or_else(|| RegistryError::UnknownTool {
            name: name.to_owned(),
        })?;
        let arguments = validate_arguments(&definition, arguments)?;
        Ok((definition, arguments))
    }
}

fn validate_arguments(
    definition: &ToolDefinition,
    arguments: Value,
) -> RegistryResult<ToolArguments> {
    let entry = definition.entry();
    let invalid = |reason: String| RegistryError::InvalidArguments {
        tool: entry.name().to_string(),
        reason,
    };

    let arguments = match arguments {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => {
            return Err(invalid(format!(
                "arguments must be a JSON object, got {}",
                json_type(&other)
            )));
        }
    };

    for (key, value) in &arguments {
        let Some(spec) = entry.parameter(key) else {
            return Err(invalid(format!("unexpected argument `{key}`")));
        };
        if value.is_null() && !spec.is_required() {
            continue;
        }
        if !spec.ty().accepts(value) {
            return Err(invalid(format!(
                "argument `{key}` must be of type {}, got {}",
                spec.ty(),
                json_type(value)
            )));
        }
    }

    for spec in entry.parameters().iter().filter(|spec| spec.is_required()) {
        if arguments.get(spec.name()).is_none_or(Value::is_null) {
            return Err(invalid(format!(
                "missing required argument `{}`",
                spec.name()
            )));
        }
    }

    Ok(ToolArguments::new(arguments))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Errors produced by tool registration and invocation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Tool definition failed validation.
    #[error("invalid tool definition: {reason}")]
    InvalidDefinition {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Tool name collided with an existing registration.
    #[error("tool `{name}` is already registered")]
    DuplicateTool {
        /// Name of the offending tool.
        name: String,
    },

    /// Requested tool does not exist.
    #[error("tool `{name}` is not registered")]
    UnknownTool {
        /// Name of the missing tool.
        name: String,
    },

    /// Supplied arguments do not match the declared parameters.
    #[error("invalid arguments for tool `{tool}`: {reason}")]
    InvalidArguments {
        /// Tool being invoked.
        tool: String,
        /// Human-readable reason for rejection.
        reason: String,
    },
}

impl RegistryError {
    /// Creates an invalid-definition error from the supplied reason.
    #[must_use]
    pub fn invalid_definition(reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            reason: reason.into(),
        }
    }

    /// Returns the wire-level error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDefinition { .. } => ErrorKind::InvalidDefinition,
            Self::DuplicateTool { .. } => ErrorKind::DuplicateTool,
            Self::UnknownTool { .. } => ErrorKind::UnknownTool,
            Self::InvalidArguments { .. } => ErrorKind::InvalidArguments,
        }
    }
}

impl From<tool_primitives::Error> for RegistryError {
    fn from(value: tool_primitives::Error) -> Self {
        Self::invalid_definition(value.to_string())
    }
}
