//! Invocation requests and structured results.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Machine-readable failure category shared by servers, clients, and the
/// dispatch controller.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A tool with the same name is already registered.
    DuplicateTool,
    /// The tool definition itself is malformed.
    InvalidDefinition,
    /// Arguments are missing, undeclared, or of the wrong type.
    InvalidArguments,
    /// The requested tool is not present in the catalog.
    UnknownTool,
    /// The tool handler failed while executing.
    HandlerError,
    /// A configured tool server could not be discovered.
    DiscoveryError,
    /// The remote side did not answer within the configured timeout.
    Timeout,
    /// The request could not be delivered or the reply could not be read.
    Transport,
    /// The dispatch loop hit its iteration bound.
    MaxIterationsExceeded,
}

impl ErrorKind {
    /// Returns the snake-case wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateTool => "duplicate_tool",
            Self::InvalidDefinition => "invalid_definition",
            Self::InvalidArguments => "invalid_arguments",
            Self::UnknownTool => "unknown_tool",
            Self::HandlerError => "handler_error",
            Self::DiscoveryError => "discovery_error",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::MaxIterationsExceeded => "max_iterations_exceeded",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to run a named tool with the supplied arguments.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct InvocationRequest {
    name: String,
    #[serde(default)]
    arguments: Map<String, Value>,
}

impl InvocationRequest {
    /// Creates a request for the named tool.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Returns the requested tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the supplied arguments.
    #[must_use]
    pub fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }

    /// Consumes the request, returning the name and arguments.
    #[must_use]
    pub fn into_parts(self) -> (String, Map<String, Value>) {
        (self.name, self.arguments)
    }
}

/// Failure descriptor carried by [`InvocationResult::Error`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct InvocationFailure {
    /// Failure category.
    pub kind: ErrorKind,
    /// Human-readable detail, preserved from the original fault.
    pub message: String,
}

impl fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of a tool invocation as it travels over the wire.
///
/// Serialises to `{"status":"ok","result":...}` or
/// `{"status":"error","kind":...,"message":...}`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InvocationResult {
    /// The handler completed and produced a value.
    Ok {
        /// Value returned by the handler.
        result: Value,
    },
    /// The invocation failed before or during handler execution.
    Error {
        /// Failure category.
        kind: ErrorKind,
        /// Human-readable detail.
        message: String,
    },
}

impl InvocationResult {
    /// Creates a success result.
    #[must_use]
    pub fn ok(result: impl Into<Value>) -> Self {
        Self::Ok {
            result: result.into(),
        }
    }

    /// Creates a failure result.
    #[must_use]
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// Returns `true` for success results.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// Returns the failure kind, if any.
    #[must_use]
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Ok { .. } => None,
            Self::Error { kind, .. } => Some(*kind),
        }
    }

    /// Converts into a standard `Result`.
    ///
    /// # Errors
    ///
    /// Returns the [`InvocationFailure`] for error results.
    pub fn into_result(self) -> Result<Value, InvocationFailure> {
        match self {
            Self::Ok { result } => Ok(result),
            Self::Error { kind, message } => Err(InvocationFailure { kind, message }),
        }
    }
}

impl From<InvocationFailure> for InvocationResult {
    fn from(value: InvocationFailure) -> Self {
        Self::Error {
            kind: value.kind,
            message: value.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ok_result_wire_shape() {
        let value = serde_json::to_value(InvocationResult::ok(1.0)).unwrap();
        assert_eq!(value, json!({"status": "ok", "result": 1.0}));
    }

    #[test]
    fn error_result_wire_shape() {
        let result = InvocationResult::error(ErrorKind::UnknownTool, "tool `x` is not registered");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "error",
                "kind": "unknown_tool",
                "message": "tool `x` is not registered"
            })
        );

        let parsed: InvocationResult = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.error_kind(), Some(ErrorKind::UnknownTool));
    }

    #[test]
    fn into_result_preserves_failure() {
        let failure = InvocationResult::error(ErrorKind::HandlerError, "boom")
            .into_result()
            .expect_err("error result");
        assert_eq!(failure.kind, ErrorKind::HandlerError);
        assert_eq!(failure.to_string(), "handler_error: boom");
    }

    #[test]
    fn request_defaults_missing_arguments() {
        let request: InvocationRequest =
            serde_json::from_value(json!({"name": "get_weather"})).unwrap();
        assert_eq!(request.name(), "get_weather");
        assert!(request.arguments().is_empty());
    }
}
