//! Response bodies and status mapping for the tool protocol.

use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use tool_primitives::{ErrorKind, InvocationResult};

/// Body returned for protocol-level failures (unknown route, wrong method).
///
/// Invocation failures use [`InvocationResult`] instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Human readable error message.
    pub error: String,
    /// Machine readable error code.
    pub code: String,
}

impl ErrorResponse {
    /// Creates an error body.
    #[must_use]
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// HTTP status used to carry an invocation result.
///
/// Handler failures are a normal structured outcome and travel as `200`.
#[must_use]
pub fn status_for(result: &InvocationResult) -> StatusCode {
    match result.error_kind() {
        None | Some(ErrorKind::HandlerError) => StatusCode::OK,
        Some(ErrorKind::UnknownTool) => StatusCode::NOT_FOUND,
        Some(ErrorKind::InvalidArguments) => StatusCode::BAD_REQUEST,
        Some(ErrorKind::Timeout) => StatusCode::GATEWAY_TIMEOUT,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
