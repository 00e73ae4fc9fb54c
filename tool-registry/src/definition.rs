//! Tool definitions: catalog metadata paired with an executable handler.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tool_primitives::{
    ErrorKind, InvocationResult, ParameterSpec, ToolCatalogEntry, ToolName,
};
use tracing::{debug, error, warn};

use crate::registry::{RegistryError, RegistryResult};

/// Failure reported by a tool handler.
///
/// Any error type converts into a `ToolFailure` through `?`, keeping only its
/// display text. The registry turns it into a `handler_error` result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolFailure {
    message: String,
}

impl ToolFailure {
    /// Creates a failure from a human-readable message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl<E> From<E> for ToolFailure
where
    E: std::error::Error,
{
    fn from(value: E) -> Self {
        Self::new(value.to_string())
    }
}

/// Validated arguments handed to a tool handler.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolArguments(Map<String, Value>);

impl ToolArguments {
    /// Wraps an argument map.
    #[must_use]
    pub fn new(arguments: Map<String, Value>) -> Self {
        Self(arguments)
    }

    /// Returns the raw value for an argument.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns a string argument.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolFailure`] when the argument is absent or not a string.
    pub fn str(&self, name: &str) -> Result<&str, ToolFailure> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| ToolFailure::new(format!("argument `{name}` must be a string")))
    }

    /// Deserialises the whole argument map into a typed struct.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolFailure`] when the arguments do not fit `T`.
    pub fn parse<T>(&self) -> Result<T, ToolFailure>
    where
        T: DeserializeOwned,
    {
        serde_json::from_value(Value::Object(self.0.clone())).map_err(ToolFailure::from)
    }

    /// Returns the number of supplied arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when no arguments were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the underlying map.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Trait implemented by tool handlers.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the tool with already validated arguments.
    async fn call(&self, arguments: ToolArguments) -> Result<Value, ToolFailure>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Send + Sync + Fn(ToolArguments) -> Fut,
    Fut: Future<Output = Result<Value, ToolFailure>> + Send,
{
    async fn call(&self, arguments: ToolArguments) -> Result<Value, ToolFailure> {
        (self)(arguments).await
    }
}

/// A named, documented, typed function exposed for remote invocation.
#[derive(Clone)]
pub struct ToolDefinition {
    entry: ToolCatalogEntry,
    handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

impl ToolDefinition {
    /// Starts building a definition for the supplied tool name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidDefinition`] if the name is invalid.
    pub fn builder(name: impl Into<String>) -> RegistryResult<ToolDefinitionBuilder> {
        let name = ToolName::new(name).map_err(RegistryError::from)?;
        Ok(ToolDefinitionBuilder {
            name,
            description: String::new(),
            parameters: Vec::new(),
            handler: None,
        })
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &ToolName {
        self.entry.name()
    }

    /// Returns the catalog projection of this definition.
    #[must_use]
    pub fn entry(&self) -> &ToolCatalogEntry {
        &self.entry
    }

    /// Executes the handler, converting failures and panics into a structured
    /// result.
    pub(crate) async fn run(&self, arguments: ToolArguments) -> InvocationResult {
        let name = self.entry.name();
        debug!(tool = %name, arguments = arguments.len(), "invoking tool handler");

        match AssertUnwindSafe(self.handler.call(arguments))
            .catch_unwind()
            .await
        {
            Ok(Ok(value)) => InvocationResult::ok(value),
            Ok(Err(failure)) => {
                warn!(tool = %name, error = %failure, "tool handler failed");
                InvocationResult::error(ErrorKind::HandlerError, failure.message)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(tool = %name, panic = %message, "tool handler panicked");
                InvocationResult::error(
                    ErrorKind::HandlerError,
                    format!("handler panicked: {message}"),
                )
            }
        }
    }
}

/// Builder for [`ToolDefinition`].
pub struct ToolDefinitionBuilder {
    name: ToolName,
    description: String,
    parameters: Vec<ParameterSpec>,
    handler: Option<Arc<dyn ToolHandler>>,
}

impl fmt::Debug for ToolDefinitionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinitionBuilder")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}

impl ToolDefinitionBuilder {
    /// Sets the description used by callers to select the tool.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declares a parameter. Declaration order is preserved in the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidDefinition`] if the parameter name is
    /// blank or already declared.
    pub fn parameter(mut self, parameter: ParameterSpec) -> RegistryResult<Self> {
        if parameter.name().trim().is_empty() {
            return Err(RegistryError::invalid_definition(format!(
                "tool `{}` declares a parameter with an empty name",
                self.name
            )));
        }
        if self
            .parameters
            .iter()
            .any(|existing| existing.name() == parameter.name())
        {
            return Err(RegistryError::invalid_definition(format!(
                "tool `{}` declares parameter `{}` twice",
                self.name,
                parameter.name()
            )));
        }
        self.parameters.push(parameter);
        Ok(self)
    }

    /// Sets the handler invoked for this tool.
    #[must_use]
    pub fn handler<H>(mut self, handler: H) -> Self
    where
        H: ToolHandler + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Finalises the definition.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidDefinition`] if no handler was set.
    pub fn build(self) -> RegistryResult<ToolDefinition> {
        let handler = self.handler.ok_or_else(|| {
            RegistryError::invalid_definition(format!("tool `{}` has no handler", self.name))
        })?;

        let mut entry = ToolCatalogEntry::new(self.name, self.description);
        for parameter in self.parameters {
            entry = entry.with_parameter(parameter)?;
        }

        Ok(ToolDefinition { entry, handler })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
