use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tool_primitives::{InvocationRequest, InvocationResult, ToolCatalogEntry};
use tool_registry::ToolRegistry;

/// Something that can list tools and run them by name.
///
/// The dispatch controller only talks to tools through this trait, so it can
/// drive remote servers and in-process registries alike.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Returns the tools available for invocation.
    fn catalog(&self) -> Vec<ToolCatalogEntry>;

    /// Runs a tool. Failures come back as [`InvocationResult::Error`].
    async fn call(&self, request: InvocationRequest) -> InvocationResult;
}

/// Invoker backed by an in-process [`ToolRegistry`].
#[derive(Clone, Debug)]
pub struct LocalInvoker {
    registry: Arc<ToolRegistry>,
}

impl LocalInvoker {
    /// Wraps a shared registry.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ToolInvoker for LocalInvoker {
    fn catalog(&self) -> Vec<ToolCatalogEntry> {
        self.registry.list()
    }

    async fn call(&self, request: InvocationRequest) -> InvocationResult {
        let (name, arguments) = request.into_parts();
        self.registry.invoke(&name, Value::Object(arguments)).await
    }
}
