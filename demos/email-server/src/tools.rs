//! `send_email`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tool_primitives::{ParamType, ParameterSpec};
use tool_registry::{
    RegistryResult, ToolArguments, ToolDefinition, ToolFailure, ToolHandler, ToolRegistry,
};

use crate::mailer::{Mailer, OutgoingMail};

struct SendEmail {
    mailer: Arc<dyn Mailer>,
}

#[async_trait]
impl ToolHandler for SendEmail {
    async fn call(&self, arguments: ToolArguments) -> Result<Value, ToolFailure> {
        let mail = OutgoingMail {
            to: arguments.str("to")?.to_owned(),
            subject: arguments.str("subject")?.to_owned(),
            body: arguments.str("body")?.to_owned(),
        };
        self.mailer.send(&mail).await?;
        Ok(Value::String(format!(
            "Email sent successfully to {}.",
            mail.to.trim()
        )))
    }
}

/// Builds the registry served by this binary.
///
/// # Errors
///
/// Returns a registry error if the definition is rejected.
pub fn registry(mailer: Arc<dyn Mailer>) -> RegistryResult<ToolRegistry> {
    let registry = ToolRegistry::new();
    registry.register(
        ToolDefinition::builder("send_email")?
            .description("Send a plain-text email to a recipient.")
            .parameter(
                ParameterSpec::required("to", ParamType::String)
                    .with_description("Recipient email address"),
            )?
            .parameter(
                ParameterSpec::required("subject", ParamType::String)
                    .with_description("Email subject"),
            )?
            .parameter(
                ParameterSpec::required("body", ParamType::String)
                    .with_description("Email message body"),
            )?
            .handler(SendEmail { mailer })
            .build()?,
    )?;
    Ok(registry)
}
