//! Strongly typed configuration sections.

use std::collections::BTreeMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::SecretSource;

/// Complete configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolMeshConfig {
    /// Tool server binding.
    pub server: ServerSection,
    /// Discovery and dispatch settings.
    pub client: ClientSection,
    /// Language model settings.
    pub model: ModelSection,
    /// Email delivery settings.
    pub mail: MailSection,
}

impl ToolMeshConfig {
    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        self.server.validate()?;
        self.client.validate()?;
        self.model.validate()?;
        self.mail.validate()
    }
}

/// `[server]`: where a tool server listens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Interface to bind.
    pub host: String,
    /// Port to bind; `0` picks an ephemeral port.
    pub port: u16,
    /// Base path the endpoints are mounted under.
    pub path: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8000,
            path: "/mcp".to_owned(),
        }
    }
}

impl ServerSection {
    /// Resolves `host:port` to a socket address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the host does not resolve.
    pub fn socket_addr(&self) -> ConfigResult<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|err| ConfigError::invalid("server.host", err.to_string()))?
            .next()
            .ok_or_else(|| {
                ConfigError::invalid("server.host", format!("`{}` did not resolve", self.host))
            })
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::invalid("server.host", "must not be empty"));
        }
        if !self.path.is_empty() && !self.path.starts_with('/') {
            return Err(ConfigError::invalid("server.path", "must start with `/`"));
        }
        Ok(())
    }
}

/// `[client]`: which servers to discover and how long to wait.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSection {
    /// Server name to base URL.
    pub servers: BTreeMap<String, String>,
    /// Timeout for catalog fetches and tool calls, in milliseconds.
    pub tool_timeout_ms: u64,
    /// Timeout for one model round, in milliseconds.
    pub model_timeout_ms: u64,
    /// Model rounds allowed per instruction.
    pub max_iterations: usize,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            servers: BTreeMap::from([
                ("email".to_owned(), "http://127.0.0.1:8001/mcp".to_owned()),
                ("weather".to_owned(), "http://127.0.0.1:8000/mcp".to_owned()),
            ]),
            tool_timeout_ms: 30_000,
            model_timeout_ms: 60_000,
            max_iterations: 8,
        }
    }
}

impl ClientSection {
    /// Returns the tool timeout.
    #[must_use]
    pub const fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    /// Returns the model timeout.
    #[must_use]
    pub const fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }

    /// Returns the round limit, or `None` if it is zero.
    #[must_use]
    pub const fn max_iterations(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.max_iterations)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.servers.is_empty() {
            return Err(ConfigError::invalid(
                "client.servers",
                "at least one server is required",
            ));
        }
        for (name, url) in &self.servers {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid(
                    "client.servers",
                    "server names must not be empty",
                ));
            }
            check_url("client.servers", url, &["http"])
                .map_err(|err| ConfigError::invalid("client.servers", format!("`{name}`: {err}")))?;
        }
        if self.tool_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "client.tool_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.model_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "client.model_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::invalid(
                "client.max_iterations",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// `[model]`: the language model used by the controller.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelSection {
    /// Model identifier.
    pub name: String,
    /// API base URL.
    pub base_url: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Name of the secret holding the API key.
    pub api_key_env: String,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            name: "gpt-3.5-turbo".to_owned(),
            base_url: "https://api.openai.com/".to_owned(),
            temperature: 0.0,
            api_key_env: "OPENAI_API_KEY".to_owned(),
        }
    }
}

impl ModelSection {
    /// Resolves the API key through the supplied source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] when the key is not set.
    pub fn api_key(&self, secrets: &dyn SecretSource) -> ConfigResult<String> {
        secrets
            .secret(&self.api_key_env)
            .ok_or_else(|| ConfigError::MissingSecret {
                name: self.api_key_env.clone(),
            })
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("model.name", "must not be empty"));
        }
        check_url("model.base_url", &self.base_url, &["http", "https"])?;
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::invalid(
                "model.temperature",
                "must be between 0.0 and 2.0",
            ));
        }
        if self.api_key_env.trim().is_empty() {
            return Err(ConfigError::invalid("model.api_key_env", "must not be empty"));
        }
        Ok(())
    }
}

/// `[mail]`: how the email server delivers messages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MailSection {
    /// `From` address on outgoing mail.
    pub sender: String,
    /// Directory receiving one `.eml` file per message.
    pub outbox_dir: PathBuf,
    /// Port the email server binds instead of `[server].port`, so both
    /// demo servers can share one file.
    pub port: u16,
}

impl Default for MailSection {
    fn default() -> Self {
        Self {
            sender: "agent@localhost".to_owned(),
            outbox_dir: PathBuf::from("outbox"),
            port: 8001,
        }
    }
}

impl MailSection {
    fn validate(&self) -> ConfigResult<()> {
        if !self.sender.contains('@') {
            return Err(ConfigError::invalid(
                "mail.sender",
                "must be an email address",
            ));
        }
        if self.outbox_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid("mail.outbox_dir", "must not be empty"));
        }
        Ok(())
    }
}

fn check_url(field: &'static str, input: &str, schemes: &[&str]) -> ConfigResult<()> {
    let url = Url::parse(input).map_err(|err| ConfigError::invalid(field, format!("`{input}`: {err}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::invalid(
            field,
            format!("`{input}` must use one of: {}", schemes.join(", ")),
        ));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::invalid(field, format!("`{input}` has no host")));
    }
    Ok(())
}
