//! Configuration for toolmesh servers and the agent controller.
//!
//! One TOML file carries four optional sections (`[server]`, `[client]`,
//! `[model]`, `[mail]`); anything omitted falls back to the defaults of the
//! stock local deployment. Secrets never live in the file: it names the
//! variable holding them and a [`SecretSource`] resolves the value.

#![warn(missing_docs, clippy::pedantic)]

mod error;
pub mod loader;
pub mod schema;
pub mod secrets;

pub use error::{ConfigError, ConfigResult};
pub use schema::{ClientSection, MailSection, ModelSection, ServerSection, ToolMeshConfig};
pub use secrets::{EnvSecrets, SecretSource, StaticSecrets};
