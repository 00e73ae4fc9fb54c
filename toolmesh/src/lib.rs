//! Tool registry, HTTP tool servers, discovery and LLM dispatch.
//!
//! This facade bundles the workspace crates behind feature flags so
//! downstream users can pull in only the pieces they need: a server-only
//! deployment can disable `dispatch`, a controller can disable `server`.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use tool_primitives as primitives;

/// Tool definitions and the in-process registry (enabled by `registry` feature).
#[cfg(feature = "registry")]
pub use tool_registry as registry;

/// HTTP tool server (enabled by `server` feature).
#[cfg(feature = "server")]
pub use tool_server as server;

/// Catalog discovery and remote invocation (enabled by `discovery` feature).
#[cfg(feature = "discovery")]
pub use tool_discovery as discovery;

/// Language model adapters (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use tool_adapters as adapters;

/// Dispatch controller and sessions (enabled by `dispatch` feature).
#[cfg(feature = "dispatch")]
pub use tool_dispatch as dispatch;

/// TOML configuration (enabled by `config` feature).
#[cfg(feature = "config")]
pub use tool_config as config;

/// Tracing subscriber setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use tool_telemetry as telemetry;
