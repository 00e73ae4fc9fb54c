//! HTTP transport for a [`ToolRegistry`](tool_registry::ToolRegistry).
//!
//! A server binds one registry to one `host:port` and base path and answers
//! two endpoints:
//!
//! - `GET {base}/tools` lists the catalog in registration order;
//! - `POST {base}/tools/{name}/invoke` runs a tool with a JSON-object body.
//!
//! Requests are handled independently; the registry is shared read-only.

#![warn(missing_docs, clippy::pedantic)]

mod routes;
mod server;
pub mod wire;

pub use routes::{Route, normalize_base_path, route};
pub use server::{
    BoundToolServer, DEFAULT_MAX_BODY_BYTES, ServerError, ServerHandle, ServerResult, ToolServer,
};
