//! Client side of the tool protocol.
//!
//! [`DiscoveryClient::discover`] fetches the catalog of every configured
//! server and merges them into one name-to-owner mapping. Discovery is
//! all-or-nothing: an unreachable server, a malformed catalog, or a tool name
//! exposed twice fails the whole call. Once discovered, invocations are routed
//! to the owning server through the [`ToolInvoker`] seam, which the dispatch
//! controller consumes.

#![warn(missing_docs, clippy::pedantic)]

mod client;
mod endpoint;
mod invoker;

pub use client::{
    DEFAULT_REQUEST_TIMEOUT, DiscoveredTool, DiscoveryClient, DiscoveryConfig, DiscoveryError,
    DiscoveryResult,
};
pub use endpoint::{EndpointError, ServerEndpoint};
pub use invoker::{LocalInvoker, ToolInvoker};
