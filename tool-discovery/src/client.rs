use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use hyper::body::to_bytes;
use hyper::client::HttpConnector;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Client, Request, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;
use tool_primitives::{ErrorKind, InvocationRequest, InvocationResult, ToolCatalogEntry};
use tracing::{debug, info, warn};

use crate::endpoint::{EndpointError, ServerEndpoint};
use crate::invoker::ToolInvoker;

/// Default timeout applied to catalog fetches and tool calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Result alias for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Errors that abort discovery. Each names the server at fault.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No servers were supplied.
    #[error("no tool servers configured")]
    NoServers,

    /// The same server name was supplied more than once.
    #[error("server `{server}` is configured more than once")]
    DuplicateServer {
        /// Repeated server name.
        server: String,
    },

    /// Server URL could not be used.
    #[error("server `{server}`: {source}")]
    InvalidEndpoint {
        /// Configured server name.
        server: String,
        /// Parse failure.
        #[source]
        source: EndpointError,
    },

    /// The catalog request could not be delivered or read.
    #[error("server `{server}` is unreachable: {reason}")]
    Unreachable {
        /// Configured server name.
        server: String,
        /// Transport detail.
        reason: String,
    },

    /// The server did not answer within the timeout.
    #[error("server `{server}` did not answer within {after:?}")]
    Timeout {
        /// Configured server name.
        server: String,
        /// Timeout that elapsed.
        after: Duration,
    },

    /// The server answered with something other than a catalog.
    #[error("server `{server}` returned a malformed catalog: {reason}")]
    MalformedCatalog {
        /// Configured server name.
        server: String,
        /// Decode or status detail.
        reason: String,
    },

    /// Two servers (or one server twice) expose the same tool name.
    #[error("tool `{tool}` is exposed by both `{first}` and `{second}`")]
    Collision {
        /// Colliding tool name.
        tool: String,
        /// Server that claimed the name first.
        first: String,
        /// Server that claimed it again.
        second: String,
    },
}

impl DiscoveryError {
    /// Returns the wire-level kind. Always [`ErrorKind::DiscoveryError`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::DiscoveryError
    }

    /// Returns the server the failure is attributed to, if any.
    #[must_use]
    pub fn server(&self) -> Option<&str> {
        match self {
            Self::NoServers => None,
            Self::DuplicateServer { server }
            | Self::InvalidEndpoint { server, .. }
            | Self::Unreachable { server, .. }
            | Self::Timeout { server, .. }
            | Self::MalformedCatalog { server, .. } => Some(server),
            Self::Collision { second, .. } => Some(second),
        }
    }
}

/// Discovery client settings.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryConfig {
    request_timeout: Duration,
}

impl DiscoveryConfig {
    /// Creates a configuration with the supplied per-request timeout.
    #[must_use]
    pub const fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub const fn request_timeout(self) -> Duration {
        self.request_timeout
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

/// A catalog entry tagged with the server that owns it.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscoveredTool {
    server: String,
    endpoint: ServerEndpoint,
    entry: ToolCatalogEntry,
}

impl DiscoveredTool {
    /// Returns the owning server's configured name.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Returns the owning server's endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    /// Returns the catalog entry.
    #[must_use]
    pub fn entry(&self) -> &ToolCatalogEntry {
        &self.entry
    }
}

/// Merged view over several tool servers.
pub struct DiscoveryClient {
    http: Client<HttpConnector, Body>,
    config: DiscoveryConfig,
    tools: Vec<DiscoveredTool>,
    index: HashMap<String, usize>,
}

impl fmt::Debug for DiscoveryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryClient")
            .field("config", &self.config)
            .field("tools", &self.index.len())
            .finish_non_exhaustive()
    }
}

impl DiscoveryClient {
    /// Fetches every server's catalog and merges them.
    ///
    /// Servers are merged in name order, so the resulting catalog is
    /// deterministic regardless of the order they were supplied in.
    ///
    /// # Errors
    ///
    /// Returns a [`DiscoveryError`] if any server is invalid, unreachable,
    /// slow, or malformed, or if a tool name is exposed more than once.
    pub async fn discover<I, N, U>(servers: I, config: DiscoveryConfig) -> DiscoveryResult<Self>
    where
        I: IntoIterator<Item = (N, U)>,
        N: Into<String>,
        U: AsRef<str>,
    {
        let mut endpoints = BTreeMap::new();
        for (name, url) in servers {
            let server: String = name.into();
            let endpoint = ServerEndpoint::parse(url.as_ref()).map_err(|source| {
                DiscoveryError::InvalidEndpoint {
                    server: server.clone(),
                    source,
                }
            })?;
            match endpoints.entry(server) {
                Entry::Vacant(slot) => {
                    slot.insert(endpoint);
                }
                Entry::Occupied(slot) => {
                    return Err(DiscoveryError::DuplicateServer {
                        server: slot.key().clone(),
                    });
                }
            }
        }
        if endpoints.is_empty() {
            return Err(DiscoveryError::NoServers);
        }

        let http = Client::new();
        let fetches = endpoints
            .iter()
            .map(|(server, endpoint)| fetch_catalog(&http, server, endpoint, config));
        let catalogs = join_all(fetches).await;

        let mut tools = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for ((server, endpoint), catalog) in endpoints.into_iter().zip(catalogs) {
            let catalog = catalog?;
            info!(
                server = %server,
                endpoint = %endpoint,
                tools = catalog.len(),
                "discovered tool server"
            );
            for entry in catalog {
                let name = entry.name().to_string();
                if let Some(&existing) = index.get(&name) {
                    let first: &DiscoveredTool = &tools[existing];
                    return Err(DiscoveryError::Collision {
                        tool: name,
                        first: first.server.clone(),
                        second: server,
                    });
                }
                index.insert(name, tools.len());
                tools.push(DiscoveredTool {
                    server: server.clone(),
                    endpoint: endpoint.clone(),
                    entry,
                });
            }
        }

        Ok(Self {
            http,
            config,
            tools,
            index,
        })
    }

    /// Returns the merged catalog: by server name, then each server's own
    /// listing order.
    #[must_use]
    pub fn tools(&self) -> &[DiscoveredTool] {
        &self.tools
    }

    /// Looks up a discovered tool by name.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&DiscoveredTool> {
        self.index.get(name).map(|&position| &self.tools[position])
    }

    /// Returns the number of discovered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` when the servers expose no tools at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invokes a tool on its owning server.
    ///
    /// Unknown names fail with [`ErrorKind::UnknownTool`] without touching the
    /// network. Error bodies returned by the server are passed through.
    pub async fn invoke(&self, request: InvocationRequest) -> InvocationResult {
        let Some(tool) = self.tool(request.name()) else {
            debug!(tool = request.name(), "tool not in discovered catalog");
            return InvocationResult::error(
                ErrorKind::UnknownTool,
                format!("tool `{}` is not in the discovered catalog", request.name()),
            );
        };

        let started = Instant::now();
        let result = self.post_invocation(tool, request).await;
        debug!(
            tool = %tool.entry.name(),
            server = %tool.server,
            ok = result.is_ok(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "tool call finished"
        );
        result
    }

    async fn post_invocation(
        &self,
        tool: &DiscoveredTool,
        request: InvocationRequest,
    ) -> InvocationResult {
        let transport = |reason: String| {
            warn!(tool = %tool.entry.name(), server = %tool.server, %reason, "tool call failed");
            InvocationResult::error(ErrorKind::Transport, reason)
        };

        let uri = match tool.endpoint.invoke_uri(tool.entry.name().as_str()) {
            Ok(uri) => uri,
            Err(err) => return transport(format!("invalid invoke URL: {err}")),
        };
        let (_, arguments) = request.into_parts();
        let body = match serde_json::to_vec(&Value::Object(arguments)) {
            Ok(body) => body,
            Err(err) => return transport(format!("failed to encode arguments: {err}")),
        };
        let http_request = match Request::post(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
        {
            Ok(request) => request,
            Err(err) => return transport(format!("failed to build request: {err}")),
        };

        let after = self.config.request_timeout;
        let exchange = async {
            let response = self.http.request(http_request).await?;
            let status = response.status();
            let bytes = to_bytes(response.into_body()).await?;
            Ok::<_, hyper::Error>((status, bytes))
        };

        let (status, bytes) = match timeout(after, exchange).await {
            Err(_) => {
                warn!(tool = %tool.entry.name(), server = %tool.server, ?after, "tool call timed out");
                return InvocationResult::error(
                    ErrorKind::Timeout,
                    format!(
                        "tool `{}` on server `{}` did not answer within {after:?}",
                        tool.entry.name(),
                        tool.server
                    ),
                );
            }
            Ok(Err(err)) => return transport(format!("request to `{}` failed: {err}", tool.server)),
            Ok(Ok(reply)) => reply,
        };

        match serde_json::from_slice::<InvocationResult>(&bytes) {
            Ok(result) => result,
            Err(err) => transport(format!(
                "server `{}` answered {status} with an unparsable body: {err}",
                tool.server
            )),
        }
    }
}

#[async_trait]
impl ToolInvoker for DiscoveryClient {
    fn catalog(&self) -> Vec<ToolCatalogEntry> {
        self.tools.iter().map(|tool| tool.entry.clone()).collect()
    }

    async fn call(&self, request: InvocationRequest) -> InvocationResult {
        self.invoke(request).await
    }
}

async fn fetch_catalog(
    http: &Client<HttpConnector, Body>,
    server: &str,
    endpoint: &ServerEndpoint,
    config: DiscoveryConfig,
) -> DiscoveryResult<Vec<ToolCatalogEntry>> {
    let unreachable = |reason: String| DiscoveryError::Unreachable {
        server: server.to_owned(),
        reason,
    };

    let uri = endpoint
        .catalog_uri()
        .map_err(|err| unreachable(format!("invalid catalog URL: {err}")))?;
    debug!(server, %uri, "fetching tool catalog");

    let exchange = async {
        let response = http.get(uri).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body()).await?;
        Ok::<_, hyper::Error>((status, bytes))
    };

    let after = config.request_timeout;
    let (status, bytes) = timeout(after, exchange)
        .await
        .map_err(|_| DiscoveryError::Timeout {
            server: server.to_owned(),
            after,
        })?
        .map_err(|err| unreachable(err.to_string()))?;

    if status != StatusCode::OK {
        return Err(DiscoveryError::MalformedCatalog {
            server: server.to_owned(),
            reason: format!("catalog request answered {status}"),
        });
    }

    serde_json::from_slice(&bytes).map_err(|err| DiscoveryError::MalformedCatalog {
        server: server.to_owned(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::net::{SocketAddr, TcpListener};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use hyper::Response;
    use hyper::server::conn::AddrStream;
    use hyper::service::{make_service_fn, service_fn};
    use serde_json::{Map, json};
    use tool_primitives::{ParamType, ParameterSpec};
    use tool_registry::{ToolArguments, ToolDefinition, ToolFailure, ToolRegistry};
    use tool_server::{ServerHandle, ToolServer};

    fn localhost() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn echo_tool(name: &str) -> ToolDefinition {
        ToolDefinition::builder(name)
            .unwrap()
            .description("Echoes its input")
            .parameter(ParameterSpec::required("text", ParamType::String))
            .unwrap()
            .handler(|args: ToolArguments| async move {
                Ok::<Value, ToolFailure>(Value::from(args.str("text")?))
            })
            .build()
            .unwrap()
    }

    fn serve(tools: Vec<ToolDefinition>) -> ServerHandle {
        let registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool).unwrap();
        }
        ToolServer::new(Arc::new(registry))
            .with_base_path("/mcp")
            .bind(localhost())
            .unwrap()
            .spawn()
    }

    fn mcp_url(handle: &ServerHandle) -> String {
        format!("{}/mcp", handle.url())
    }

    fn text(value: &str) -> Map<String, Value> {
        let mut arguments = Map::new();
        arguments.insert("text".into(), json!(value));
        arguments
    }

    fn closed_port_url() -> String {
        let listener = TcpListener::bind(localhost()).unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    fn serve_raw(body: &'static str) -> SocketAddr {
        let listener = TcpListener::bind(localhost()).unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        let make_service = make_service_fn(move |_conn: &AddrStream| async move {
            Ok::<_, Infallible>(service_fn(move |_request: hyper::Request<Body>| async move {
                Ok::<_, Infallible>(Response::new(Body::from(body)))
            }))
        });
        let server = hyper::Server::from_tcp(listener).unwrap().serve(make_service);
        tokio::spawn(server);
        addr
    }

    #[tokio::test]
    async fn merges_disjoint_catalogs_in_server_order() {
        let weather = serve(vec![echo_tool("get_weather"), echo_tool("get_currency_value")]);
        let email = serve(vec![echo_tool("send_email")]);

        let client = DiscoveryClient::discover(
            [("weather", mcp_url(&weather)), ("email", mcp_url(&email))],
            DiscoveryConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(client.len(), 3);
        let names: Vec<_> = client
            .tools()
            .iter()
            .map(|tool| (tool.server(), tool.entry().name().as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("email", "send_email"),
                ("weather", "get_weather"),
                ("weather", "get_currency_value"),
            ]
        );
        assert_eq!(client.tool("send_email").unwrap().server(), "email");
        assert_eq!(ToolInvoker::catalog(&client).len(), 3);
    }

    #[tokio::test]
    async fn overlapping_names_fail_discovery() {
        let a = serve(vec![echo_tool("get_weather")]);
        let b = serve(vec![echo_tool("get_weather")]);

        let err = DiscoveryClient::discover(
            [("alpha", mcp_url(&a)), ("beta", mcp_url(&b))],
            DiscoveryConfig::default(),
        )
        .await
        .expect_err("collision");

        match err {
            DiscoveryError::Collision {
                tool,
                first,
                second,
            } => {
                assert_eq!(tool, "get_weather");
                assert_eq!(first, "alpha");
                assert_eq!(second, "beta");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_server_fails_discovery() {
        let up = serve(vec![echo_tool("get_weather")]);
        let err = DiscoveryClient::discover(
            [("up", mcp_url(&up)), ("down", closed_port_url())],
            DiscoveryConfig::default(),
        )
        .await
        .expect_err("unreachable");

        assert!(matches!(err, DiscoveryError::Unreachable { .. }));
        assert_eq!(err.server(), Some("down"));
        assert_eq!(err.kind(), ErrorKind::DiscoveryError);
    }

    #[tokio::test]
    async fn malformed_catalog_fails_discovery() {
        let addr = serve_raw("<html>not a catalog</html>");
        let err = DiscoveryClient::discover(
            [("junk", format!("http://{addr}"))],
            DiscoveryConfig::default(),
        )
        .await
        .expect_err("malformed");
        assert!(matches!(err, DiscoveryError::MalformedCatalog { .. }));
    }

    #[tokio::test]
    async fn invalid_endpoint_and_empty_config() {
        let err = DiscoveryClient::discover([("bad", "ftp://x")], DiscoveryConfig::default())
            .await
            .expect_err("invalid");
        assert!(matches!(err, DiscoveryError::InvalidEndpoint { .. }));

        let none: [(&str, &str); 0] = [];
        let err = DiscoveryClient::discover(none, DiscoveryConfig::default())
            .await
            .expect_err("empty");
        assert!(matches!(err, DiscoveryError::NoServers));
    }

    #[tokio::test]
    async fn repeated_server_name_is_rejected() {
        let err = DiscoveryClient::discover(
            [
                ("weather", "http://127.0.0.1:8000/mcp"),
                ("weather", "http://127.0.0.1:9000/mcp"),
            ],
            DiscoveryConfig::default(),
        )
        .await
        .expect_err("duplicate name");
        assert!(matches!(
            &err,
            DiscoveryError::DuplicateServer { server } if server == "weather"
        ));
        assert_eq!(err.server(), Some("weather"));
    }

    #[tokio::test]
    async fn routes_calls_and_passes_errors_through() {
        let server = serve(vec![echo_tool("echo")]);
        let client = DiscoveryClient::discover(
            [("local", mcp_url(&server))],
            DiscoveryConfig::default(),
        )
        .await
        .unwrap();

        let result = client.invoke(InvocationRequest::new("echo", text("hi"))).await;
        assert_eq!(result, InvocationResult::ok("hi"));

        let result = client
            .invoke(InvocationRequest::new("echo", Map::new()))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidArguments));
    }

    #[tokio::test]
    async fn unknown_tool_needs_no_round_trip() {
        let server = serve(vec![echo_tool("echo")]);
        let client = DiscoveryClient::discover(
            [("local", mcp_url(&server))],
            DiscoveryConfig::default(),
        )
        .await
        .unwrap();
        server.shutdown().await.unwrap();

        let result = client
            .invoke(InvocationRequest::new("nope", Map::new()))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::UnknownTool));

        let result = client.invoke(InvocationRequest::new("echo", text("hi"))).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::Transport));
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let slow = ToolDefinition::builder("slow")
            .unwrap()
            .handler(move |_args: ToolArguments| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<Value, ToolFailure>(Value::Null)
                }
            })
            .build()
            .unwrap();
        let server = serve(vec![slow]);
        let client = DiscoveryClient::discover(
            [("local", mcp_url(&server))],
            DiscoveryConfig::new(Duration::from_millis(200)),
        )
        .await
        .unwrap();

        let started = Instant::now();
        let result = client
            .invoke(InvocationRequest::new("slow", Map::new()))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::Timeout));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
