//! hyper-based server binding a registry to a network endpoint.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Instant;

use hyper::body::HttpBody;
use hyper::header::{ALLOW, CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tool_primitives::{ErrorKind, InvocationResult};
use tool_registry::ToolRegistry;
use tracing::{debug, info, warn};

use crate::routes::{Route, normalize_base_path, route};
use crate::wire::{ErrorResponse, status_for};

/// Largest invocation body accepted by default (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Result alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors surfaced while binding or running a tool server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind tool server on {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server failed while running.
    #[error("tool server failed: {0}")]
    Serve(#[from] hyper::Error),

    /// The server task ended abnormally.
    #[error("tool server task failed: {reason}")]
    Task {
        /// Context describing the failure.
        reason: String,
    },
}

struct ServerState {
    registry: Arc<ToolRegistry>,
    base_path: String,
    max_body_bytes: usize,
}

/// Tool server configuration prior to binding.
#[derive(Clone)]
pub struct ToolServer {
    registry: Arc<ToolRegistry>,
    base_path: String,
    max_body_bytes: usize,
}

impl fmt::Debug for ToolServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolServer")
            .field("tools", &self.registry.len())
            .field("base_path", &self.base_path)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl ToolServer {
    /// Creates a server for the supplied registry, mounted at `/`.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            base_path: String::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Caps the size of invocation bodies; larger requests get `413`.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Mounts the endpoints under the supplied base path (e.g. `/mcp`).
    #[must_use]
    pub fn with_base_path(mut self, base_path: &str) -> Self {
        self.base_path = normalize_base_path(base_path);
        self
    }

    /// Returns the normalised base path (`""` for the root).
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Binds the listening socket. Port `0` picks an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] when the address is unavailable.
    pub fn bind(self, addr: SocketAddr) -> ServerResult<BoundToolServer> {
        let bind_error = |source| ServerError::Bind { addr, source };
        let listener = TcpListener::bind(addr).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        Ok(BoundToolServer {
            state: Arc::new(ServerState {
                registry: self.registry,
                base_path: self.base_path,
                max_body_bytes: self.max_body_bytes,
            }),
            listener,
            local_addr,
        })
    }
}

/// Tool server with a bound listener, ready to accept connections.
pub struct BoundToolServer {
    state: Arc<ServerState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl fmt::Debug for BoundToolServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundToolServer")
            .field("local_addr", &self.local_addr)
            .field("base_path", &self.state.base_path)
            .finish_non_exhaustive()
    }
}

impl BoundToolServer {
    /// Returns the address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves requests until `signal` resolves, then drains in-flight
    /// connections.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Serve`] if the listener cannot be registered with
    /// the runtime or the server fails while running.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let BoundToolServer {
            state,
            listener,
            local_addr,
        } = self;

        info!(
            %local_addr,
            base_path = %display_base(&state.base_path),
            tools = state.registry.len(),
            "tool server listening"
        );

        let make_service = make_service_fn(move |_conn: &AddrStream| {
            let state = Arc::clone(&state);
            async move {
                Ok::<_, Infallible>(service_fn(move |request| {
                    handle_request(request, Arc::clone(&state))
                }))
            }
        });

        Server::from_tcp(listener)?
            .serve(make_service)
            .with_graceful_shutdown(signal)
            .await?;

        info!(%local_addr, "tool server stopped");
        Ok(())
    }

    /// Runs the server on a background task.
    #[must_use]
    pub fn spawn(self) -> ServerHandle {
        let local_addr = self.local_addr;
        let (shutdown, receiver) = oneshot::channel::<()>();
        let task = tokio::spawn(self.serve_with_shutdown(async move {
            let _ = receiver.await;
        }));

        ServerHandle {
            local_addr,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }
}

/// Handle to a server running on a background task.
///
/// Dropping the handle signals a graceful shutdown.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<ServerResult<()>>>,
}

impl ServerHandle {
    /// Returns the address the server is listening on.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the base URL (`http://host:port`) of the server.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Signals shutdown and waits for the server task to finish.
    ///
    /// # Errors
    ///
    /// Returns the server's own error or [`ServerError::Task`] if the task
    /// panicked.
    pub async fn shutdown(mut self) -> ServerResult<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        match self.task.take() {
            Some(task) => task.await.map_err(|err| ServerError::Task {
                reason: err.to_string(),
            })?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn handle_request(
    request: Request<Body>,
    state: Arc<ServerState>,
) -> Result<Response<Body>, Infallible> {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let response = match route(&method, &path, &state.base_path) {
        Route::Catalog => json_response(StatusCode::OK, &state.registry.list()),
        Route::Invoke(name) => match read_body(request, state.max_body_bytes).await {
            Ok(bytes) => {
                let result = invoke(&bytes, &state.registry, &name).await;
                debug!(tool = %name, ok = result.is_ok(), "tool invocation finished");
                json_response(status_for(&result), &result)
            }
            Err(BodyError::TooLarge) => {
                warn!(tool = %name, limit = state.max_body_bytes, "invocation body too large");
                json_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    &ErrorResponse::new(
                        "payload_too_large",
                        format!("request body exceeds {} bytes", state.max_body_bytes),
                    ),
                )
            }
            Err(BodyError::Read(err)) => {
                warn!(tool = %name, error = %err, "failed to read invocation body");
                let result = InvocationResult::error(
                    ErrorKind::Transport,
                    format!("failed to read request body: {err}"),
                );
                json_response(status_for(&result), &result)
            }
        },
        Route::MethodNotAllowed(allowed) => {
            let mut response = json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                &ErrorResponse::new(
                    "method_not_allowed",
                    format!("{method} is not allowed on {path}"),
                ),
            );
            if let Ok(value) = allowed.as_str().parse::<HeaderValue>() {
                response.headers_mut().insert(ALLOW, value);
            }
            response
        }
        Route::NotFound => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse::new("not_found", format!("nothing is served at {path}")),
        ),
    };

    info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "tool request handled"
    );
    Ok(response)
}

enum BodyError {
    TooLarge,
    Read(hyper::Error),
}

/// Collects the request body, stopping as soon as it exceeds `limit`.
async fn read_body(request: Request<Body>, limit: usize) -> Result<Vec<u8>, BodyError> {
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    if declared.is_some_and(|length| length > u64::try_from(limit).unwrap_or(u64::MAX)) {
        return Err(BodyError::TooLarge);
    }

    let mut body = request.into_body();
    let mut bytes = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(BodyError::Read)?;
        if bytes.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

async fn invoke(bytes: &[u8], registry: &ToolRegistry, name: &str) -> InvocationResult {
    let arguments = if bytes.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => value,
            Err(err) => {
                return InvocationResult::error(
                    ErrorKind::InvalidArguments,
                    format!("request body is not valid JSON: {err}"),
                );
            }
        }
    };

    registry.invoke(name, arguments).await
}

fn json_response<T>(status: StatusCode, body: &T) -> Response<Body>
where
    T: Serialize + ?Sized,
{
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(err) => {
            warn!(error = %err, "failed to encode response body");
            let mut response = Response::new(Body::from("response encoding failed"));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

fn display_base(base_path: &str) -> &str {
    if base_path.is_empty() { "/" } else { base_path }
}
