//! `get_weather` and `get_currency_value`.

use std::time::Duration;

use async_trait::async_trait;
use hyper::header::USER_AGENT;
use hyper::{Body, Request, Uri};
use serde_json::{Value, json};
use tokio::time::timeout;
use tool_adapters::http_client::HyperClient;
use tool_primitives::{ParamType, ParameterSpec};
use tool_registry::{
    RegistryResult, ToolArguments, ToolDefinition, ToolFailure, ToolHandler, ToolRegistry,
};
use tracing::debug;
use url::form_urlencoded::byte_serialize;

/// Public one-line weather service.
pub const WTTR_BASE_URL: &str = "https://wttr.in";

const USER_AGENT_VALUE: &str = concat!("toolmesh-weather/", env!("CARGO_PKG_VERSION"));

/// USD value of the supported currencies. Unknown codes are worth `0.0`.
const CURRENCY_TABLE: [(&str, f64); 3] = [("USD", 1.0), ("INR", 0.012), ("EUR", 1.09)];

/// Looks up the USD value of a currency code, ignoring case.
#[must_use]
pub fn currency_value(code: &str) -> f64 {
    let code = code.trim().to_ascii_uppercase();
    CURRENCY_TABLE
        .iter()
        .find(|(known, _)| *known == code)
        .map_or(0.0, |(_, value)| *value)
}

/// Client for the wttr.in one-line format.
#[derive(Clone)]
pub struct WeatherService {
    client: HyperClient,
    base_url: String,
    timeout: Duration,
}

impl WeatherService {
    /// Creates a service pointed at [`WTTR_BASE_URL`].
    #[must_use]
    pub fn new(client: HyperClient) -> Self {
        Self {
            client,
            base_url: WTTR_BASE_URL.to_owned(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Points the service at another host, e.g. a local stub.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Sets the upstream request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url_for(&self, location: &str) -> String {
        let encoded: String = byte_serialize(location.as_bytes()).collect();
        format!("{}/{encoded}?format=3", self.base_url)
    }

    /// Fetches the one-line report for `location`.
    ///
    /// # Errors
    ///
    /// Fails for a blank location, an unreachable or slow upstream, and any
    /// non-success status.
    pub async fn current(&self, location: &str) -> Result<String, ToolFailure> {
        let location = location.trim();
        if location.is_empty() {
            return Err(ToolFailure::new("location must not be empty"));
        }
        let uri: Uri = self.url_for(location).parse()?;
        debug!(%uri, "fetching weather");
        let request = Request::get(uri)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .body(Body::empty())?;

        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| {
                ToolFailure::new(format!(
                    "weather service did not answer within {:?}",
                    self.timeout
                ))
            })??;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolFailure::new(format!(
                "Could not fetch weather for {location}. Status: {}",
                status.as_u16()
            )));
        }
        let bytes = hyper::body::to_bytes(response.into_body()).await?;
        Ok(String::from_utf8_lossy(&bytes).trim().to_owned())
    }
}

struct GetWeather {
    service: WeatherService,
}

#[async_trait]
impl ToolHandler for GetWeather {
    async fn call(&self, arguments: ToolArguments) -> Result<Value, ToolFailure> {
        let report = self.service.current(arguments.str("location")?).await?;
        Ok(Value::String(report))
    }
}

/// Builds the registry served by this binary.
///
/// # Errors
///
/// Returns a registry error if a definition is rejected.
pub fn registry(weather: WeatherService) -> RegistryResult<ToolRegistry> {
    let registry = ToolRegistry::new();
    registry.register(
        ToolDefinition::builder("get_weather")?
            .description(
                "Get the current weather for a city or location as a short one-line report.",
            )
            .parameter(
                ParameterSpec::required("location", ParamType::String)
                    .with_description("City name or location to fetch the weather for"),
            )?
            .handler(GetWeather { service: weather })
            .build()?,
    )?;
    registry.register(
        ToolDefinition::builder("get_currency_value")?
            .description("Return the current value of a currency against USD.")
            .parameter(
                ParameterSpec::required("currency_code", ParamType::String)
                    .with_description("ISO currency code (e.g. USD, INR, EUR)"),
            )?
            .handler(|arguments: ToolArguments| async move {
                Ok::<Value, ToolFailure>(json!(currency_value(arguments.str("currency_code")?)))
            })
            .build()?,
    )?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::net::{SocketAddr, TcpListener};

    use hyper::server::conn::AddrStream;
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Response, Server, StatusCode};
    use tool_adapters::http_client::build_https_client;
    use tool_primitives::{ErrorKind, InvocationResult};

    use super::*;

    /// Serves wttr-style replies: `/Paris` answers, anything else is a 404.
    fn stub_wttr() -> SocketAddr {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        let make = make_service_fn(|_conn: &AddrStream| async {
            Ok::<_, Infallible>(service_fn(|req: Request<Body>| async move {
                let reply = if req.uri().path() == "/Paris"
                    && req.uri().query() == Some("format=3")
                {
                    Response::new(Body::from("Paris: ☀️ +21°C\n"))
                } else {
                    let mut missing = Response::new(Body::from("unknown location"));
                    *missing.status_mut() = StatusCode::NOT_FOUND;
                    missing
                };
                Ok::<_, Infallible>(reply)
            }))
        });
        let server = Server::from_tcp(listener).unwrap().serve(make);
        tokio::spawn(server);
        addr
    }

    fn service(addr: SocketAddr) -> WeatherService {
        WeatherService::new(build_https_client()).with_base_url(format!("http://{addr}/"))
    }

    #[test]
    fn currency_table_is_case_insensitive() {
        assert!((currency_value("usd") - 1.0).abs() < f64::EPSILON);
        assert!((currency_value("INR") - 0.012).abs() < f64::EPSILON);
        assert!((currency_value(" eur ") - 1.09).abs() < f64::EPSILON);
        assert!(currency_value("XYZ").abs() < f64::EPSILON);
    }

    #[test]
    fn location_is_url_encoded() {
        let service = WeatherService::new(build_https_client());
        assert_eq!(
            service.url_for("New York"),
            "https://wttr.in/New+York?format=3"
        );
        assert_eq!(
            service.url_for("a/b?c"),
            "https://wttr.in/a%2Fb%3Fc?format=3"
        );
    }

    #[tokio::test]
    async fn weather_report_is_trimmed() {
        let addr = stub_wttr();
        let report = service(addr).current("Paris").await.unwrap();
        assert_eq!(report, "Paris: ☀️ +21°C");
    }

    #[tokio::test]
    async fn upstream_status_becomes_handler_error() {
        let addr = stub_wttr();
        let registry = registry(service(addr)).unwrap();
        let result = registry
            .invoke("get_weather", json!({"location": "Atlantis"}))
            .await;
        match result {
            InvocationResult::Error { kind, message } => {
                assert_eq!(kind, ErrorKind::HandlerError);
                assert!(message.contains("Status: 404"), "{message}");
            }
            InvocationResult::Ok { .. } => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn registry_exposes_both_tools() {
        let registry = registry(WeatherService::new(build_https_client())).unwrap();
        let names: Vec<String> = registry
            .list()
            .iter()
            .map(|entry| entry.name().to_string())
            .collect();
        assert_eq!(names, ["get_weather", "get_currency_value"]);

        let result = registry
            .invoke("get_currency_value", json!({"currency_code": "inr"}))
            .await;
        assert_eq!(result, InvocationResult::ok(0.012));

        let missing = registry.invoke("get_weather", json!({})).await;
        assert_eq!(missing.error_kind(), Some(ErrorKind::InvalidArguments));
    }
}
