use std::fmt;
use std::str::FromStr;

use hyper::Uri;
use thiserror::Error;
use url::Url;

/// A tool server URL was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid tool server URL `{url}`: {reason}")]
pub struct EndpointError {
    /// URL as supplied.
    pub url: String,
    /// Why it was rejected.
    pub reason: String,
}

/// Base URL of a tool server, e.g. `http://127.0.0.1:8000/mcp`.
///
/// Stored without a trailing slash. Only plain `http://` is accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServerEndpoint {
    base: String,
}

impl ServerEndpoint {
    /// Parses and normalises a server URL.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError`] for unparsable URLs, non-`http` schemes,
    /// missing hosts, or URLs carrying a query or fragment.
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let reject = |reason: &str| EndpointError {
            url: input.to_owned(),
            reason: reason.to_owned(),
        };

        let url = Url::parse(input.trim()).map_err(|err| reject(&err.to_string()))?;
        if url.scheme() != "http" {
            return Err(reject("only http:// tool servers are supported"));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(reject("missing host"));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(reject("query strings and fragments are not allowed"));
        }

        Ok(Self {
            base: url.as_str().trim_end_matches('/').to_owned(),
        })
    }

    /// Returns the normalised base URL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.base
    }

    pub(crate) fn catalog_uri(&self) -> Result<Uri, hyper::http::uri::InvalidUri> {
        format!("{}/tools", self.base).parse()
    }

    pub(crate) fn invoke_uri(&self, tool: &str) -> Result<Uri, hyper::http::uri::InvalidUri> {
        format!("{}/tools/{tool}/invoke", self.base).parse()
    }
}

impl FromStr for ServerEndpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}
