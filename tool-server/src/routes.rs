//! Request routing for the tool protocol.

use hyper::Method;

/// Resolved destination of an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `GET {base}/tools`.
    Catalog,
    /// `POST {base}/tools/{name}/invoke`.
    Invoke(String),
    /// The path exists but the method does not match.
    MethodNotAllowed(Method),
    /// Nothing is served at this path.
    NotFound,
}

/// Normalises a base path to `""` (root) or `/segment[/segment...]` without a
/// trailing slash.
#[must_use]
pub fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Resolves a request against a normalised base path.
#[must_use]
pub fn route(method: &Method, path: &str, base_path: &str) -> Route {
    let Some(rest) = path.strip_prefix(base_path) else {
        return Route::NotFound;
    };
    if !rest.is_empty() && !rest.starts_with('/') {
        return Route::NotFound;
    }

    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["tools"] => {
            if *method == Method::GET {
                Route::Catalog
            } else {
                Route::MethodNotAllowed(Method::GET)
            }
        }
        ["tools", name, "invoke"] => {
            if *method == Method::POST {
                Route::Invoke((*name).to_owned())
            } else {
                Route::MethodNotAllowed(Method::POST)
            }
        }
        _ => Route::NotFound,
    }
}
