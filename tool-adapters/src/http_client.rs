//! Shared HTTPS client built on `hyper-rustls`.
//!
//! The `OpenAI` adapter and the weather lookup in `weather-server` both reach
//! public HTTPS endpoints, and both are pointed at plain-HTTP stubs in tests.
//! They therefore share one client that trusts the bundled web PKI roots and
//! still accepts `http://` URLs. Tool discovery talks to local servers only
//! and keeps a plain `hyper::Client`.

use std::sync::Arc;

use hyper::client::HttpConnector;
use hyper::{Body, Client};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use webpki_roots::TLS_SERVER_ROOTS;

/// Client able to reach both `http://` and `https://` URLs.
pub type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

fn web_pki_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));
    roots
}

/// Builds the shared client.
#[must_use]
pub fn build_https_client() -> HyperClient {
    let tls = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(web_pki_roots())
        .with_no_client_auth();

    // Leave `http://` to the inner connector; `https://` goes through rustls.
    let mut http = HttpConnector::new();
    http.enforce_http(false);

    Client::builder().build::<_, Body>(HttpsConnector::from((http, Arc::new(tls))))
}
