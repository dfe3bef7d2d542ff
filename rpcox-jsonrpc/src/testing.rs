//! Helpers for testing the RPC implementation.
//!
//! This module is only compiled when `test` is enabled, and is also pulled into the integration
//! tests with a `#[path]` attribute, so it must not refer to anything in `crate::`.
#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::Full;

/// Initialize tracing with a subscriber and some reasonable defaults suitable for enabling log
/// output in tests.
///
/// This is idempotent; it can be called from multiple tests in multiple threads but will only
/// initialize tracing once.
pub fn init_test_logging() {
    use std::sync::OnceLock;

    const DEFAULT_LOG_FILTER: &str = "debug";
    static INIT_LOGGING: OnceLock<()> = OnceLock::new();

    INIT_LOGGING.get_or_init(|| {
        // Another test harness may have installed a subscriber already; that's fine
        let _ = tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
            .with_test_writer()
            .try_init();
    });
}

/// A POST to `path` with the given body, the way a browser client would send a call.
pub fn rpc_post(path: &str, body: impl Into<Bytes>) -> http::Request<Full<Bytes>> {
    let mut request = http::Request::new(Full::new(body.into()));
    *request.method_mut() = http::Method::POST;
    *request.uri_mut() = path.parse().expect("test paths are valid URIs");
    request.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    request
}
