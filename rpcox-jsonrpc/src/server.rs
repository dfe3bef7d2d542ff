//! The dispatcher: turns one HTTP request into exactly one HTTP response.
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use tracing::{Instrument, Span, field};

use crate::codec;
use crate::error::panic_err_to_string;
use crate::handler::{self, MethodError, MethodOutcome, Redirect, ResponseHeaders};
use crate::registry::{Registry, RegistryError};
use crate::service::{BoxedService, Route};
use crate::transport::{BoxError, IncomingRequest};
use crate::types::{Envelope, ErrorCode, ErrorResponse, Id, Success};

/// Header set on every response produced by the dispatcher, so that clients and proxies can tell
/// RPC responses from whatever else is served on the same host.
pub const X_RPC: HeaderName = HeaderName::from_static("x-rpc");

const INVALID_REQUEST: &str = "Invalid JSON-RPC request.";
const NOT_FOUND: &str = "Not Found.";

/// Used if even an error envelope can't be serialized, which shouldn't ever happen
const FALLBACK_INTERNAL_ERROR: &[u8] = br#"{"error":{"code":-32603,"message":"Internal Server Error."}}"#;

pub struct ServerBuilder<Stage> {
    stage: Stage,
}

impl Default for ServerBuilder<Stage1> {
    fn default() -> Self {
        Self { stage: Stage1 }
    }
}

impl ServerBuilder<Stage1> {
    /// All services will be registered below this path, like `/rpc`.
    pub fn with_base_path(self, base_path: impl AsRef<str>) -> ServerBuilder<Stage2> {
        ServerBuilder {
            stage: Stage2 {
                registry: Registry::new(base_path),
            },
        }
    }

    pub fn without_base_path(self) -> ServerBuilder<Stage2> {
        self.with_base_path("")
    }

    pub fn with_registry(self, registry: Registry) -> ServerBuilder<Stage2> {
        ServerBuilder {
            stage: Stage2 { registry },
        }
    }
}

impl ServerBuilder<Stage2> {
    pub fn with_service(mut self, path: &str, service: impl Into<BoxedService>) -> Result<Self, RegistryError> {
        self.stage.registry.register(service, path)?;
        Ok(self)
    }

    /// Register each service under `/<name>`
    pub fn with_services<I, N, T>(mut self, services: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (N, T)>,
        N: AsRef<str>,
        T: Into<BoxedService>,
    {
        self.stage.registry.register_all(services)?;
        Ok(self)
    }

    /// Register a service, replacing anything already at that path.
    pub fn replacing_service(mut self, path: &str, service: impl Into<BoxedService>) -> Self {
        self.stage.registry.replace(service, path);
        self
    }

    pub fn build(self) -> Server {
        Server::from_registry(self.stage.registry)
    }
}

#[doc(hidden)]
pub struct Stage1;

#[doc(hidden)]
pub struct Stage2 {
    registry: Registry,
}

/// Serves calls to the services in a [`Registry`].
///
/// Cheap to clone; all clones share the same read-only registry.
#[derive(Clone, Debug)]
pub struct Server {
    registry: Arc<Registry>,
}

impl Server {
    pub fn builder() -> ServerBuilder<Stage1> {
        ServerBuilder::default()
    }

    pub fn from_registry(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Should this request be passed to [`Self::handle`]?  If not, it's someone else's problem.
    pub fn is_handled_route(&self, path: &str) -> bool {
        self.registry.is_handled_route(path)
    }

    /// Handle one HTTP request, producing the response to send back.
    ///
    /// Never fails: every problem, including a panic in the invoked method, is reported to the
    /// caller in the response.
    pub async fn handle<R: IncomingRequest>(&self, request: R) -> Response<Bytes> {
        let span = tracing::debug_span!(
            "rpc",
            route = request.path(),
            method = field::Empty,
            request_id = field::Empty,
            status = field::Empty,
        );

        async move {
            let response = self.dispatch(request).await;
            Span::current().record("status", response.status().as_u16());
            tracing::debug!("Responding");
            response
        }
        .instrument(span)
        .await
    }

    async fn dispatch<R: IncomingRequest>(&self, request: R) -> Response<Bytes> {
        // Unknown paths are rejected before the body is read
        let Some(route) = self.registry.lookup(request.path()).cloned() else {
            tracing::debug!("No service at this route");
            return not_found();
        };

        let (context, body) = match request.into_context().await {
            Ok(parts) => parts,
            Err(e) => {
                let e: BoxError = e.into();
                tracing::warn!(error = %e, "Failed to read request body");
                return envelope_response(
                    StatusCode::BAD_REQUEST,
                    &Envelope::Error(ErrorResponse::message(INVALID_REQUEST)),
                    HeaderMap::new(),
                );
            }
        };

        let request = match Envelope::parse(&body) {
            Ok(Envelope::Request(request)) => request,
            Ok(_) => {
                tracing::debug!("Received a response envelope instead of a request");
                return invalid_request();
            }
            Err(e) => {
                tracing::debug!(error = %e, "Malformed request");
                return invalid_request();
            }
        };

        let id = request.id.unwrap_or_else(Id::mint);
        let span = Span::current();
        span.record("method", request.method.as_str());
        span.record("request_id", field::display(&id));

        if !route.has_method(&request.method) {
            tracing::debug!("No such method");
            return envelope_response(
                StatusCode::NOT_FOUND,
                &Envelope::Error(ErrorResponse::message(format!("Method {} not found.", request.method))),
                HeaderMap::new(),
            );
        }

        let params = match codec::decode_params(request.params, request.meta.as_ref()) {
            Ok(params) => params,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to decode parameters");
                return envelope_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &Envelope::Error(ErrorResponse::with_code(
                        ErrorCode::InvalidParams,
                        format!("Invalid params: {e}"),
                    )),
                    HeaderMap::new(),
                );
            }
        };

        let response_headers = ResponseHeaders::default();
        let call = handler::Request {
            id: id.clone(),
            method: request.method,
            params,
            context: Arc::new(context),
            response_headers: response_headers.clone(),
        };

        // Building the service instance and extracting the handler's arguments happen right here,
        // before there's a future to catch panics in
        let invocation = match std::panic::catch_unwind(AssertUnwindSafe(|| route.invoke(call))) {
            Ok(Some(invocation)) => invocation,
            Ok(None) => return internal_error(),
            Err(panic) => {
                tracing::error!(panic = %panic_err_to_string(panic), "Service construction panicked");
                return internal_error();
            }
        };

        let outcome = match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                tracing::error!(panic = %panic_err_to_string(panic), "Method panicked");
                return internal_error();
            }
        };

        respond(id, outcome, response_headers.take())
    }
}

fn respond(id: Id, outcome: MethodOutcome, headers: HeaderMap) -> Response<Bytes> {
    match outcome {
        MethodOutcome::Value(value) => {
            let encoded = codec::encode(&value);
            envelope_response(
                StatusCode::OK,
                &Envelope::Success(Success::new(id, encoded.json, encoded.meta)),
                headers,
            )
        }
        MethodOutcome::Redirect(redirect) => redirect_response(redirect, headers),
        MethodOutcome::Failed(MethodError::Rpc { code, message, status }) => {
            tracing::debug!(code, %message, "Method failed");
            envelope_response(status, &Envelope::Error(ErrorResponse::structured(code, message)), headers)
        }
        MethodOutcome::Failed(MethodError::InvalidParams { source }) => {
            tracing::debug!(error = %source, "Invalid parameters");
            envelope_response(
                StatusCode::BAD_REQUEST,
                &Envelope::Error(ErrorResponse::with_code(
                    ErrorCode::InvalidParams,
                    format!("Invalid params: {source}"),
                )),
                headers,
            )
        }
        MethodOutcome::Failed(MethodError::Codec(e)) => {
            tracing::error!(error = %e, "Failed to encode method result");
            internal_error()
        }
        MethodOutcome::Failed(MethodError::Internal(e)) => {
            tracing::error!(error = ?e, "Method failed with an internal error");
            internal_error()
        }
    }
}

fn redirect_response(redirect: Redirect, headers: HeaderMap) -> Response<Bytes> {
    let status = StatusCode::from_u16(redirect.status.as_u16());
    let location = HeaderValue::from_str(&redirect.location);

    match (status, location) {
        (Ok(status), Ok(location)) => {
            tracing::debug!(location = %redirect.location, "Redirecting");
            let mut response = Response::new(Bytes::new());
            *response.status_mut() = status;
            let response_headers = response.headers_mut();
            response_headers.extend(headers);
            response_headers.insert(LOCATION, location);
            response_headers.insert(X_RPC, HeaderValue::from_static("1"));
            response
        }
        _ => {
            tracing::error!(location = %redirect.location, "Redirect location is not a valid header value");
            internal_error()
        }
    }
}

fn envelope_response(status: StatusCode, envelope: &Envelope, headers: HeaderMap) -> Response<Bytes> {
    let body = match envelope.to_bytes() {
        Ok(body) => Bytes::from(body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response envelope");
            return internal_error();
        }
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    let response_headers = response.headers_mut();
    response_headers.extend(headers);
    response_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response_headers.insert(X_RPC, HeaderValue::from_static("1"));
    response
}

fn invalid_request() -> Response<Bytes> {
    envelope_response(
        StatusCode::BAD_REQUEST,
        &Envelope::Error(ErrorResponse::message(INVALID_REQUEST)),
        HeaderMap::new(),
    )
}

/// The generic failure response.  Details of what went wrong are logged, never sent.
fn internal_error() -> Response<Bytes> {
    let mut response = Response::new(Bytes::from_static(FALLBACK_INTERNAL_ERROR));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(X_RPC, HeaderValue::from_static("1"));
    response
}

/// Plain transport-level 404, not an RPC envelope
fn not_found() -> Response<Bytes> {
    let mut response = Response::new(Bytes::from_static(NOT_FOUND.as_bytes()));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Instance, Params};
    use crate::service::ServiceDef;
    use crate::testing::{init_test_logging, rpc_post};
    use serde_json::{Value as JsonValue, json};

    struct Echo;

    fn server() -> Server {
        Server::builder()
            .with_base_path("/rpc")
            .with_service(
                "/echo",
                ServiceDef::new("EchoService", |_cx| Echo)
                    .method("echo", |Params((value,)): Params<(codec::RichValue,)>| async move { value })
                    .method("instance", |Instance(_echo): Instance<Echo>| async { true }),
            )
            .unwrap()
            .build()
    }

    fn body_json(response: &Response<Bytes>) -> JsonValue {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[test]
    fn internal_error_fallback_matches_envelope() {
        let envelope = Envelope::Error(ErrorResponse::with_code(ErrorCode::InternalError, "Internal Server Error."));
        assert_eq!(envelope.to_bytes().unwrap(), FALLBACK_INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn echoes_with_meta() {
        init_test_logging();

        let request = json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "echo",
            "params": [["1"]],
            "meta": {"values": {"0": ["set", {"0": ["bigint"]}]}}
        });
        let response = server().handle(rpc_post("/rpc/echo", request.to_string())).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[X_RPC], "1");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(
            body_json(&response),
            json!({"jsonrpc": "2.0", "id": 7, "result": ["1"], "meta": {"values": ["set", {"0": ["bigint"]}]}})
        );
    }

    #[tokio::test]
    async fn missing_id_is_minted() {
        init_test_logging();

        let request = json!({"jsonrpc": "2.0", "id": {"not": "usable"}, "method": "instance", "params": []});
        let response = server().handle(rpc_post("/rpc/echo", request.to_string())).await;
        let body = body_json(&response);

        assert_eq!(body["result"], json!(true));
        let id = body["id"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn unknown_route_is_plain_404() {
        init_test_logging();

        let response = server().handle(rpc_post("/rpc/nope", "not even json")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body().as_ref(), b"Not Found.");
        assert!(response.headers().get(X_RPC).is_none());
    }

    #[tokio::test]
    async fn response_envelopes_are_not_requests() {
        init_test_logging();

        let response = server()
            .handle(rpc_post("/rpc/echo", r#"{"jsonrpc":"2.0","id":1,"result":1}"#))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&response), json!({"error": "Invalid JSON-RPC request."}));
    }

    #[tokio::test]
    async fn undecodable_params() {
        init_test_logging();

        let request = json!({"jsonrpc": "2.0", "id": 1, "method": "echo", "params": ["x"], "meta": {"values": {"0": ["Date"]}}});
        let response = server().handle(rpc_post("/rpc/echo", request.to_string())).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(&response)["error"]["code"], json!(-32602));
    }
}
