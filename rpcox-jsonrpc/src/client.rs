//! The calling side: a proxy that turns method calls into requests to one service.
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};
use thiserror::Error;
use tracing::{Instrument, field};

use crate::codec::{self, FromRichValue, RichValue};
use crate::handler::IntoParams;
use crate::transport::{BoxError, ClientTransport};
use crate::types::{self, Envelope, ErrorBody, Id};

/// Code reported when the server's error was a bare message with no code of its own
pub const MESSAGE_ERROR_CODE: i64 = 900;

/// Code reported when the server's reply could not be understood
pub const INVALID_RESPONSE_CODE: i64 = 500;

const INVALID_RESPONSE: &str = "Invalid JSON-RPC response.";

/// Members every JavaScript object has.  A JavaScript caller can never invoke these remotely, so
/// neither can we.
const OBJECT_MEMBERS: &[&str] = &[
    "constructor",
    "hasOwnProperty",
    "isPrototypeOf",
    "propertyIsEnumerable",
    "toLocaleString",
    "toString",
    "valueOf",
    "__proto__",
    "__defineGetter__",
    "__defineSetter__",
    "__lookupGetter__",
    "__lookupSetter__",
];

/// The single error type of a failed call, whatever the reason.
///
/// `code` lets callers branch on the kind of failure without inspecting the message: it's the
/// HTTP status for transport-level failures, the server's code for structured errors, and
/// [`MESSAGE_ERROR_CODE`] for bare error messages.  It's `None` when the call never got a reply.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RpcError {
    pub message: String,
    pub code: Option<i64>,
    source: Option<BoxError>,
}

impl RpcError {
    pub fn new(message: impl Into<String>, code: impl Into<Option<i64>>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            source: None,
        }
    }

    fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    fn invalid_response() -> Self {
        Self::new(INVALID_RESPONSE, INVALID_RESPONSE_CODE)
    }
}

/// Source of extra headers for each call, for things like authorization tokens that change over
/// time.
#[async_trait]
pub trait HeaderProvider: Send + Sync {
    async fn headers(&self) -> HeaderMap;
}

#[async_trait]
impl<F> HeaderProvider for F
where
    F: Fn() -> HeaderMap + Send + Sync,
{
    async fn headers(&self) -> HeaderMap {
        self()
    }
}

#[derive(Clone, Default)]
pub struct ClientOptions {
    headers: Option<Arc<dyn HeaderProvider>>,
}

impl ClientOptions {
    /// Ask `provider` for extra headers before every call.  These override the default
    /// `Accept`/`Content-Type` headers if they set them too.
    pub fn with_headers(mut self, provider: impl HeaderProvider + 'static) -> Self {
        self.headers = Some(Arc::new(provider));
        self
    }

    /// Send the same extra headers with every call.
    pub fn with_static_headers(self, headers: HeaderMap) -> Self {
        self.with_headers(move || headers.clone())
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("headers", &self.headers.as_ref().map(|_| "<provider>"))
            .finish()
    }
}

/// Is this a name that can never be called remotely?
pub fn is_reserved_method_name(name: &str) -> bool {
    name.starts_with('$') || name == "toJSON" || OBJECT_MEMBERS.contains(&name)
}

/// A proxy for the service at one URL.
///
/// Any method name can be invoked with [`Self::invoke`] or [`Self::call`]; whether the service
/// actually has such a method is only known once the server replies.  For a typed interface to a
/// particular service, declare one with [`crate::rpc_client!`].
pub struct Client<T> {
    url: String,
    transport: Arc<T>,
    options: ClientOptions,
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            url: self.url.clone(),
            transport: self.transport.clone(),
            options: self.options.clone(),
        }
    }
}

impl<T> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.url)
            .field("options", &self.options)
            .finish()
    }
}

impl<T: ClientTransport> Client<T> {
    pub fn new(url: impl Into<String>, transport: T) -> Self {
        Self::with_shared_transport(url, Arc::new(transport))
    }

    /// A client using a transport that other clients use too
    pub fn with_shared_transport(url: impl Into<String>, transport: Arc<T>) -> Self {
        Self {
            url: url.into(),
            transport,
            options: ClientOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Invoke a method with positional parameters, returning its result.
    pub async fn invoke(&self, method: &str, params: Vec<RichValue>) -> Result<RichValue, RpcError> {
        if is_reserved_method_name(method) {
            return Err(RpcError::new(format!("{method} is not a function"), None));
        }

        let id = Id::mint();
        let span = tracing::debug_span!(
            "rpc_call",
            url = %self.url,
            method,
            request_id = %id,
            status = field::Empty
        );

        self.invoke_inner(id, method, params).instrument(span).await
    }

    /// Invoke a method, converting the parameters and result to and from Rust types.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: IntoParams,
        R: FromRichValue,
    {
        let result = self.invoke(method, params.into_params()).await?;
        R::from_rich_value(result).map_err(|e| {
            RpcError::new(format!("Unexpected result from {method}: {e}"), None).with_source(e)
        })
    }

    async fn invoke_inner(&self, id: Id, method: &str, params: Vec<RichValue>) -> Result<RichValue, RpcError> {
        let (params, meta) = codec::encode_params(params);
        let request = Envelope::Request(types::Request::new(id, method, params, meta));
        let body = request
            .to_bytes()
            .map_err(|e| RpcError::new("Failed to serialize the request", None).with_source(e))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(provider) = &self.options.headers {
            headers.extend(provider.headers().await);
        }

        tracing::debug!("Sending request");
        let reply = self
            .transport
            .post(&self.url, headers, Bytes::from(body))
            .await
            .map_err(|e| {
                let e: BoxError = e.into();
                tracing::debug!(error = %e, "Transport failed");
                RpcError::new(format!("Request failed: {e}"), None).with_source(e)
            })?;
        tracing::Span::current().record("status", reply.status.as_u16());

        if !reply.status.is_success() {
            let reason = reply.status.canonical_reason().unwrap_or(reply.status.as_str());
            tracing::debug!(%reason, "Server replied with an HTTP error");
            return Err(RpcError::new(reason, i64::from(reply.status.as_u16())));
        }

        match Envelope::parse(&reply.body) {
            Ok(Envelope::Error(error)) => {
                tracing::debug!(error = error.error.message(), "Method failed");
                Err(match error.error {
                    ErrorBody::Message(message) => RpcError::new(message, MESSAGE_ERROR_CODE),
                    ErrorBody::Structured(details) => RpcError::new(details.message, details.code),
                })
            }
            Ok(Envelope::Success(success)) => match success.meta {
                Some(meta) if !meta.is_null() => codec::decode(success.result, Some(&meta)).map_err(|e| {
                    tracing::debug!(error = %e, "Failed to decode result");
                    RpcError::invalid_response().with_source(e)
                }),
                _ => Ok(RichValue::from(success.result)),
            },
            Ok(Envelope::Request(_)) => Err(RpcError::invalid_response()),
            Err(e) => {
                tracing::debug!(error = %e, "Unrecognized reply");
                Err(RpcError::invalid_response().with_source(e))
            }
        }
    }
}

/// Declare a typed client for a service.
///
/// ```ignore
/// rpc_client! {
///     /// Client for the greeter
///     pub struct GreeterClient {
///         fn hello(name: String) -> String;
///         fn last_seen as "lastSeen"(name: String) -> Option<DateTime<Utc>>;
///     }
/// }
///
/// let greeter = GreeterClient::new(Client::new("http://localhost/rpc/greeter", transport));
/// assert_eq!(greeter.hello("Ann".into()).await?, "Hello Ann!");
/// ```
///
/// Each method is invoked under its own name unless another is given with `as`.  Parameters must
/// implement [`crate::IntoRichValue`] and the return type [`crate::FromRichValue`]; nothing checks
/// that they match what the service expects.
#[macro_export]
macro_rules! rpc_client {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$method_meta:meta])*
                fn $method:ident $(as $wire_name:literal)? ( $($arg:ident : $arg_ty:ty),* $(,)? ) -> $ret:ty ;
            )*
        }
    ) => {
        $(#[$meta])*
        $vis struct $name<T> {
            client: $crate::Client<T>,
        }

        impl<T> ::std::clone::Clone for $name<T> {
            fn clone(&self) -> Self {
                Self {
                    client: self.client.clone(),
                }
            }
        }

        impl<T: $crate::ClientTransport> $name<T> {
            pub fn new(client: $crate::Client<T>) -> Self {
                Self { client }
            }

            pub fn client(&self) -> &$crate::Client<T> {
                &self.client
            }

            $(
                $(#[$method_meta])*
                pub async fn $method(&self, $($arg: $arg_ty),*) -> ::std::result::Result<$ret, $crate::RpcError> {
                    self.client
                        .call($crate::__rpc_method_name!($method $(, $wire_name)?), ($($arg,)*))
                        .await
                }
            )*
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __rpc_method_name {
    ($method:ident) => {
        stringify!($method)
    };
    ($method:ident, $wire_name:literal) => {
        $wire_name
    };
}
