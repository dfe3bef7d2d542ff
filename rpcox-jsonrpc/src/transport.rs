//! In this crate, the concept of a "transport" abstracts away the details of how calls get to and
//! from the other side.  Every call is a single HTTP POST and its response, so a transport is very
//! simple: on the server side it's the incoming request, and on the client side it's something
//! that can POST bytes to a URL and hand back the reply.
//!
//! You will note that there is no use of axum, warp, or any other Rust HTTP framework.  The
//! server side works with anything that produces [`http::Request`]s, and the client side is
//! implemented over `reqwest` in the `rpcox-client` crate, and over an in-process [`crate::Server`]
//! in [`crate::LoopbackTransport`].
use std::error::Error as StdError;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body_util::BodyExt;

use crate::handler::RequestContext;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// An HTTP request that might be a call to one of the registered services.
pub trait IncomingRequest: Send {
    type Error: Into<BoxError>;

    /// Path component of the request URL.  This is all that's needed to decide whether the request
    /// is an RPC call, so it's available without reading the body.
    fn path(&self) -> &str;

    /// Consume the request, reading the entire body.
    fn into_context(self) -> impl Future<Output = Result<(RequestContext, Bytes), Self::Error>> + Send;
}

impl<B> IncomingRequest for http::Request<B>
where
    B: http_body::Body + Send,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Error = B::Error;

    fn path(&self) -> &str {
        self.uri().path()
    }

    fn into_context(self) -> impl Future<Output = Result<(RequestContext, Bytes), Self::Error>> + Send {
        async move {
            let (parts, body) = self.into_parts();
            let body = body.collect().await?.to_bytes();
            Ok((RequestContext::from_parts(parts), body))
        }
    }
}

/// Whatever came back from the server in reply to a POST.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Client side of a transport: POSTs a request body to a URL and returns the reply.
///
/// HTTP error statuses are a normal [`HttpReply`] rather than an error; the client needs to see the
/// status to report it.  Errors are for when there is no reply at all.  Whether redirects are
/// followed is up to the transport.
pub trait ClientTransport: Send + Sync + 'static {
    type Error: Into<BoxError>;

    fn post(
        &self,
        url: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> impl Future<Output = Result<HttpReply, Self::Error>> + Send;
}
