//! Client transport that calls straight into a [`Server`] in the same process.
//!
//! Useful for tests, and for code that wants to call services the same way whether they're local
//! or remote.
use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use http_body_util::Full;

use crate::server::Server;
use crate::transport::{ClientTransport, HttpReply};

#[derive(Clone, Debug)]
pub struct LoopbackTransport {
    server: Server,
}

impl LoopbackTransport {
    pub fn new(server: Server) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &Server {
        &self.server
    }
}

impl ClientTransport for LoopbackTransport {
    type Error = http::uri::InvalidUri;

    /// Redirects are returned as-is, not followed.
    async fn post(&self, url: &str, headers: HeaderMap, body: Bytes) -> Result<HttpReply, Self::Error> {
        let uri: Uri = url.parse()?;

        let mut request = http::Request::new(Full::new(body));
        *request.method_mut() = Method::POST;
        *request.uri_mut() = uri;
        *request.headers_mut() = headers;

        let (parts, body) = self.server.handle(request).await.into_parts();
        Ok(HttpReply {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}
