use std::convert::Infallible;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use rpcox_jsonrpc::Server;
use serde::Deserialize;
use tokio::net::TcpListener;

use crate::{HostError, Result};

/// Handler for requests that aren't calls to any registered service.
pub type Fallback =
    Arc<dyn Fn(Request<Incoming>) -> BoxFuture<'static, Response<Full<Bytes>>> + Send + Sync>;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct HostConfig {
    pub bind_addr: SocketAddr,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 3000)),
        }
    }
}

/// An HTTP/1.1 server in front of a [`Server`].
#[derive(Clone)]
pub struct RpcHost {
    server: Server,
    fallback: Fallback,
}

impl RpcHost {
    /// Host `server`, answering every other request with a plain 404.
    pub fn new(server: Server) -> Self {
        Self {
            server,
            fallback: Arc::new(|_: Request<Incoming>| async { not_found() }.boxed()),
        }
    }

    /// Pass requests that aren't RPC calls to `fallback` instead.
    pub fn with_fallback<F, Fut>(mut self, fallback: F) -> Self
    where
        F: Fn(Request<Incoming>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
    {
        self.fallback = Arc::new(move |request| fallback(request).boxed());
        self
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub async fn handle(&self, request: Request<Incoming>) -> Response<Full<Bytes>> {
        if self.server.is_handled_route(request.uri().path()) {
            self.server.handle(request).await.map(Full::new)
        } else {
            tracing::trace!(path = request.uri().path(), "Not an RPC route");
            (self.fallback)(request).await
        }
    }

    pub async fn bind(config: &HostConfig) -> Result<TcpListener> {
        TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| HostError::Bind {
                addr: config.bind_addr,
                source,
            })
    }

    /// Bind to the configured address and serve until an error stops the accept loop.
    pub async fn run(self, config: &HostConfig) -> Result<()> {
        let listener = Self::bind(config).await?;
        self.serve(listener).await
    }

    /// Serve connections from `listener`, each on its own task.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, routes = ?self.server.registry().routes(), "Serving RPC");
        }

        loop {
            let (stream, peer) = listener
                .accept()
                .await
                .map_err(|source| HostError::Accept { source })?;
            tracing::debug!(%peer, "Accepted connection");

            let io = TokioIo::new(stream);
            let host = self.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |request| {
                    let host = host.clone();
                    async move { Ok::<_, Infallible>(host.handle(request).await) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::warn!(%peer, error = %e, "Error serving connection");
                }
            });
        }
    }
}

impl fmt::Debug for RpcHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcHost").field("server", &self.server).finish()
    }
}

fn not_found() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(b"Not Found.")));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}
