use std::sync::Arc;

use rpcox_jsonrpc::{Client, ClientOptions};

use crate::{HttpTransport, Result};

/// Builds clients for the services hosted under one base URL, all sharing a single connection
/// pool.
///
/// ```ignore
/// let clients = RpcClients::new("http://localhost:3000/rpc")?;
/// let test = clients.service("Test");
/// let greeting: String = test.call("hello", ("Ann",)).await?;
/// ```
#[derive(Clone, Debug)]
pub struct RpcClients {
    base_url: String,
    transport: Arc<HttpTransport>,
    options: ClientOptions,
}

impl RpcClients {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self::with_transport(base_url, HttpTransport::new()?))
    }

    pub fn with_transport(base_url: impl Into<String>, transport: HttpTransport) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport: Arc::new(transport),
            options: ClientOptions::default(),
        }
    }

    /// Options applied to every client built from now on
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// URL of the named service.  Service routes are lowercase, so the name is too.
    pub fn service_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name.to_lowercase())
    }

    /// Client for the named service
    pub fn service(&self, name: &str) -> Client<HttpTransport> {
        Client::with_shared_transport(self.service_url(name), self.transport.clone())
            .with_options(self.options.clone())
    }
}
