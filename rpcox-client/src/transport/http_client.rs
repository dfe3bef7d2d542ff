use bytes::Bytes;
use http::HeaderMap;
use rpcox_jsonrpc::{ClientTransport, HttpReply};

use crate::{ClientError, Result};

/// Transport that POSTs calls over the network with `reqwest`.
///
/// Redirects are followed, up to reqwest's default limit.  URLs must be absolute.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|source| ClientError::BuildClient { source })?;
        Ok(Self::from_client(client))
    }

    /// Use an already-configured client, for things like timeouts, proxies or TLS settings.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ClientTransport for HttpTransport {
    type Error = ClientError;

    async fn post(&self, url: &str, headers: HeaderMap, body: Bytes) -> Result<HttpReply> {
        let response = self
            .client
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|source| ClientError::Send {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        tracing::trace!(%url, status = status.as_u16(), "Received reply");

        let body = response.bytes().await.map_err(|source| ClientError::ReadBody {
            url: url.to_string(),
            source,
        })?;

        Ok(HttpReply { status, headers, body })
    }
}
