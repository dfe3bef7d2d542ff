//! Client-specific transports for calling services on remote servers.
//!
//! All of these provide an implementation of [`rpcox_jsonrpc::ClientTransport`], to connect our
//! lower-level protocol implementation to an actual HTTP client.

mod http_client;

pub use http_client::*;
