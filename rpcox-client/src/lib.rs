//! Call services on a remote server over HTTP.
//!
//! The protocol itself lives in [`rpcox_jsonrpc`]; this crate only provides the
//! [`HttpTransport`] that carries calls over the network, and [`RpcClients`] for building clients
//! for each service on a server.
mod clients;
mod error;
mod transport;

pub use clients::RpcClients;
pub use error::{ClientError, Result};
pub use rpcox_jsonrpc::{Client, ClientOptions, HeaderProvider, RpcError, rpc_client};
pub use transport::HttpTransport;
