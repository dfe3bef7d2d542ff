//! Call methods on server-side services as if they were local, with arguments and results that
//! can be dates, sets, maps, big integers and other values plain JSON can't carry.
//!
//! Everything a service or a caller needs is re-exported here.  The `server` feature adds
//! [`RpcHost`] for serving over TCP; the `client` feature adds [`HttpTransport`] and
//! [`RpcClients`] for calling over the network.
pub use rpcox_jsonrpc::*;

#[cfg(feature = "client")]
pub use rpcox_client::{ClientError, HttpTransport, RpcClients};

#[cfg(feature = "server")]
pub use rpcox_server::{Fallback, HostConfig, HostError, RpcHost};
