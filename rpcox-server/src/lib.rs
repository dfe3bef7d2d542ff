//! Host the services in a [`rpcox_jsonrpc::Server`] on a TCP socket, with hyper.
//!
//! Requests to the server's routes are dispatched to it; anything else goes to a fallback, so an
//! application can serve its own pages from the same port.
mod error;
mod host;

pub use error::{HostError, Result};
pub use host::{Fallback, HostConfig, RpcHost};
