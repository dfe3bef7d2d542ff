//! An RPC protocol for calling services over HTTP, wire-compatible with JavaScript clients and
//! servers that speak JSON-RPC 2.0 with `superjson`-encoded parameters and results.
//!
//! Every call is a single HTTP POST of a request envelope to the service's URL; the response is
//! a success or error envelope.  Values that plain JSON can't represent (dates, sets, maps,
//! `undefined`, big integers and the like) travel as plain JSON plus a side-channel of type
//! annotations, see [`codec`].
//!
//! The server side is [`Server`], which dispatches requests to the services in a [`Registry`].
//! The client side is [`Client`], which works over any [`ClientTransport`].  Neither depends on a
//! particular HTTP stack; see the `rpcox-server` and `rpcox-client` crates for that.

/// Re-export the exact async-trait macro we use, for compatibility
#[doc(hidden)]
pub use async_trait::async_trait;

mod client;
pub mod codec;
mod error;
mod handler;
mod loopback;
mod registry;
mod server;
mod service;
#[cfg(test)]
pub mod testing;
mod transport;
pub mod types;

pub use client::{
    Client, ClientOptions, HeaderProvider, INVALID_RESPONSE_CODE, MESSAGE_ERROR_CODE, RpcError,
    is_reserved_method_name,
};
pub use codec::{BigInt, CodecError, ConversionError, FromRichValue, IntoRichValue, RichValue};
pub use error::{JsonRpcError, Result};
pub use handler::{
    Context, FromParams, FromRequest, Handler, Instance, IntoParams, IntoResponse, Json, MethodError,
    MethodName, MethodOutcome, Params, Redirect, RedirectStatus, Request, RequestContext, ResponseHeaders,
    Rich,
};
pub use loopback::LoopbackTransport;
pub use registry::{Registry, RegistryError};
pub use server::{Server, ServerBuilder, X_RPC};
pub use service::{BoxedService, ServiceDef};
pub use transport::{BoxError, ClientTransport, HttpReply, IncomingRequest};
pub use types::{Envelope, ErrorCode, Id, JsonValue};
