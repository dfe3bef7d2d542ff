use std::net::SocketAddr;

use thiserror::Error;

pub type Result<T, E = HostError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Error binding to {addr}")]
    Bind { addr: SocketAddr, source: std::io::Error },

    #[error("Error accepting a connection")]
    Accept { source: std::io::Error },
}
