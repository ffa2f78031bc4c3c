use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced by [`App::start`](crate::App::start).
///
/// Startup errors are fatal: the application transitions to
/// [`Lifecycle::Failed`](crate::Lifecycle::Failed) and no recovery path is
/// offered. Body-decode errors never appear here; they are converted to 400
/// responses inside the pipeline.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("invalid bind address `{address}`: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
