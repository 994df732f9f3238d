use std::io::{self, ErrorKind};
use std::net::SocketAddr;

use anyhow::Context;
use mio::net::{TcpListener, TcpStream};
use tracing::warn;

/// Opens the non-blocking listening socket.
///
/// Failure here is fatal to startup; the error names the address.
pub fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr).with_context(|| format!("Failed to bind listening socket to {addr}"))
}

/// Outcome of one `accept` call while draining the accept queue.
pub enum Accepted {
    Connection(TcpStream, SocketAddr),
    /// The queue is empty; wait for the next readiness event.
    Drained,
    /// A per-connection failure; keep accepting.
    Skipped,
    /// A listener-level failure (e.g. out of descriptors); stop this pass.
    Stalled(io::Error),
}

/// Accepts one pending connection, classifying the result.
///
/// Sockets returned by mio are already non-blocking.
pub fn accept_one(listener: &TcpListener) -> Accepted {
    match listener.accept() {
        Ok((stream, peer)) => Accepted::Connection(stream, peer),
        Err(e) if e.kind() == ErrorKind::WouldBlock => Accepted::Drained,
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::Interrupted
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionReset
                    | ErrorKind::PermissionDenied
            ) =>
        {
            warn!(error = %e, "Accept failed, continuing");
            Accepted::Skipped
        }
        Err(e) => Accepted::Stalled(e),
    }
}
