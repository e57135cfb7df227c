//! Transport trait abstraction over the OS socket layer.
//!
//! The client core only needs datagram send/receive and a local address;
//! abstracting it behind a trait keeps the transaction and retry machinery
//! testable without real sockets.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from the underlying socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport is closed
    #[error("transport is closed")]
    Closed,

    /// Address binding failed
    #[error("failed to bind to address: {0}")]
    BindFailed(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Async datagram transport.
///
/// Implementations must be safe to share across tasks: the receive loop and
/// any number of retry drivers operate on the same transport concurrently.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a datagram to a remote address, returning the bytes sent.
    ///
    /// # Errors
    /// Returns `TransportError` if the transport is closed or the send fails.
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize>;

    /// Receive a datagram, filling `buf` and returning size and sender.
    ///
    /// # Errors
    /// Returns `TransportError` if the transport is closed or the receive
    /// fails.
    async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)>;

    /// Local address the transport is bound to.
    ///
    /// # Errors
    /// Returns `TransportError` if the address cannot be determined.
    fn local_addr(&self) -> TransportResult<SocketAddr>;

    /// Close the transport; subsequent operations return
    /// [`TransportError::Closed`].
    ///
    /// # Errors
    /// Returns `TransportError` if closing fails.
    async fn close(&self) -> TransportResult<()>;

    /// Whether the transport has been closed.
    fn is_closed(&self) -> bool;
}
