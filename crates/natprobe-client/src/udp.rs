//! Async UDP transport built on tokio and socket2.

use crate::transport::{Transport, TransportError, TransportResult};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::UdpSocket;

/// UDP implementation of [`Transport`].
///
/// Binding goes through socket2 so the socket can be configured before it is
/// handed to tokio.
pub struct UdpTransport {
    socket: UdpSocket,
    closed: AtomicBool,
}

impl UdpTransport {
    /// Bind a UDP transport to the given local address.
    ///
    /// Use port 0 for automatic port selection.
    ///
    /// # Errors
    /// Returns [`TransportError::BindFailed`] if the socket cannot be
    /// created, bound, or registered with the runtime.
    pub async fn bind(addr: SocketAddr) -> TransportResult<Self> {
        let domain = if addr.is_ipv4() {
            socket2::Domain::IPV4
        } else {
            socket2::Domain::IPV6
        };

        let socket =
            socket2::Socket::new(domain, socket2::Type::DGRAM, Some(socket2::Protocol::UDP))
                .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        socket
            .bind(&addr.into())
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;

        Ok(Self {
            socket,
            closed: AtomicBool::new(false),
        })
    }

    /// Wrap an already-bound tokio socket.
    #[must_use]
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }
        Ok(self.socket.send_to(buf, addr).await?)
    }

    async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }
        Ok(self.socket.recv_from(buf).await?)
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.socket.local_addr().map_err(TransportError::Io)
    }

    async fn close(&self) -> TransportResult<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn bind_assigns_port() {
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = transport.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(addr.is_ipv4());
    }

    #[tokio::test]
    async fn send_and_receive() {
        let server = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();
        let client = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        client.send_to(b"probe", server_addr).await.unwrap();

        let mut buf = vec![0u8; 64];
        let (len, from) = timeout(Duration::from_secs(1), server.recv_from(&mut buf))
            .await
            .expect("receive timed out")
            .unwrap();
        assert_eq!(&buf[..len], b"probe");
        assert_eq!(from, client.local_addr().unwrap());
    }

    #[tokio::test]
    async fn operations_fail_after_close() {
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        assert!(!transport.is_closed());

        transport.close().await.unwrap();
        assert!(transport.is_closed());

        let result = transport
            .send_to(b"x", "127.0.0.1:9".parse().unwrap())
            .await;
        assert!(matches!(result, Err(TransportError::Closed)));

        let mut buf = vec![0u8; 16];
        let result = transport.recv_from(&mut buf).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }
}
