//! STUN client: request façade, retransmission driver, receive loop.

use crate::transaction::{RequestError, RequestOutcome, TransactionTable};
use crate::transport::{Transport, TransportError};
use crate::udp::UdpTransport;
use natprobe_stun::Message;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Retransmission schedule for one request.
///
/// The first send happens immediately; each wait doubles the previous one
/// and adds the base timeout again (500, 1500, 3500, ... for the default
/// base), so the k-th wait is `rto * (2^k - 1)`. After the final send's wait
/// the request times out.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Initial retransmission timeout
    pub rto: Duration,
    /// Total number of sends before giving up
    pub attempts: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rto: Duration::from_millis(500),
            attempts: 7,
        }
    }
}

impl RetryPolicy {
    /// Same schedule with a different send count
    #[must_use]
    pub fn with_attempts(self, attempts: usize) -> Self {
        Self { attempts, ..self }
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Default retransmission schedule for requests
    pub retry: RetryPolicy,
    /// Verify the FINGERPRINT attribute of received datagrams when present
    pub verify_fingerprint: bool,
    /// Poll interval of the receive loop; bounds how long shutdown can take
    pub recv_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            verify_fingerprint: false,
            recv_timeout: Duration::from_secs(1),
        }
    }
}

/// Async STUN client over one local UDP endpoint.
///
/// [`StunClient::request`] is the single entry point used by the discovery
/// layer: it registers a transaction, drives the retransmission schedule,
/// and suspends until a response arrives or the retry budget is exhausted.
pub struct StunClient {
    transport: Arc<dyn Transport>,
    table: Arc<TransactionTable>,
    config: ClientConfig,
    local_addr: SocketAddrV4,
    recv_task: JoinHandle<()>,
}

impl StunClient {
    /// Bind a client to a local IPv4 address with default configuration.
    ///
    /// # Errors
    /// Returns `TransportError` if the socket cannot be bound.
    pub async fn bind(addr: SocketAddrV4) -> Result<Self, TransportError> {
        Self::bind_with(addr, ClientConfig::default()).await
    }

    /// Bind a client with explicit configuration.
    ///
    /// # Errors
    /// Returns `TransportError` if the socket cannot be bound.
    pub async fn bind_with(addr: SocketAddrV4, config: ClientConfig) -> Result<Self, TransportError> {
        Self::bind_with_table(addr, config, Arc::new(TransactionTable::new())).await
    }

    /// Bind a client that shares a transaction table with other clients.
    ///
    /// Sharing a table lets a response that arrives on this client's socket
    /// resolve a transaction initiated by another client, which the binding
    /// lifetime probe relies on.
    ///
    /// # Errors
    /// Returns `TransportError` if the socket cannot be bound.
    pub async fn bind_with_table(
        addr: SocketAddrV4,
        config: ClientConfig,
        table: Arc<TransactionTable>,
    ) -> Result<Self, TransportError> {
        let transport = UdpTransport::bind(SocketAddr::V4(addr)).await?;
        Self::from_transport(Arc::new(transport), config, table)
    }

    /// Build a client over an existing transport.
    ///
    /// # Errors
    /// Returns `TransportError` if the transport's local address cannot be
    /// determined or is not IPv4.
    pub fn from_transport(
        transport: Arc<dyn Transport>,
        config: ClientConfig,
        table: Arc<TransactionTable>,
    ) -> Result<Self, TransportError> {
        let local_addr = match transport.local_addr()? {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(addr) => {
                return Err(TransportError::BindFailed(format!(
                    "IPv4 address required, transport bound to {addr}"
                )));
            }
        };
        let recv_task = spawn_recv_loop(Arc::clone(&transport), Arc::clone(&table), config.clone());
        Ok(Self {
            transport,
            table,
            config,
            local_addr,
            recv_task,
        })
    }

    /// Local address the client is bound to
    #[must_use]
    pub fn local_addr(&self) -> SocketAddrV4 {
        self.local_addr
    }

    /// The client's default retransmission schedule
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.retry
    }

    /// Send a request and await its response with the default schedule.
    ///
    /// # Errors
    /// Returns [`RequestError::Timeout`] when the retry budget is exhausted
    /// without a response, or a transport error if sending failed.
    pub async fn request(&self, dest: SocketAddrV4, message: Message) -> RequestOutcome {
        self.request_with(dest, message, self.config.retry).await
    }

    /// Send a request and await its response with an explicit schedule.
    ///
    /// # Errors
    /// As [`StunClient::request`].
    pub async fn request_with(
        &self,
        dest: SocketAddrV4,
        message: Message,
        policy: RetryPolicy,
    ) -> RequestOutcome {
        let id = message.transaction_id();
        let receiver = self.table.register(id);
        let driver = spawn_retry_driver(
            Arc::clone(&self.transport),
            Arc::clone(&self.table),
            dest,
            message,
            policy,
        );

        let outcome = receiver.await.unwrap_or(Err(RequestError::Closed));

        // Stop any pending retransmission; aborting a task that already
        // finished is a no-op.
        driver.abort();
        outcome
    }

    /// Close the client: the transport stops accepting operations and the
    /// receive loop terminates.
    pub async fn close(&self) {
        let _ = self.transport.close().await;
        self.recv_task.abort();
    }
}

impl Drop for StunClient {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

fn spawn_retry_driver(
    transport: Arc<dyn Transport>,
    table: Arc<TransactionTable>,
    dest: SocketAddrV4,
    message: Message,
    policy: RetryPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let id = message.transaction_id();
        let dest = SocketAddr::V4(dest);
        let mut wait = Duration::ZERO;
        for attempt in 0..policy.attempts {
            if attempt > 0 {
                debug!(%id, attempt, "retransmitting request");
            }
            if let Err(error) = transport.send_to(message.as_bytes(), dest).await {
                warn!(%id, %error, "request send failed");
                table.fail(&id, error);
                return;
            }
            wait = wait * 2 + policy.rto;
            tokio::time::sleep(wait).await;
        }
        table.on_timeout(&id);
    })
}

fn spawn_recv_loop(
    transport: Arc<dyn Transport>,
    table: Arc<TransactionTable>,
    config: ClientConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 2048];
        loop {
            if transport.is_closed() {
                break;
            }
            let received =
                tokio::time::timeout(config.recv_timeout, transport.recv_from(&mut buf)).await;
            let (len, source) = match received {
                // Local poll timeout: loop around and re-check for shutdown
                Err(_) => continue,
                Ok(Err(TransportError::Closed)) => break,
                Ok(Err(error)) => {
                    warn!(%error, "receive failed");
                    continue;
                }
                Ok(Ok(pair)) => pair,
            };
            let SocketAddr::V4(source) = source else {
                continue;
            };

            // Anything non-STUN or structurally broken is dropped here and
            // never reaches the transaction table.
            let datagram = &buf[..len];
            if !Message::is_valid(datagram) {
                trace!(%source, len, "dropping invalid datagram");
                continue;
            }
            if config.verify_fingerprint && !Message::fingerprint_matches(datagram) {
                trace!(%source, "dropping datagram with bad fingerprint");
                continue;
            }
            match Message::from_bytes(datagram) {
                Ok(message) => {
                    trace!(%source, response = %message, "received");
                    table.on_response(source, message);
                }
                Err(error) => trace!(%source, %error, "dropping undecodable datagram"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportResult;
    use async_trait::async_trait;
    use natprobe_stun::{BINDING_SUCCESS, XorMappedAddress};
    use std::net::Ipv4Addr;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    #[derive(Clone, Copy, PartialEq)]
    enum ReplyMode {
        Silent,
        Echo,
        Garbage,
    }

    struct MockTransport {
        sends: Mutex<Vec<(Instant, Vec<u8>)>>,
        reply_tx: mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>,
        reply_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>>,
        mode: ReplyMode,
        closed: AtomicBool,
    }

    impl MockTransport {
        fn new(mode: ReplyMode) -> Arc<Self> {
            let (reply_tx, reply_rx) = mpsc::unbounded_channel();
            Arc::new(Self {
                sends: Mutex::new(Vec::new()),
                reply_tx,
                reply_rx: tokio::sync::Mutex::new(reply_rx),
                mode,
                closed: AtomicBool::new(false),
            })
        }

        fn send_offsets(&self, start: Instant) -> Vec<u128> {
            self.sends
                .lock()
                .unwrap()
                .iter()
                .map(|(at, _)| at.duration_since(start).as_millis())
                .collect()
        }
    }

    fn mapped() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(198, 51, 100, 1), 40000)
    }

    fn server() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 1), 3478)
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize> {
            self.sends
                .lock()
                .unwrap()
                .push((Instant::now(), buf.to_vec()));
            match self.mode {
                ReplyMode::Silent => {}
                ReplyMode::Echo => {
                    let request = Message::from_bytes(buf).unwrap();
                    let mut reply = Message::reply(BINDING_SUCCESS, request.transaction_id());
                    reply.append(&XorMappedAddress(mapped())).unwrap();
                    self.reply_tx
                        .send((reply.as_bytes().to_vec(), addr))
                        .unwrap();
                }
                ReplyMode::Garbage => {
                    self.reply_tx
                        .send((b"definitely not stun".to_vec(), addr))
                        .unwrap();
                }
            }
            Ok(buf.len())
        }

        async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)> {
            let mut rx = self.reply_rx.lock().await;
            match rx.recv().await {
                Some((bytes, addr)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok((bytes.len(), addr))
                }
                None => Err(TransportError::Closed),
            }
        }

        fn local_addr(&self) -> TransportResult<SocketAddr> {
            Ok("127.0.0.1:50000".parse().unwrap())
        }

        async fn close(&self) -> TransportResult<()> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::Relaxed)
        }
    }

    fn client_over(transport: Arc<MockTransport>) -> StunClient {
        StunClient::from_transport(
            transport,
            ClientConfig::default(),
            Arc::new(TransactionTable::new()),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn retry_schedule_backoff_and_timeout() {
        let transport = MockTransport::new(ReplyMode::Silent);
        let client = client_over(Arc::clone(&transport));

        let start = Instant::now();
        let policy = RetryPolicy {
            rto: Duration::from_millis(500),
            attempts: 3,
        };
        let outcome = client.request_with(server(), Message::request(), policy).await;

        assert!(matches!(outcome, Err(RequestError::Timeout)));
        // Sends at 0, then after waits of 500 and 1500; timeout after a
        // final wait of 3500.
        assert_eq!(transport.send_offsets(start), vec![0, 500, 2000]);
        assert_eq!(start.elapsed(), Duration::from_millis(5500));
    }

    #[tokio::test(start_paused = true)]
    async fn no_send_after_retry_exhaustion() {
        let transport = MockTransport::new(ReplyMode::Silent);
        let client = client_over(Arc::clone(&transport));

        let policy = RetryPolicy {
            rto: Duration::from_millis(500),
            attempts: 2,
        };
        let _ = client.request_with(server(), Message::request(), policy).await;

        let sends_at_timeout = transport.sends.lock().unwrap().len();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.sends.lock().unwrap().len(), sends_at_timeout);
        assert_eq!(sends_at_timeout, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn response_resolves_request() {
        let transport = MockTransport::new(ReplyMode::Echo);
        let client = client_over(Arc::clone(&transport));

        let message = Message::request();
        let id = message.transaction_id();
        let (source, response) = client.request(server(), message).await.unwrap();

        assert_eq!(source, server());
        assert_eq!(response.transaction_id(), id);
        assert_eq!(response.find_one::<XorMappedAddress>().unwrap().0, mapped());
        // A resolved request leaves nothing pending and stops retransmitting
        assert_eq!(transport.sends.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_datagrams_are_dropped_and_request_times_out() {
        let transport = MockTransport::new(ReplyMode::Garbage);
        let client = client_over(Arc::clone(&transport));

        let policy = RetryPolicy {
            rto: Duration::from_millis(500),
            attempts: 2,
        };
        let outcome = client.request_with(server(), Message::request(), policy).await;
        assert!(matches!(outcome, Err(RequestError::Timeout)));
    }
}
