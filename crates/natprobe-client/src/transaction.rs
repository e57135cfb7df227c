//! Transaction table: correlates in-flight requests with their responses.
//!
//! Every transaction moves from pending to exactly one of resolved or timed
//! out. The atomic map removal is the single hand-off point: whichever of
//! the response path and the timeout path claims the entry delivers the
//! outcome, and the loser finds the entry gone and does nothing.

use crate::transport::TransportError;
use dashmap::DashMap;
use natprobe_stun::{Message, TransactionId};
use std::net::SocketAddrV4;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Errors returned from a single request
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// No response arrived within the full retry budget
    #[error("request timed out")]
    Timeout,

    /// The underlying transport failed while sending
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The client was closed while the request was outstanding
    #[error("client is closed")]
    Closed,
}

/// Outcome delivered to a waiting request
pub type RequestOutcome = Result<(SocketAddrV4, Message), RequestError>;

/// Registry of pending transactions keyed by transaction ID.
///
/// One table usually serves one client; the lifetime probe shares a single
/// table across two clients so that a response redirected to the other
/// client's socket still resolves the transaction that asked for it.
#[derive(Debug, Default)]
pub struct TransactionTable {
    pending: DashMap<TransactionId, oneshot::Sender<RequestOutcome>>,
}

impl TransactionTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending transaction and return the receiver its outcome
    /// will be delivered on.
    ///
    /// # Panics
    /// Panics if the ID is already registered. Transaction IDs are 96 random
    /// bits; a collision within the outstanding set is a programmer error,
    /// not a runtime condition.
    pub fn register(&self, id: TransactionId) -> oneshot::Receiver<RequestOutcome> {
        let (sender, receiver) = oneshot::channel();
        let previous = self.pending.insert(id, sender);
        assert!(previous.is_none(), "transaction {id} registered twice");
        receiver
    }

    /// Deliver a response to the transaction it answers.
    ///
    /// A response for an unknown ID (already resolved, timed out, or never
    /// ours) is dropped silently.
    pub fn on_response(&self, source: SocketAddrV4, message: Message) {
        let id = message.transaction_id();
        if let Some((_, sender)) = self.pending.remove(&id) {
            debug!(%id, %source, "transaction resolved");
            let _ = sender.send(Ok((source, message)));
        } else {
            trace!(%id, %source, "response for unknown transaction dropped");
        }
    }

    /// Mark a transaction as timed out.
    ///
    /// A no-op if the transaction was already resolved by a response.
    pub fn on_timeout(&self, id: &TransactionId) {
        if let Some((_, sender)) = self.pending.remove(id) {
            debug!(%id, "transaction timed out");
            let _ = sender.send(Err(RequestError::Timeout));
        }
    }

    /// Fail a transaction with a transport error.
    ///
    /// A no-op if the transaction was already resolved.
    pub fn fail(&self, id: &TransactionId, error: TransportError) {
        if let Some((_, sender)) = self.pending.remove(id) {
            debug!(%id, %error, "transaction failed");
            let _ = sender.send(Err(RequestError::Transport(error)));
        }
    }

    /// Number of transactions currently pending
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }
}
