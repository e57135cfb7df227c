//! # natprobe client
//!
//! Async STUN request machinery for NAT behavior discovery.
//!
//! This crate provides:
//! - A [`Transport`] trait and a tokio/socket2 UDP implementation
//! - A [`TransactionTable`] correlating in-flight requests to responses by
//!   transaction ID, with exactly-once resolution
//! - A retransmission driver with exponential backoff
//! - The [`StunClient`] request façade used by the discovery layer
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       StunClient                         │
//! │   request() ──► register ──► retry driver ──► send       │
//! │       ▲                                                  │
//! │       └── oneshot ◄── TransactionTable ◄── receive loop  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! One receive loop per client decodes inbound datagrams serially and
//! dispatches them to the table; invalid datagrams are dropped without
//! reaching the table.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod transaction;
pub mod transport;
pub mod udp;

pub use client::{ClientConfig, RetryPolicy, StunClient};
pub use transaction::{RequestError, RequestOutcome, TransactionTable};
pub use transport::{Transport, TransportError, TransportResult};
pub use udp::UdpTransport;
