//! Error types for NAT behavior discovery.

use natprobe_client::RequestError;
use natprobe_stun::EncodeError;
use thiserror::Error;

/// Errors surfaced by the discovery procedures.
///
/// Everything here is a per-test failure: the caller reports it and moves
/// on; only transport setup failures are fatal to the process, and those
/// occur before discovery starts.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The server never answered, or answered without the attributes the
    /// behavior tests need
    #[error("server does not support behavior discovery")]
    Unsupported,

    /// The server answered in a way a conformant server never would
    #[error("server has undefined behavior: {0}")]
    UndefinedBehavior(&'static str),

    /// The server rejected attributes the probe depends on (error 420)
    #[error("server does not support attributes {0:#06x?}")]
    UnknownAttributes(Vec<u16>),

    /// The server replied with an error response
    #[error("server replied with error code {code:#06x}")]
    ServerError {
        /// Numeric ERROR-CODE value
        code: u16,
    },

    /// A probe message could not be built
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The request machinery failed (timeout where it is not informative,
    /// or a transport error)
    #[error(transparent)]
    Request(#[from] RequestError),
}
