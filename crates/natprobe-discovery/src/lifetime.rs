//! Binding lifetime estimation.
//!
//! Two independent local endpoints cooperate: X refreshes a binding and
//! learns its mapped port; after a candidate interval Y asks the server to
//! answer through that port (RESPONSE-PORT). A reply means the binding
//! survived the interval; silence means it expired somewhere inside it.
//! An exponential search brackets the lifetime, a binary search narrows it.
//!
//! The redirected reply arrives on X's socket while carrying Y's
//! transaction ID, so X and Y must share one transaction table
//! (`StunClient::bind_with_table`).

use crate::error::DiscoveryError;
use natprobe_client::{RequestError, StunClient};
use natprobe_stun::{
    BINDING_ERROR, ERROR_UNKNOWN_ATTRIBUTE, ErrorCode, Message, ResponsePort, XorMappedAddress,
};
use std::net::SocketAddrV4;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

/// Send count for X's binding refresh
const REFRESH_ATTEMPTS: usize = 3;

/// Send count for Y's redirected probe
const PROBE_ATTEMPTS: usize = 2;

/// Tuning for the lifetime search
#[derive(Debug, Clone, Copy)]
pub struct LifetimeConfig {
    /// First candidate interval, in ticks
    pub initial: u64,
    /// Stop narrowing once the bracket is at most this many ticks wide
    pub acceptable_error: u64,
    /// Real duration of one tick; the default of one second matches wall
    /// clock, tests shrink it to keep the search fast
    pub tick: Duration,
}

impl Default for LifetimeConfig {
    fn default() -> Self {
        Self {
            initial: 10,
            acceptable_error: 15,
            tick: Duration::from_secs(1),
        }
    }
}

enum ProbeOutcome {
    Alive,
    Expired,
    ServerError(u16),
}

/// Estimate the NAT binding lifetime in ticks.
///
/// `x` and `y` must be two clients on distinct local ports sharing one
/// transaction table.
///
/// # Errors
/// - [`DiscoveryError::UnknownAttributes`] when the server rejects
///   RESPONSE-PORT (error 420): the probe cannot work against it
/// - [`DiscoveryError::ServerError`] for other error responses during the
///   exponential phase
/// - [`DiscoveryError::Unsupported`] / [`DiscoveryError::Request`] as in
///   the behavior tests
pub async fn probe_lifetime(
    x: &StunClient,
    y: &StunClient,
    server: SocketAddrV4,
    config: LifetimeConfig,
) -> Result<u64, DiscoveryError> {
    // Phase 1: double the interval until a binding expires inside it
    let mut lifetime = config.initial;
    let mut low: u64;
    let mut high: u64;
    loop {
        info!(lifetime, "testing binding lifetime");
        match probe_once(x, y, server, lifetime, config.tick).await? {
            ProbeOutcome::Alive => {
                lifetime *= 2;
            }
            ProbeOutcome::Expired => {
                high = lifetime;
                low = high / 2;
                break;
            }
            ProbeOutcome::ServerError(code) => {
                return Err(DiscoveryError::ServerError { code });
            }
        }
    }

    // Phase 2: binary search inside [low, high]
    while low < high && high - low > config.acceptable_error {
        let mid = low + (high - low) / 2;
        info!(lifetime = mid, "testing binding lifetime");
        match probe_once(x, y, server, mid, config.tick).await? {
            ProbeOutcome::Alive => low = mid + 1,
            ProbeOutcome::Expired | ProbeOutcome::ServerError(_) => high = mid,
        }
    }

    Ok(high)
}

async fn probe_once(
    x: &StunClient,
    y: &StunClient,
    server: SocketAddrV4,
    interval: u64,
    tick: Duration,
) -> Result<ProbeOutcome, DiscoveryError> {
    // X refreshes its binding and records the mapped port
    let refresh = x.retry_policy().with_attempts(REFRESH_ATTEMPTS);
    let (_, response) = x.request_with(server, Message::request(), refresh).await?;
    let Some(XorMappedAddress(mapped)) = response.find_one() else {
        return Err(DiscoveryError::Unsupported);
    };

    let units = u32::try_from(interval).unwrap_or(u32::MAX);
    sleep(tick.saturating_mul(units)).await;

    // Y asks the server to answer through X's binding
    let mut probe = Message::request();
    probe.append(&ResponsePort(mapped.port()))?;
    let policy = y.retry_policy().with_attempts(PROBE_ATTEMPTS);
    let response = match y.request_with(server, probe, policy).await {
        Ok((_, response)) => response,
        Err(RequestError::Timeout) => return Ok(ProbeOutcome::Expired),
        Err(error) => return Err(error.into()),
    };

    if response.message_type() == BINDING_ERROR {
        let Some(error) = response.find_one::<ErrorCode>() else {
            return Err(DiscoveryError::UndefinedBehavior(
                "error response is missing ERROR-CODE",
            ));
        };
        if error.code() == ERROR_UNKNOWN_ATTRIBUTE {
            return Err(DiscoveryError::UnknownAttributes(
                error.unknown_attribute_codes(),
            ));
        }
        return Ok(ProbeOutcome::ServerError(error.code()));
    }

    Ok(ProbeOutcome::Alive)
}
