//! NAT behavior discovery: initial probe, filtering test, mapping test.

use crate::behavior::{Filtering, Mapping, NatClassification};
use crate::error::DiscoveryError;
use natprobe_client::{RequestError, RetryPolicy, StunClient};
use natprobe_stun::{ChangeRequest, Message, OtherAddress, XorMappedAddress};
use std::net::SocketAddrV4;
use tracing::debug;

/// Send count for each behavior probe; unanswered probes are informative,
/// so the full general-purpose retry budget would only slow the test down.
const PROBE_ATTEMPTS: usize = 2;

/// Classify the NAT between `client` and `server`.
///
/// Runs the initial binding probe, then the filtering test, then the
/// mapping test (skipped when the mapped address equals the client's local
/// address, which means there is no NAT to characterize).
///
/// # Errors
/// - [`DiscoveryError::Unsupported`] when the server never answers or lacks
///   XOR-MAPPED-ADDRESS / OTHER-ADDRESS support
/// - [`DiscoveryError::UndefinedBehavior`] when the server's alternate
///   address does not actually differ from its primary address, or a
///   response omits an attribute a conformant server always includes
/// - [`DiscoveryError::Request`] for transport failures
pub async fn detect_nat(
    client: &StunClient,
    server: SocketAddrV4,
) -> Result<NatClassification, DiscoveryError> {
    let policy = client.retry_policy().with_attempts(PROBE_ATTEMPTS);

    let response = match client.request_with(server, Message::request(), policy).await {
        Ok((_, response)) => response,
        Err(RequestError::Timeout) => return Err(DiscoveryError::Unsupported),
        Err(error) => return Err(error.into()),
    };

    let (mapped, other) = response.find2::<XorMappedAddress, OtherAddress>();
    let (Some(XorMappedAddress(first_mapped)), Some(OtherAddress(alternate))) = (mapped, other)
    else {
        return Err(DiscoveryError::Unsupported);
    };
    debug!(%first_mapped, %alternate, "initial binding response");

    // A usable alternate address differs from the primary in both ip and
    // port; anything else leaves the change-request tests meaningless.
    if alternate.ip() == server.ip() || alternate.port() == server.port() {
        return Err(DiscoveryError::UndefinedBehavior(
            "alternate address shares the primary address or port",
        ));
    }

    if first_mapped == client.local_addr() {
        let filtering = filtering_test(client, server, policy).await?;
        return Ok(NatClassification {
            filtering,
            mapping: Mapping::NoNat,
        });
    }

    let filtering = filtering_test(client, server, policy).await?;
    let mapping = mapping_test(client, server, alternate, first_mapped, policy).await?;
    Ok(NatClassification { filtering, mapping })
}

/// Report the public mapping of the client's local endpoint.
///
/// A single binding exchange with the full retry budget; the returned
/// address can be reused for rendezvous while the NAT keeps the binding.
///
/// # Errors
/// [`DiscoveryError::Unsupported`] when the response lacks
/// XOR-MAPPED-ADDRESS, [`DiscoveryError::Request`] on timeout or transport
/// failure.
pub async fn establish_binding(
    client: &StunClient,
    server: SocketAddrV4,
) -> Result<SocketAddrV4, DiscoveryError> {
    let (_, response) = client.request(server, Message::request()).await?;
    let Some(XorMappedAddress(mapped)) = response.find_one() else {
        return Err(DiscoveryError::Unsupported);
    };
    debug!(%mapped, "binding established");
    Ok(mapped)
}

async fn filtering_test(
    client: &StunClient,
    server: SocketAddrV4,
    policy: RetryPolicy,
) -> Result<Filtering, DiscoveryError> {
    let mut ip_probe = Message::request();
    ip_probe.append(&ChangeRequest::ip_and_port())?;
    match client.request_with(server, ip_probe, policy).await {
        Ok(_) => return Ok(Filtering::EndpointIndependent),
        Err(RequestError::Timeout) => {}
        Err(error) => return Err(error.into()),
    }

    let mut port_probe = Message::request();
    port_probe.append(&ChangeRequest::port_only())?;
    match client.request_with(server, port_probe, policy).await {
        Ok(_) => Ok(Filtering::AddressDependent),
        Err(RequestError::Timeout) => Ok(Filtering::AddressAndPortDependent),
        Err(error) => Err(error.into()),
    }
}

async fn mapping_test(
    client: &StunClient,
    server: SocketAddrV4,
    alternate: SocketAddrV4,
    first_mapped: SocketAddrV4,
    policy: RetryPolicy,
) -> Result<Mapping, DiscoveryError> {
    // Alternate ip, primary port: does the mapping survive an address change?
    let dest = SocketAddrV4::new(*alternate.ip(), server.port());
    let (_, response) = client.request_with(dest, Message::request(), policy).await?;
    let Some(XorMappedAddress(second_mapped)) = response.find_one() else {
        return Err(DiscoveryError::UndefinedBehavior(
            "binding response is missing XOR-MAPPED-ADDRESS",
        ));
    };
    if second_mapped == first_mapped {
        return Ok(Mapping::EndpointIndependent);
    }

    // Fully alternate address: does it survive a port change at least?
    let (_, response) = client
        .request_with(alternate, Message::request(), policy)
        .await?;
    let Some(XorMappedAddress(third_mapped)) = response.find_one() else {
        return Err(DiscoveryError::UndefinedBehavior(
            "binding response is missing XOR-MAPPED-ADDRESS",
        ));
    };
    Ok(if third_mapped == first_mapped {
        Mapping::AddressDependent
    } else {
        Mapping::AddressAndPortDependent
    })
}
