//! NAT classification types.
//!
//! Mapping and filtering behavior are classified independently and combined
//! into one of the classic NAT types. The combination table is sparse:
//! bit patterns outside it report as undefined rather than being forced
//! into a nearby type.

use std::fmt;

/// Filtering behavior: which inbound sources a NAT lets through an
/// established mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Filtering {
    /// Any external endpoint may send through the mapping
    EndpointIndependent = 0b0000,
    /// Only addresses the client has contacted may send
    AddressDependent = 0b0001,
    /// Only address:port pairs the client has contacted may send
    AddressAndPortDependent = 0b0010,
}

/// Mapping behavior: whether a NAT reuses the same external endpoint for a
/// given internal endpoint regardless of destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mapping {
    /// Same external mapping for every destination
    EndpointIndependent = 0b0000,
    /// Mapping varies with the destination address
    AddressDependent = 0b0100,
    /// Mapping varies with the destination address and port
    AddressAndPortDependent = 0b1000,
    /// The mapped address equals the local address: no NAT in the path
    NoNat = 0b1100,
}

/// Combined NAT type derived from mapping and filtering behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatType {
    /// Endpoint-independent mapping and filtering
    FullCone,
    /// Endpoint-independent mapping, address-dependent filtering
    RestrictedCone,
    /// Endpoint-independent mapping, address-and-port-dependent filtering
    PortRestrictedCone,
    /// Address-and-port-dependent mapping and filtering
    Symmetric,
    /// A behavior combination with no assigned classic type
    Undefined,
}

/// Result of the NAT behavior discovery procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NatClassification {
    /// Observed filtering behavior
    pub filtering: Filtering,
    /// Observed mapping behavior
    pub mapping: Mapping,
}

impl NatClassification {
    /// Combine the behavior bit patterns into a classic NAT type.
    ///
    /// Only four combinations have assigned types; everything else,
    /// including every no-NAT mapping, reports [`NatType::Undefined`].
    #[must_use]
    pub fn nat_type(&self) -> NatType {
        match (self.filtering as u8) | (self.mapping as u8) {
            0b0000 => NatType::FullCone,
            0b0001 => NatType::RestrictedCone,
            0b0010 => NatType::PortRestrictedCone,
            0b1010 => NatType::Symmetric,
            _ => NatType::Undefined,
        }
    }
}

impl fmt::Display for Filtering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndpointIndependent => write!(f, "endpoint independent"),
            Self::AddressDependent => write!(f, "address dependent"),
            Self::AddressAndPortDependent => write!(f, "address and port dependent"),
        }
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndpointIndependent => write!(f, "endpoint independent"),
            Self::AddressDependent => write!(f, "address dependent"),
            Self::AddressAndPortDependent => write!(f, "address and port dependent"),
            Self::NoNat => write!(f, "no nat"),
        }
    }
}

impl fmt::Display for NatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullCone => write!(f, "full cone"),
            Self::RestrictedCone => write!(f, "restricted cone"),
            Self::PortRestrictedCone => write!(f, "port restricted cone"),
            Self::Symmetric => write!(f, "symmetric"),
            Self::Undefined => write!(f, "undefined"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combination_table() {
        let cases = [
            (Filtering::EndpointIndependent, Mapping::EndpointIndependent, NatType::FullCone),
            (Filtering::AddressDependent, Mapping::EndpointIndependent, NatType::RestrictedCone),
            (
                Filtering::AddressAndPortDependent,
                Mapping::EndpointIndependent,
                NatType::PortRestrictedCone,
            ),
            (
                Filtering::AddressAndPortDependent,
                Mapping::AddressAndPortDependent,
                NatType::Symmetric,
            ),
        ];
        for (filtering, mapping, expected) in cases {
            assert_eq!(NatClassification { filtering, mapping }.nat_type(), expected);
        }
    }

    #[test]
    fn unassigned_combinations_are_undefined() {
        let undefined = [
            (Filtering::AddressDependent, Mapping::AddressAndPortDependent),
            (Filtering::EndpointIndependent, Mapping::AddressDependent),
            (Filtering::AddressDependent, Mapping::AddressDependent),
            (Filtering::EndpointIndependent, Mapping::NoNat),
            (Filtering::AddressAndPortDependent, Mapping::NoNat),
        ];
        for (filtering, mapping) in undefined {
            assert_eq!(
                NatClassification { filtering, mapping }.nat_type(),
                NatType::Undefined,
                "{filtering} / {mapping}"
            );
        }
    }

    #[test]
    fn display_wording() {
        assert_eq!(NatType::FullCone.to_string(), "full cone");
        assert_eq!(NatType::PortRestrictedCone.to_string(), "port restricted cone");
        assert_eq!(Mapping::NoNat.to_string(), "no nat");
        assert_eq!(
            Filtering::AddressAndPortDependent.to_string(),
            "address and port dependent"
        );
    }
}
