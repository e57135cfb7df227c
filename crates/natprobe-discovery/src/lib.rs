//! # natprobe discovery
//!
//! NAT behavior discovery over STUN binding exchanges.
//!
//! This crate provides:
//! - NAT classification types (mapping and filtering behavior)
//! - The behavior discovery procedure: initial probe, filtering test,
//!   mapping test
//! - Binding lifetime estimation (exponential then binary search)
//! - One-shot binding establishment
//!
//! The decision procedure follows the classic RFC 5780 behavior tests: a
//! server with an alternate address answers change-request probes from its
//! alternate endpoints, and the pattern of answered and unanswered probes
//! determines how the NAT in front of the client maps and filters traffic.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod behavior;
pub mod error;
pub mod lifetime;
pub mod probe;

pub use behavior::{Filtering, Mapping, NatClassification, NatType};
pub use error::DiscoveryError;
pub use lifetime::{LifetimeConfig, probe_lifetime};
pub use probe::{detect_nat, establish_binding};
