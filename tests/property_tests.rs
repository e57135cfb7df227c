//! Property-based tests for the natprobe STUN codec.
//!
//! Uses proptest to verify codec invariants across large input spaces.

use proptest::prelude::*;

mod codec_properties {
    use super::*;
    use natprobe_stun::{
        ErrorCode, HEADER_SIZE, Message, ResponsePort, Software, XorMappedAddress,
    };
    use std::net::{Ipv4Addr, SocketAddrV4};

    proptest! {
        /// Encoding then decoding preserves the header and every
        /// attribute's raw type/length/bytes.
        #[test]
        fn message_roundtrip(
            ip in any::<u32>(),
            port in any::<u16>(),
            response_port in any::<u16>(),
            software in "[ -~]{0,80}",
        ) {
            let addr = SocketAddrV4::new(Ipv4Addr::from(ip), port);
            let mut message = Message::request();
            message.append(&XorMappedAddress(addr)).unwrap();
            message.append(&ResponsePort(response_port)).unwrap();
            message.append(&Software(software.clone())).unwrap();

            let decoded = Message::from_bytes(message.as_bytes()).unwrap();
            prop_assert_eq!(decoded.message_type(), message.message_type());
            prop_assert_eq!(decoded.transaction_id(), message.transaction_id());

            let original: Vec<_> =
                message.raw_attributes().map(|(t, v)| (t, v.to_vec())).collect();
            let reparsed: Vec<_> =
                decoded.raw_attributes().map(|(t, v)| (t, v.to_vec())).collect();
            prop_assert_eq!(original, reparsed);

            prop_assert_eq!(decoded.find_one::<XorMappedAddress>().unwrap().0, addr);
            prop_assert_eq!(decoded.find_one::<Software>().unwrap().0, software);
        }

        /// Decoding never panics, whatever bytes arrive off the wire.
        #[test]
        fn decode_arbitrary_bytes_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..600)) {
            let _ = Message::is_valid(&bytes);
            let _ = Message::from_bytes(&bytes);
            let _ = Message::fingerprint_matches(&bytes);
        }

        /// A buffer accepted by validation always decodes.
        #[test]
        fn valid_buffers_decode(bytes in prop::collection::vec(any::<u8>(), 20..600)) {
            if Message::is_valid(&bytes) && Message::from_bytes(&bytes).is_ok() {
                let decoded = Message::from_bytes(&bytes).unwrap();
                // Descriptors stay inside the copied buffer
                for (_, value) in decoded.raw_attributes() {
                    prop_assert!(value.len() <= bytes.len());
                }
            }
        }

        /// ERROR-CODE survives a round trip with arbitrary reason text.
        #[test]
        fn error_code_roundtrip(code in any::<u16>(), reason in "[ -~]{0,60}") {
            let mut message = Message::request();
            message.append(&ErrorCode::new(code, &reason)).unwrap();

            let decoded = Message::from_bytes(message.as_bytes()).unwrap();
            let error = decoded.find_one::<ErrorCode>().unwrap();
            prop_assert_eq!(error.code(), code);
            prop_assert_eq!(error.reason(), reason);
        }

        /// The fingerprint validates untouched messages and catches any
        /// tampering with attribute content.
        #[test]
        fn fingerprint_catches_payload_tampering(
            software in "[ -~]{8,60}",
            flip_bit in 0u8..8,
            tamper_index in any::<prop::sample::Index>(),
        ) {
            let mut message = Message::request();
            message.append(&Software(software)).unwrap();
            message.append_fingerprint().unwrap();

            prop_assert!(Message::fingerprint_matches(message.as_bytes()));

            // Flip one bit inside the SOFTWARE value, leaving the
            // fingerprint record itself intact.
            let mut bytes = message.as_bytes().to_vec();
            let value_start = HEADER_SIZE + 4;
            let value_end = bytes.len() - 8;
            let index = value_start + tamper_index.index(value_end - value_start);
            bytes[index] ^= 1 << flip_bit;

            prop_assert!(!Message::fingerprint_matches(&bytes));
        }
    }
}
