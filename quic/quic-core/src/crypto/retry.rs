// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Retry Integrity Tag (RFC 9001 section 5.8): a fixed, publicly-known AEAD
//! key independent of the per-connection TLS handshake, used to authenticate
//! Retry packets so an off-path attacker cannot forge one.
//!
//! This stays in `quic-core` rather than behind the [`crate::crypto::tls`]
//! collaborator seam because, unlike handshake keys, the key material here
//! is a wire constant rather than something negotiated per connection.

use crate::crypto::packet_protection;

pub const INTEGRITY_TAG_LEN: usize = 16;
pub type IntegrityTag = [u8; INTEGRITY_TAG_LEN];

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.8
//# The Retry Integrity Tag is a 128-bit field that is computed as the
//# output of AEAD_AES_128_GCM used with the following inputs:
//#
//# *  The secret key, K, is 128 bits equal to
//#    0xbe0c690b9f66575a1d766b54e368c84e.
pub const SECRET_KEY_BYTES: [u8; 16] = [
    0xbe, 0x0c, 0x69, 0x0b, 0x9f, 0x66, 0x57, 0x5a, 0x1d, 0x76, 0x6b, 0x54, 0xe3, 0x68, 0xc8, 0x4e,
];

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.8
//#   *  The nonce, N, is 96 bits equal to 0x461599d35d632bf2239825bb.
pub const NONCE_BYTES: [u8; 12] = [
    0x46, 0x15, 0x99, 0xd3, 0x5d, 0x63, 0x2b, 0xf2, 0x23, 0x98, 0x25, 0xbb,
];

/// Computes and validates the Retry Integrity Tag. Implemented by whatever
/// AEAD collaborator the endpoint links against (the narrow seam mirrors
/// [`crate::crypto::Key`]; this is a free function rather than a method set
/// because it is keyed by the fixed constant above, not per-connection
/// state).
pub trait RetryKey {
    fn generate_tag(pseudo_packet: &[u8]) -> IntegrityTag;
    fn validate(pseudo_packet: &[u8], tag: IntegrityTag) -> Result<(), packet_protection::Error>;
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;

    /// A test double that doesn't perform real AES-128-GCM; it only needs
    /// to round-trip for the pipeline tests that exercise Retry framing
    /// rather than cryptographic correctness.
    pub struct NoopRetryKey;

    impl RetryKey for NoopRetryKey {
        fn generate_tag(pseudo_packet: &[u8]) -> IntegrityTag {
            let mut tag = [0u8; INTEGRITY_TAG_LEN];
            for (i, byte) in pseudo_packet.iter().enumerate() {
                tag[i % INTEGRITY_TAG_LEN] ^= *byte;
            }
            tag
        }

        fn validate(pseudo_packet: &[u8], tag: IntegrityTag) -> Result<(), packet_protection::Error> {
            if Self::generate_tag(pseudo_packet) == tag {
                Ok(())
            } else {
                Err(packet_protection::Error::DECRYPT_ERROR)
            }
        }
    }
}
