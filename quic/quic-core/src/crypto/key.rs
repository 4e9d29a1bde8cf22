// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::crypto::{packet_protection, tls::CipherSuite};

/// A per-epoch AEAD key pair, narrowed to what the receive pipeline needs:
/// in-place decryption of a packet payload, and the matching encrypt for
/// responses. The handshake collaborator is responsible for deriving these;
/// this trait is the seam it derives them across.
pub trait Key: Send {
    /// Removes packet protection in place. `header` is the associated data.
    fn decrypt(
        &self,
        packet_number: u64,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), packet_protection::Error>;

    /// Applies packet protection in place.
    fn encrypt(
        &mut self,
        packet_number: u64,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), packet_protection::Error>;

    /// Length of the AEAD tag appended to the ciphertext.
    fn tag_len(&self) -> usize;

    /// Maximum number of packets this key may encrypt before a key update
    /// is required.
    fn aead_confidentiality_limit(&self) -> u64;

    /// Maximum number of decryption failures tolerated before the
    /// connection must be closed.
    fn aead_integrity_limit(&self) -> u64;

    fn cipher_suite(&self) -> CipherSuite;
}

/// Additional operations available on the 1-RTT (application data) key,
/// needed to support key-phase rotation (RFC 9000 section 6).
pub trait OneRttKey: Key {
    /// Derives the next-phase key from this one, per RFC 9001 section 6.1.
    fn derive_next_key(&self) -> Self
    where
        Self: Sized;

    fn update_sealer_pmtu(&mut self, pmtu: u16);
    fn update_opener_pmtu(&mut self, pmtu: u16);
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;
    use crate::crypto::header_crypto::{HeaderKey as CryptoHeaderKey, HeaderProtectionMask};

    #[derive(Debug)]
    pub struct Key {
        pub confidentiality_limit: u64,
        pub integrity_limit: u64,
        pub derivations: u64,
        pub fail_on_decrypt: bool,
    }

    impl Key {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Default for Key {
        fn default() -> Self {
            Self {
                confidentiality_limit: 64,
                integrity_limit: 64,
                derivations: 0,
                fail_on_decrypt: false,
            }
        }
    }

    impl super::Key for Key {
        fn decrypt(
            &self,
            _packet_number: u64,
            _header: &[u8],
            _payload: &mut [u8],
        ) -> Result<(), packet_protection::Error> {
            if self.fail_on_decrypt {
                return Err(packet_protection::Error::DECRYPT_ERROR);
            }
            Ok(())
        }

        fn encrypt(
            &mut self,
            _packet_number: u64,
            _header: &[u8],
            _payload: &mut [u8],
        ) -> Result<(), packet_protection::Error> {
            Ok(())
        }

        fn tag_len(&self) -> usize {
            0
        }

        fn aead_confidentiality_limit(&self) -> u64 {
            self.confidentiality_limit
        }

        fn aead_integrity_limit(&self) -> u64 {
            self.integrity_limit
        }

        fn cipher_suite(&self) -> CipherSuite {
            CipherSuite::Unknown
        }
    }

    impl super::OneRttKey for Key {
        fn derive_next_key(&self) -> Self {
            Self {
                integrity_limit: self.integrity_limit,
                confidentiality_limit: self.confidentiality_limit,
                derivations: self.derivations + 1,
                fail_on_decrypt: self.fail_on_decrypt,
            }
        }

        fn update_sealer_pmtu(&mut self, _pmtu: u16) {}
        fn update_opener_pmtu(&mut self, _pmtu: u16) {}
    }

    #[derive(Debug, Default)]
    pub struct HeaderKey {}

    impl HeaderKey {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl CryptoHeaderKey for HeaderKey {
        fn opening_header_protection_mask(&self, _sample: &[u8]) -> HeaderProtectionMask {
            [0; 5]
        }

        fn opening_sample_len(&self) -> usize {
            0
        }

        fn sealing_header_protection_mask(&self, _sample: &[u8]) -> HeaderProtectionMask {
            [0; 5]
        }

        fn sealing_sample_len(&self) -> usize {
            0
        }
    }
}
