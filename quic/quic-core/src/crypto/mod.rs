// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Packet and header protection (RFC 9001), narrowed to what the receive
//! pipeline and key-phase rotation need. The TLS 1.3 handshake itself is a
//! collaborator (see [`tls`]), not implemented here.

pub mod error;
pub mod header_crypto;
pub mod key;
pub mod packet_protection;
pub mod retry;
pub mod tls;

pub use error::CryptoError;
pub use header_crypto::{HeaderKey, HeaderProtectionMask};
pub use key::{Key, OneRttKey};

/// The set of keys (AEAD + header protection) active for one epoch, in one
/// direction.
pub trait CryptoSuite {
    type HandshakeKey: Key;
    type HandshakeHeaderKey: HeaderKey;
    type InitialKey: Key;
    type InitialHeaderKey: HeaderKey;
    type OneRttKey: Key + OneRttKey;
    type OneRttHeaderKey: HeaderKey;
    type ZeroRttKey: Key;
    type ZeroRttHeaderKey: HeaderKey;
}
