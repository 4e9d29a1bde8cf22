// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The stateless responder (spec section 4.4): version negotiation, retry,
//! and stateless-reset packets, each emitted without a connection context.
//!
//! None of these three emissions touch the connection registry or a
//! [`crate::connection::Connection`]; they are pure functions of the
//! triggering datagram's visible header fields plus a random-bit source,
//! which is why they live apart from [`crate::endpoint`]'s dispatch loop.

use quic_codec::{Encoder, EncoderBuffer, EncoderValue};
use quic_core::{
    connection::LocalId,
    crypto::retry::{RetryKey, INTEGRITY_TAG_LEN},
    random, stateless_reset,
};

const LONG_HEADER_FORM: u8 = 0x80;
const FIXED_BIT: u8 = 0x40;
const RETRY_TYPE_TAG: u8 = 0xf0;
const VERSION_NEGOTIATION: u32 = 0;

/// Picks a GREASE version per spec section 4.4: `0x?A?A?A?A`, distinct from
/// `requested`. Every nibble the `?` leaves unconstrained is randomized so
/// repeated negotiation packets don't all advertise the same bogus version.
pub fn grease_version<R: random::Generator>(requested: u32, random: &mut R) -> u32 {
    loop {
        let mut bytes = [0u8; 4];
        random.public_random_fill(&mut bytes);
        for byte in bytes.iter_mut() {
            *byte = (*byte & 0xf0) | 0x0a;
        }
        let candidate = u32::from_be_bytes(bytes);
        if candidate != requested {
            return candidate;
        }
    }
}

/// Emits a Version Negotiation packet into `buffer`, returning the number
/// of bytes written. `destination_connection_id`/`source_connection_id` are
/// already the *response's* CIDs -- i.e. the caller has flipped the
/// triggering Initial's source/destination before calling this.
pub fn version_negotiation<R: random::Generator>(
    destination_connection_id: &[u8],
    source_connection_id: &[u8],
    requested_version: u32,
    supported_versions: &[u32],
    random: &mut R,
    buffer: &mut [u8],
) -> usize {
    let mut encoder = EncoderBuffer::new(buffer);

    //= https://www.rfc-editor.org/rfc/rfc9000#section-17.2.1
    //# The value in the Unused field is set to an arbitrary value by the
    //# server.
    let mut first_byte = [0u8; 1];
    random.public_random_fill(&mut first_byte);
    encoder.encode(&(first_byte[0] | LONG_HEADER_FORM));
    encoder.encode(&VERSION_NEGOTIATION);
    encoder.encode(&(destination_connection_id.len() as u8));
    encoder.encode(&destination_connection_id);
    encoder.encode(&(source_connection_id.len() as u8));
    encoder.encode(&source_connection_id);

    for version in supported_versions {
        encoder.encode(version);
    }
    let grease = grease_version(requested_version, random);
    encoder.encode(&grease);

    encoder.len()
}

/// Emits a Retry packet into `buffer`, returning the byte range of the
/// emitted packet (the front of `buffer` is used as scratch for the
/// Retry Integrity Tag's pseudo-packet, per RFC 9001 section 5.8, and is not
/// itself part of the wire packet).
///
/// `destination_connection_id` is the client's source connection ID (the
/// Retry's header echoes it back as the new destination);
/// `source_connection_id` is the server-chosen CID the client should use
/// as destination on its next Initial.
pub fn retry<K: RetryKey>(
    version: u32,
    original_destination_connection_id: &[u8],
    destination_connection_id: &[u8],
    source_connection_id: &LocalId,
    token: &[u8],
    buffer: &mut [u8],
) -> Option<core::ops::Range<usize>> {
    let mut encoder = EncoderBuffer::new(buffer);

    // pseudo-packet prefix: ODCIL + ODCID, present only for the tag
    // computation, never transmitted.
    encoder.encode(&(original_destination_connection_id.len() as u8));
    encoder.encode(&original_destination_connection_id);
    let start = encoder.len();

    //= https://www.rfc-editor.org/rfc/rfc9000#section-17.2.5.1
    //# This value MUST NOT be equal to the Destination
    //# Connection ID field of the packet sent by the client.
    if source_connection_id.as_ref() == destination_connection_id {
        return None;
    }

    encoder.encode(&(RETRY_TYPE_TAG | LONG_HEADER_FORM | FIXED_BIT));
    encoder.encode(&version);
    encoder.encode(&(destination_connection_id.len() as u8));
    encoder.encode(&destination_connection_id);
    encoder.encode(&(source_connection_id.as_bytes().len() as u8));
    encoder.encode(&source_connection_id.as_bytes());
    encoder.encode(&token);

    //= https://www.rfc-editor.org/rfc/rfc9001#section-5.8
    //# The Retry Integrity Tag is a 128-bit field that is computed as the
    //# output of AEAD_AES_128_GCM [AEAD] used with [...] the Retry
    //# Pseudo-Packet as the plaintext.
    let tag = K::generate_tag(encoder.as_mut_slice());
    encoder.write_slice(&tag);

    let end = encoder.len();
    Some(start..end)
}

/// Emits a stateless-reset packet (spec section 4.4): random lower bits in
/// the first byte, a random pad, and the 16-byte reset secret trailing.
/// Returns `None` if the triggering packet was too small for a response
/// that stays smaller than it (RFC 9000 section 10.3 anti-amplification
/// requirement) while still carrying the minimum pad.
pub fn stateless_reset<R: random::Generator>(
    token: stateless_reset::Token,
    triggering_packet_len: usize,
    random: &mut R,
    buffer: &mut [u8],
) -> Option<usize> {
    const MIN_PAD_LEN: usize = 20;
    let token_len = stateless_reset::token::LEN;
    let min_len = MIN_PAD_LEN + token_len;
    let max_len = triggering_packet_len.saturating_sub(1).min(buffer.len());

    if max_len < min_len {
        return None;
    }

    let pad_max = max_len - token_len;
    let pad_len = gen_range(random, MIN_PAD_LEN, pad_max);

    random.public_random_fill(&mut buffer[..pad_len]);
    //= https://www.rfc-editor.org/rfc/rfc9000#section-10.3
    //# Endpoints MUST send Stateless Resets formatted as a packet
    //# with a short header.
    buffer[0] = (buffer[0] >> 2) | FIXED_BIT;

    let packet_len = pad_len + token_len;
    buffer[pad_len..packet_len].copy_from_slice(token.as_ref());
    Some(packet_len)
}

fn gen_range<R: random::Generator>(random: &mut R, min: usize, max: usize) -> usize {
    if min >= max {
        return min;
    }
    let span = (max - min) as u64 + 1;
    let mut bytes = [0u8; 8];
    random.public_random_fill(&mut bytes);
    min + (u64::from_be_bytes(bytes) % span) as usize
}
