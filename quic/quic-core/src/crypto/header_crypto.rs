// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::packet::number::{PacketNumberSpace, TruncatedPacketNumber};
use quic_codec::DecoderBuffer;

/// Types able to derive a header protection mask from an AEAD-encrypted
/// sample, per RFC 9001 section 5.4.
pub trait HeaderKey: Send {
    /// Derives the mask used when removing header protection.
    fn opening_header_protection_mask(&self, ciphertext_sample: &[u8]) -> HeaderProtectionMask;

    /// The sample size the opening mask function needs.
    fn opening_sample_len(&self) -> usize;

    /// Derives the mask used when applying header protection.
    fn sealing_header_protection_mask(&self, ciphertext_sample: &[u8]) -> HeaderProtectionMask;

    /// The sample size the sealing mask function needs.
    fn sealing_sample_len(&self) -> usize;
}

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.1
//# The output of this algorithm is a 5 byte mask that is applied to the
//# protected header fields using exclusive OR.
pub const HEADER_PROTECTION_MASK_LEN: usize = 5;
pub type HeaderProtectionMask = [u8; HEADER_PROTECTION_MASK_LEN];

const LONG_HEADER_TAG: u8 = 0x80;
pub(crate) const LONG_HEADER_MASK: u8 = 0x0f;
pub(crate) const SHORT_HEADER_MASK: u8 = 0x1f;

#[inline(always)]
fn mask_from_packet_tag(tag: u8) -> u8 {
    if tag & LONG_HEADER_TAG == LONG_HEADER_TAG {
        LONG_HEADER_MASK
    } else {
        SHORT_HEADER_MASK
    }
}

#[inline(always)]
fn xor_mask(payload: &mut [u8], mask: &[u8]) {
    for (payload_byte, mask_byte) in payload.iter_mut().zip(&mask[1..]) {
        *payload_byte ^= mask_byte;
    }
}

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.1
//# mask = header_protection(hp_key, sample)
//# pn_length = (packet[0] & 0x03) + 1
//# if (packet[0] & 0x80) == 0x80:
//#     packet[0] ^= mask[0] & 0x0f   # long header: 4 bits masked
//# else:
//#     packet[0] ^= mask[0] & 0x1f   # short header: 5 bits masked
//# packet[pn_offset:pn_offset+pn_length] ^= mask[1:1+pn_length]

/// Applies header protection to `packet[0..]`, where the packet number
/// starts at `header_len` with the length `packet_number_len` implies.
pub fn apply_header_protection(mask: HeaderProtectionMask, packet: &mut [u8], header_len: usize) {
    packet[0] ^= mask[0] & mask_from_packet_tag(packet[0]);
    let packet_number_len = PacketNumberSpace::ApplicationData.new_packet_number_len(packet[0]);
    let header_with_pn_len = packet_number_len.bytesize() + header_len;
    xor_mask(&mut packet[header_len..header_with_pn_len], &mask);
}

/// Removes header protection from `packet[0..]` and decodes the truncated
/// packet number that was revealed, along with the header length including
/// that packet number.
pub fn remove_header_protection(
    space: PacketNumberSpace,
    mask: HeaderProtectionMask,
    packet: &mut [u8],
    header_len: usize,
) -> Result<(TruncatedPacketNumber, usize), quic_codec::DecoderError> {
    packet[0] ^= mask[0] & mask_from_packet_tag(packet[0]);
    let packet_number_len = space.new_packet_number_len(packet[0]);

    let header_with_pn_len = packet_number_len.bytesize() + header_len;
    let packet_number_bytes = &mut packet[header_len..header_with_pn_len];
    xor_mask(packet_number_bytes, &mask);

    let (packet_number, _) = packet_number_len
        .decode_truncated_packet_number(DecoderBuffer::new(packet_number_bytes))?;

    Ok((packet_number, header_with_pn_len))
}
