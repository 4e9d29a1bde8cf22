// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Packet numbers (RFC 9000 section 12.3): a per-space, monotonically
//! increasing counter that is truncated on the wire and reconstructed on
//! receipt relative to the largest packet number acknowledged so far.

mod packet_number;
mod packet_number_len;
mod packet_number_space;
mod packet_number_range;
mod protected_packet_number;
pub mod sliding_window;
mod truncated_packet_number;

pub use packet_number::PacketNumber;
pub use packet_number_len::PacketNumberLen;
pub use packet_number_range::PacketNumberRange;
pub use packet_number_space::PacketNumberSpace;
pub use protected_packet_number::ProtectedPacketNumber;
pub use sliding_window::{SlidingWindow, SlidingWindowError};
pub use truncated_packet_number::TruncatedPacketNumber;

use crate::varint::VarInt;

/// Both bits of a short-header packet tag that encode the truncated packet
/// number length.
const PACKET_NUMBER_LEN_MASK: u8 = 0b11;

/// Finds the smallest `PacketNumberLen` that lets `packet_number` be
/// unambiguously reconstructed relative to `largest_acknowledged_packet_number`.
///
/// A truncated encoding is safe as long as the window it can represent
/// (`2 * (packet_number - largest_acknowledged)`) doesn't overflow into
/// ambiguity with neighboring packet numbers; see RFC 9000 section 17.1.
fn derive_truncation_range(
    largest_acknowledged_packet_number: PacketNumber,
    packet_number: PacketNumber,
) -> Option<PacketNumberLen> {
    let space = packet_number.space();
    space.assert_eq(largest_acknowledged_packet_number.space());
    packet_number
        .as_u64()
        .checked_sub(largest_acknowledged_packet_number.as_u64())
        .and_then(|value| value.checked_mul(2))
        .and_then(|value| VarInt::new(value).ok())
        .and_then(|value| PacketNumberLen::from_varint(value, space))
}

/// Reconstructs the full packet number from its truncated wire encoding,
/// relative to the largest packet number acknowledged in the same space so
/// far (RFC 9000 Appendix A).
///
/// Rather than the constant-time window-selection used elsewhere in this
/// crate family, this picks the candidate closest to `expected_pn` using
/// plain wraparound arithmetic, which is adequate here since the packet
/// number itself is not a secret.
fn decode_packet_number(
    largest_pn: PacketNumber,
    truncated_pn: TruncatedPacketNumber,
) -> PacketNumber {
    let space = largest_pn.space();
    space.assert_eq(truncated_pn.space());

    let pn_nbits = truncated_pn.bitsize() as u32;
    let expected = largest_pn.as_u64().wrapping_add(1);
    let pn_win = 1u64 << pn_nbits;
    let not_mask_plus_one = pn_win;
    let high_bits_mask = !0u64 << pn_nbits;
    let pn = truncated_pn.into_u64();

    let mut pn64 = (expected & high_bits_mask) | pn;

    if pn64 < expected {
        let delta1 = expected - pn64;
        let delta2 = not_mask_plus_one - delta1;
        if delta2 < delta1 {
            pn64 = pn64.wrapping_add(not_mask_plus_one);
        }
    } else {
        let delta1 = pn64 - expected;
        let delta2 = not_mask_plus_one - delta1;
        if delta2 <= delta1 && (pn64 & high_bits_mask) > 0 {
            pn64 -= not_mask_plus_one;
        }
    }

    let pn64 = pn64.min(VarInt::MAX.as_u64());
    let candidate_pn = unsafe {
        debug_assert!(pn64 <= VarInt::MAX.as_u64());
        VarInt::new_unchecked(pn64)
    };
    PacketNumber::from_varint(candidate_pn, space)
}
