// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::{PacketNumber, PacketNumberLen};
use crate::varint::VarInt;

/// The packet number space a packet number belongs to (RFC 9000 section 12.3).
///
/// The numeric values back the top two bits of the packed `PacketNumber`
/// representation, so `Initial` must stay `1` to keep the backing `NonZeroU64`
/// non-zero for packet number `0`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PacketNumberSpace {
    #[default]
    Initial = 1,
    Handshake = 2,
    ApplicationData = 3,
}

impl PacketNumberSpace {
    #[inline]
    pub const fn is_initial(self) -> bool {
        matches!(self, Self::Initial)
    }

    #[inline]
    pub const fn is_handshake(self) -> bool {
        matches!(self, Self::Handshake)
    }

    #[inline]
    pub const fn is_application_data(self) -> bool {
        matches!(self, Self::ApplicationData)
    }

    /// Builds a `PacketNumber` tagged with this space.
    #[inline]
    pub fn new_packet_number(self, value: VarInt) -> PacketNumber {
        PacketNumber::from_varint(value, self)
    }

    /// Builds a `PacketNumberLen` in this space from a short-header packet tag.
    #[inline]
    pub fn new_packet_number_len(self, tag: u8) -> PacketNumberLen {
        PacketNumberLen::from_packet_tag(tag, self)
    }

    /// Panics (debug) or no-ops (release) if `self != other`; packet numbers
    /// and lengths must never be compared or combined across spaces.
    #[inline]
    pub fn assert_eq(self, other: Self) {
        debug_assert_eq!(self, other, "packet number spaces must match");
        let _ = other;
    }

    #[inline]
    pub(super) const fn as_tag(self) -> u8 {
        self as u8
    }

    #[inline]
    pub(super) fn from_tag(tag: u8) -> Self {
        match tag {
            1 => Self::Initial,
            2 => Self::Handshake,
            3 => Self::ApplicationData,
            _ => {
                debug_assert!(false, "invalid packet number space tag: {tag}");
                Self::Initial
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_test() {
        for space in [
            PacketNumberSpace::Initial,
            PacketNumberSpace::Handshake,
            PacketNumberSpace::ApplicationData,
        ] {
            assert_eq!(PacketNumberSpace::from_tag(space.as_tag()), space);
        }
    }
}
