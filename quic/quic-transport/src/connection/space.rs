// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-[`PacketNumberSpace`] receive/send bookkeeping.
//!
//! Each of the three packet-number spaces independently tracks the next
//! locally-assigned packet number, the highest packet number the peer has
//! acknowledged, and the set of packet numbers already received (for
//! duplicate detection), per the data model's "packet-number spaces"
//! entity.

use quic_core::packet::number::{
    sliding_window::SlidingWindowError, PacketNumber, PacketNumberSpace, SlidingWindow,
};

/// State scoped to one packet-number space.
#[derive(Debug)]
pub struct SpaceState {
    space: PacketNumberSpace,
    next_send: u64,
    highest_acknowledged: Option<PacketNumber>,
    received: SlidingWindow,
    /// Set once a packet is received that requires an acknowledgement to be
    /// sent back (new data, or a duplicate needing an ack per RFC 9000
    /// section 13.2).
    ack_needed: bool,
}

impl SpaceState {
    pub fn new(space: PacketNumberSpace) -> Self {
        Self {
            space,
            next_send: 0,
            highest_acknowledged: None,
            received: SlidingWindow::default(),
            ack_needed: false,
        }
    }

    pub fn space(&self) -> PacketNumberSpace {
        self.space
    }

    /// The largest packet number received so far in this space, used to
    /// expand the next truncated packet number (RFC 9000 Appendix A). Before
    /// anything has been received, expansion falls back to the space's
    /// packet number `0`.
    pub fn largest_received(&self) -> PacketNumber {
        self.received
            .largest()
            .unwrap_or_else(|| self.space.new_packet_number(quic_core::VarInt::from_u8(0)))
    }

    /// Allocates the next packet number to send in this space.
    pub fn next_send_packet_number(&mut self) -> PacketNumber {
        let value = self.next_send;
        self.next_send += 1;
        self.space
            .new_packet_number(quic_core::VarInt::new(value).expect("packet number space exhausted"))
    }

    /// Records `pn` as received, detecting duplicates.
    ///
    /// Callers on the decrypt path should reject duplicates with
    /// [`Self::is_duplicate`] *before* attempting an AEAD open (spec section
    /// 4.1's pipeline removes packet protection before duplicate detection
    /// runs, not after) and only call this once decryption has actually
    /// succeeded, so a packet number is recorded "received" exactly once and
    /// only for authenticated packets (testable property 1).
    pub fn on_packet_received(&mut self, pn: PacketNumber) -> Result<(), SlidingWindowError> {
        let result = self.received.insert(pn);
        if result.is_ok() {
            self.ack_needed = true;
        } else if result == Err(SlidingWindowError::Duplicate) {
            self.ack_needed = true;
        }
        result
    }

    pub fn is_duplicate(&self, pn: PacketNumber) -> bool {
        self.received.check(pn).is_err()
    }

    /// Marks `ack_needed` for a packet number rejected by [`Self::is_duplicate`]
    /// without recording it as received again (spec section 4.2, "duplicate"
    /// recovery: "drop payload, mark ack_needed").
    pub fn note_duplicate(&mut self) {
        self.ack_needed = true;
    }

    /// Testable property: `highest_acknowledged` monotonically non-decreases.
    pub fn on_peer_ack(&mut self, acknowledged: PacketNumber) {
        match self.highest_acknowledged {
            Some(current) if current >= acknowledged => {}
            _ => self.highest_acknowledged = Some(acknowledged),
        }
    }

    pub fn highest_acknowledged(&self) -> Option<PacketNumber> {
        self.highest_acknowledged
    }

    pub fn ack_needed(&self) -> bool {
        self.ack_needed
    }

    pub fn clear_ack_needed(&mut self) {
        self.ack_needed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_marks_ack_needed_without_panicking() {
        let mut space = SpaceState::new(PacketNumberSpace::ApplicationData);
        let pn = space.next_send_packet_number();
        space.clear_ack_needed();

        assert!(space.on_packet_received(pn).is_ok());
        assert!(space.ack_needed());
        space.clear_ack_needed();

        assert!(space.on_packet_received(pn).is_err());
        assert!(space.ack_needed());
    }

    #[test]
    fn highest_acknowledged_is_monotonic() {
        let space_kind = PacketNumberSpace::ApplicationData;
        let mut space = SpaceState::new(space_kind);
        let low = space_kind.new_packet_number(quic_core::VarInt::from_u8(5));
        let high = space_kind.new_packet_number(quic_core::VarInt::from_u8(10));

        space.on_peer_ack(high);
        space.on_peer_ack(low);
        assert_eq!(space.highest_acknowledged(), Some(high));
    }
}
