// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A validated or validating (address, connection-id) pair.
//!
//! Paths are the unit of address-pair lifetime: `path[0]` is always the
//! connection's active default, and additional paths come into being when a
//! peer address changes (migration) or a NAT rebinding is suspected.

pub mod challenge;

use crate::{
    connection,
    inet::SocketAddress,
    recovery::{CongestionController, RttEstimator},
    stateless_reset,
    time::Timestamp,
};
use challenge::State as ChallengeState;

//= https://www.rfc-editor.org/rfc/rfc9000#section-14
//# UDP datagrams MUST NOT be fragmented at the IP layer ... the sender is
//# assumed to support a minimum datagram size of 1200 bytes.
pub const MINIMUM_MTU: u16 = 1200;

/// Initial PTO backoff multiplier; no additional increase yet applied.
pub const INITIAL_PTO_BACKOFF: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AmplificationState {
    /// No transmission limitations; the path has been validated by the peer.
    Validated,
    /// Subject to the 3x anti-amplification limit until validated.
    Limited { tx_bytes: u32, rx_bytes: u32 },
}

/// In-flight NAT-rebinding or migration probe: a candidate peer address seen
/// on a path that hasn't yet displaced the path's primary address.
#[derive(Clone, Debug, Default)]
pub struct AltPath {
    pub peer_address: Option<SocketAddress>,
    pub remote_connection_id: Option<connection::PeerId>,
    pub challenge: ChallengeState,
}

impl AltPath {
    pub fn is_active(&self) -> bool {
        self.peer_address.is_some()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// A validated (or validating) address pair and the congestion/RTT/challenge
/// state bound to it.
#[derive(Clone, Debug)]
pub struct Path<CC: CongestionController> {
    pub local_address: SocketAddress,
    pub peer_address: SocketAddress,

    pub local_connection_id: connection::LocalId,
    pub peer_connection_id: connection::PeerId,
    /// Sequence number of `peer_connection_id`, as issued by the peer in its
    /// NEW_CONNECTION_ID frame.
    pub peer_connection_id_sequence: u64,
    /// The stateless-reset secret the peer associated with
    /// `peer_connection_id`, used to recognize a stateless reset addressed
    /// to this path.
    pub stateless_reset_token: Option<stateless_reset::Token>,

    /// A candidate replacement address/CID pair under validation, used to
    /// detect NAT rebinding without disrupting the active path.
    pub alt: AltPath,

    pub challenge: ChallengeState,

    pub rtt_estimator: RttEstimator,
    pub congestion_controller: CC,
    pub pto_backoff: u32,

    amplification_state: AmplificationState,
    mtu: u16,

    pub is_registered: bool,
    pub is_activated: bool,
    pub is_published: bool,
}

impl<CC: CongestionController> Path<CC> {
    pub fn new(
        local_address: SocketAddress,
        peer_address: SocketAddress,
        local_connection_id: connection::LocalId,
        peer_connection_id: connection::PeerId,
        rtt_estimator: RttEstimator,
        congestion_controller: CC,
        peer_validated: bool,
    ) -> Self {
        Self {
            local_address,
            peer_address,
            local_connection_id,
            peer_connection_id,
            peer_connection_id_sequence: 0,
            stateless_reset_token: None,
            alt: AltPath::default(),
            challenge: ChallengeState::new(),
            rtt_estimator,
            congestion_controller,
            pto_backoff: INITIAL_PTO_BACKOFF,
            amplification_state: if peer_validated {
                AmplificationState::Validated
            } else {
                AmplificationState::Limited {
                    tx_bytes: 0,
                    rx_bytes: 0,
                }
            },
            mtu: MINIMUM_MTU,
            is_registered: false,
            is_activated: false,
            is_published: false,
        }
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    pub fn set_mtu(&mut self, mtu: u16) {
        self.mtu = mtu.max(MINIMUM_MTU);
    }

    pub fn is_peer_validated(&self) -> bool {
        matches!(self.amplification_state, AmplificationState::Validated)
    }

    pub fn on_validated(&mut self) {
        self.amplification_state = AmplificationState::Validated;
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-8.1
    //# Prior to validating the client address, servers MUST NOT send more
    //# than three times as many bytes as the number of bytes they have
    //# received.
    pub fn at_amplification_limit(&self) -> bool {
        match self.amplification_state {
            AmplificationState::Validated => false,
            AmplificationState::Limited { tx_bytes, rx_bytes } => tx_bytes >= rx_bytes * 3,
        }
    }

    pub fn clamp_mtu(&self, requested: usize) -> usize {
        match self.amplification_state {
            AmplificationState::Validated => requested.min(self.mtu as usize),
            AmplificationState::Limited { tx_bytes, rx_bytes } => {
                let budget = (rx_bytes * 3).saturating_sub(tx_bytes) as usize;
                requested.min(self.mtu as usize).min(budget)
            }
        }
    }

    pub fn on_bytes_transmitted(&mut self, bytes: usize) {
        if let AmplificationState::Limited { tx_bytes, .. } = &mut self.amplification_state {
            *tx_bytes += bytes as u32;
        }
    }

    /// Returns `true` if receiving these bytes unblocked the path from the
    /// anti-amplification limit.
    pub fn on_bytes_received(&mut self, bytes: usize) -> bool {
        let was_limited = self.at_amplification_limit();
        if let AmplificationState::Limited { rx_bytes, .. } = &mut self.amplification_state {
            *rx_bytes += bytes as u32;
        }
        was_limited && !self.at_amplification_limit()
    }

    /// Re-arms the primary path challenge: 3 fresh 64-bit values, cleared
    /// `verified`/`repeat_count`, freshly stamped `challenge_time`.
    pub fn rearm_challenge<R: crate::random::Generator>(&mut self, random: &mut R, now: Timestamp) {
        self.challenge.arm(random, now);
    }

    /// Consumes a PATH_RESPONSE against the primary challenge, validating the
    /// path on a match.
    pub fn on_path_response(&mut self, data: u64) -> bool {
        if self.challenge.on_response(data) {
            self.on_validated();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        inet::{IpV4Address, SocketAddressV4},
        recovery::CubicCongestionController,
    };

    fn addr(port: u16) -> SocketAddress {
        SocketAddress::IpV4(SocketAddressV4::new(IpV4Address::from([127, 0, 0, 1]), port))
    }

    fn new_path(peer_validated: bool) -> Path<CubicCongestionController> {
        Path::new(
            addr(443),
            addr(4433),
            connection::LocalId::try_from([1u8, 2, 3, 4].as_slice()).unwrap(),
            connection::PeerId::try_from([5u8, 6, 7, 8].as_slice()).unwrap(),
            RttEstimator::new(core::time::Duration::from_millis(25)),
            CubicCongestionController::new(MINIMUM_MTU),
            peer_validated,
        )
    }

    #[test]
    fn unvalidated_path_enforces_amplification_limit() {
        let mut path = new_path(false);
        assert!(path.at_amplification_limit());

        path.on_bytes_received(100);
        assert!(!path.at_amplification_limit());
        assert_eq!(path.clamp_mtu(10_000), 300);

        path.on_bytes_transmitted(300);
        assert!(path.at_amplification_limit());
    }

    #[test]
    fn validated_path_has_no_amplification_limit() {
        let path = new_path(true);
        assert!(!path.at_amplification_limit());
        assert_eq!(path.clamp_mtu(10_000), MINIMUM_MTU as usize);
    }

    #[test]
    fn receiving_bytes_can_unblock_amplification_limit() {
        let mut path = new_path(false);
        assert!(!path.on_bytes_received(0));
        assert!(path.on_bytes_received(50));
    }
}
