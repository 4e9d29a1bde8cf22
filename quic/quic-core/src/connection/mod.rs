// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Connection identifiers, the per-connection configuration surface, and
//! mechanical connection-scoped types shared with `quic-transport`. The
//! connection state machine itself lives there, built from the [`crate::state`]
//! macros over these types.

pub mod error;
pub mod id;

pub use error::Error;
pub use id::{InitialId, LocalId, PeerId, UnboundedId};

use core::time::Duration;

/// The four crypto/key-derivation epochs a connection progresses through
/// (RFC 9001 section 4.1), in packet-protection installation order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Epoch {
    #[default]
    Initial = 0,
    ZeroRtt = 1,
    Handshake = 2,
    ApplicationData = 3,
}

impl Epoch {
    /// The packet-number space this epoch shares with its packets. 0-RTT and
    /// 1-RTT packets share the `ApplicationData` space.
    #[inline]
    pub const fn packet_number_space(self) -> crate::packet::number::PacketNumberSpace {
        use crate::packet::number::PacketNumberSpace;
        match self {
            Self::Initial => PacketNumberSpace::Initial,
            Self::Handshake => PacketNumberSpace::Handshake,
            Self::ZeroRtt | Self::ApplicationData => PacketNumberSpace::ApplicationData,
        }
    }
}

/// Per-connection limits and timers: the configuration surface for this
/// core, exposed as a plain struct with builder-style setters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Limits {
    /// Minimum UDP datagram size a server-side initial packet must meet
    /// before the connection is created (RFC 9000 section 14.1).
    pub min_initial_datagram_size: usize,
    /// Minimum destination CID length a server-side initial packet must
    /// carry.
    pub min_initial_dcid_len: usize,
    /// Maximum number of path-validation challenges retried before the
    /// path is abandoned.
    pub challenge_repeat_max: u8,
    /// Time after which an idle connection is torn down.
    pub max_idle_timeout: Duration,
    /// Time a closing connection spends draining before final teardown.
    pub drain_timeout: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_initial_datagram_size: 1200,
            min_initial_dcid_len: 8,
            challenge_repeat_max: 3,
            max_idle_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(3),
        }
    }
}

impl Limits {
    pub fn with_min_initial_datagram_size(mut self, value: usize) -> Self {
        self.min_initial_datagram_size = value;
        self
    }

    pub fn with_max_idle_timeout(mut self, value: Duration) -> Self {
        self.max_idle_timeout = value;
        self
    }
}
