// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::transport;
use core::fmt;

/// The internal return-kind taxonomy a packet handler reports back to the
/// dispatch loop.
///
/// `Ok` results and segment-level errors are handled inline by the caller
/// (drop the segment, optionally mark `ack_needed`); only connection-level
/// errors move the state machine into `closing`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// CID fields were malformed or inconsistent with the lookup; drop the
    /// segment.
    CidCheck,
    /// AEAD decryption failed; drop the segment.
    AeadCheck,
    /// A 1-RTT decrypt failed and the trailing 16 bytes matched the path's
    /// stateless-reset secret; abandon the connection.
    StatelessReset,
    /// The packet number was already recorded as received; drop the
    /// payload, mark the space's `ack_needed`.
    Duplicate,
    /// The initial packet requires a Retry response.
    Retry,
    /// The packet type is not allowed in the connection's current state;
    /// drop the segment.
    UnexpectedPacket,
    /// Server-side initial packet was shorter than the minimum datagram
    /// size.
    InitialTooShort,
    /// Server-side initial packet's destination CID was shorter than the
    /// enforced minimum.
    InitialCidTooShort,
    /// Coalesced segments in one datagram disagreed on destination CID.
    CidSegment,
    /// A newly created connection context was rejected before it completed
    /// construction.
    ConnectionDeleted,
    /// Unclassified; logged and dropped.
    Detected,
    /// Allocation failure.
    Memory,
    /// The connection is being closed with a transport error code.
    Transport(transport::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::CidCheck => write!(f, "connection id check failed"),
            Self::AeadCheck => write!(f, "AEAD decryption failed"),
            Self::StatelessReset => write!(f, "stateless reset received"),
            Self::Duplicate => write!(f, "duplicate packet number"),
            Self::Retry => write!(f, "retry required"),
            Self::UnexpectedPacket => write!(f, "unexpected packet type for current state"),
            Self::InitialTooShort => write!(f, "initial packet below minimum datagram size"),
            Self::InitialCidTooShort => write!(f, "initial destination CID below minimum length"),
            Self::CidSegment => write!(f, "coalesced segments disagreed on destination CID"),
            Self::ConnectionDeleted => write!(f, "connection deleted before completion"),
            Self::Detected => write!(f, "unclassified error"),
            Self::Memory => write!(f, "allocation failure"),
            Self::Transport(err) => err.fmt(f),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    fn from(err: transport::Error) -> Self {
        Self::Transport(err)
    }
}

impl Error {
    /// Whether this error is scoped to the segment (drop and continue) or
    /// the whole connection (transition to closing).
    #[inline]
    pub const fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::StatelessReset | Self::ConnectionDeleted | Self::Memory | Self::Transport(_)
        )
    }
}
