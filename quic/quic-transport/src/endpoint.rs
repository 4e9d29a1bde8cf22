// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Incoming-datagram dispatch: the receive pipeline that ties
//! [`quic_core::packet`]'s header parsing together with the connection
//! registry, path manager, and per-epoch crypto contexts.
//!
//! A single UDP datagram may carry several coalesced QUIC packets (section
//! 17.2's "Client Initial... coalesced with 0-RTT"). [`decode_segment`]
//! peels one segment off the front; the caller re-invokes it on the
//! remainder until the datagram is consumed, passing the first segment's
//! destination CID back in as `expected_dcid` so later segments that
//! disagree are rejected outright, feeding each segment's header to
//! [`route`] and then, once a connection is resolved, to
//! [`receive_segment`].

use crate::{
    connection::{crypto::Selection, Connection, State},
    path_manager::PathId,
    registry::{Handle, Registry},
};
use quic_codec::DecoderBufferMut;
use quic_core::{
    connection::{self, Epoch, LocalId, Limits},
    crypto::{packet_protection, CryptoSuite, HeaderKey, Key, OneRttKey},
    inet::{ExplicitCongestionNotification, SocketAddress},
    packet::{self, number::PacketNumber, Header, PacketType},
    recovery::CongestionController,
    stateless_reset,
    time::Timestamp,
};
use core::time::Duration;

/// Decodes the next coalesced segment's header from the front of
/// `datagram`, returning it together with that segment's total byte length
/// (header, packet number, and payload). The caller slices `datagram` at
/// that length to isolate the segment and, if bytes remain, repeats on the
/// remainder.
///
/// `expected_dcid`, when given, must match this segment's destination CID
/// exactly -- it is the first segment's DCID, checked against every
/// subsequent coalesced segment in the same datagram (section 7,
/// `cnxid_segment`: "coalesced segments disagreed on DCID").
pub fn decode_segment(
    datagram: &mut [u8],
    local_cid_len: usize,
    expected_dcid: Option<&[u8]>,
) -> Result<(Header, usize), connection::Error> {
    let datagram_len = datagram.len();
    let (header, _) = packet::decode(DecoderBufferMut::new(datagram), local_cid_len)
        .map_err(|_| connection::Error::Detected)?;

    if let Some(expected) = expected_dcid {
        if header.destination_connection_id.get(datagram) != expected {
            return Err(connection::Error::CidSegment);
        }
    }

    let packet_len = header.packet_len(datagram_len);
    Ok((header, packet_len))
}

/// What a decoded header resolves to in the connection registry (section
/// 4.1, "Connection lookup").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route<H: Handle> {
    /// An existing connection owns this segment.
    Existing(H),
    /// No connection matched, but a server-side Initial may create one.
    CreateServer,
    /// No connection matched and none can be created from this packet type;
    /// only a stateless response (or silence) is possible.
    Stateless,
}

/// Resolves `header`'s destination connection ID (and, in zero-length-CID
/// deployments, `peer_address`) against `registry`.
pub fn route<H: Handle>(
    registry: &Registry<H>,
    header: &Header,
    segment: &[u8],
    peer_address: Option<&SocketAddress>,
) -> Route<H> {
    let dcid = header.destination_connection_id.get(segment);
    // zero-length local CIDs still need a `LocalId` to probe `by_cid` with;
    // the lookup falls back to the address index, so the exact bytes here
    // only matter for the (unlikely) nonzero-length collision case.
    let probe = if dcid.is_empty() {
        LocalId::try_from_bytes(&[0u8; 4])
    } else {
        LocalId::try_from_bytes(dcid)
    };

    if let Some(probe) = probe {
        if let Some(handle) = registry.lookup(&probe, peer_address) {
            return Route::Existing(handle);
        }
    }

    if header.packet_type == PacketType::Initial {
        Route::CreateServer
    } else {
        Route::Stateless
    }
}

/// Section 4.2's admission checks for a server-side Initial that is about to
/// create a new connection: the triggering datagram must meet the minimum
/// size RFC 9000 section 14.1 requires, and the client's chosen destination
/// CID must meet this endpoint's configured minimum.
pub fn admit_server_initial(
    header: &Header,
    datagram_len: usize,
    segment: &[u8],
    limits: &Limits,
) -> Result<(), connection::Error> {
    if datagram_len < limits.min_initial_datagram_size {
        return Err(connection::Error::InitialTooShort);
    }
    if header.destination_connection_id.get(segment).len() < limits.min_initial_dcid_len {
        return Err(connection::Error::InitialCidTooShort);
    }
    Ok(())
}

/// What to do with a segment once its packet type has been checked against
/// the connection's current state (section 4.2's per-type acceptance
/// rules).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Process the segment normally.
    Accept,
    /// The handshake is confirmed; the segment is still acknowledged (it
    /// may be a retransmission the peer hasn't learned to stop sending) but
    /// nothing else is done with it.
    AcknowledgeOnly,
    /// The packet type is not valid in the connection's current state.
    Reject(connection::Error),
}

/// Applies section 4.2's epoch-gating rules for one packet type against a
/// connection's current state.
pub fn epoch_gate<C: CryptoSuite, CC: CongestionController>(
    connection: &Connection<C, CC>,
    packet_type: PacketType,
    now: Timestamp,
    pto: Duration,
) -> Disposition {
    use State::*;

    match packet_type {
        PacketType::Initial => {
            if matches!(
                connection.state,
                ClientInitSent
                    | ClientInitResent
                    | ClientHandshakeStart
                    | ServerListening
                    | ServerInit
                    | ServerAlmostReady
            ) {
                Disposition::Accept
            } else {
                Disposition::Reject(connection::Error::UnexpectedPacket)
            }
        }
        PacketType::ZeroRtt => {
            if connection.state.accepts_zero_rtt() {
                Disposition::Accept
            } else {
                Disposition::Reject(connection::Error::UnexpectedPacket)
            }
        }
        PacketType::Handshake => {
            if !connection.accepts_handshake_epoch(now, pto) {
                Disposition::Reject(connection::Error::UnexpectedPacket)
            } else if connection.state.is_ready() {
                Disposition::AcknowledgeOnly
            } else {
                Disposition::Accept
            }
        }
        PacketType::Retry => {
            if matches!(connection.state, ClientInitSent | ClientInitResent)
                && !connection.retry_accepted
            {
                Disposition::Accept
            } else {
                Disposition::Reject(connection::Error::UnexpectedPacket)
            }
        }
        PacketType::VersionNegotiation => {
            if matches!(connection.state, ClientInitSent | ClientInitResent) {
                Disposition::Accept
            } else {
                Disposition::Reject(connection::Error::UnexpectedPacket)
            }
        }
        PacketType::Short => {
            if connection.state.accepts_one_rtt() {
                Disposition::Accept
            } else {
                Disposition::Reject(connection::Error::UnexpectedPacket)
            }
        }
    }
}

/// Removes header protection and packet protection in place for a
/// single-key epoch (Initial, 0-RTT, Handshake), recording the reconstructed
/// packet number against `space` for duplicate detection.
///
/// Duplicate detection (section 4.1's pipeline: "remove header protection →
/// remove packet protection → ... " with duplicate detection following
/// protection removal) is checked with the non-mutating
/// [`crate::connection::space::SpaceState::is_duplicate`] before the AEAD
/// open, and the packet number is only recorded as received
/// ([`crate::connection::space::SpaceState::on_packet_received`]) once that
/// open has actually succeeded -- an unauthenticated packet never occupies a
/// slot in the receive window, so a later, legitimate packet carrying the
/// same number is not mistaken for a duplicate (testable property 1).
///
/// `segment` must start at the first byte of this header and extend exactly
/// to the end of this packet (the caller has already isolated it from any
/// coalesced neighbors via [`Header::packet_len`]).
fn open_single_key<K: Key, H: HeaderKey>(
    header: &mut Header,
    segment: &mut [u8],
    opener: Option<&K>,
    header_key: Option<&H>,
    space: &mut crate::connection::space::SpaceState,
) -> Result<PacketNumber, connection::Error> {
    let header_key = header_key.ok_or(connection::Error::Detected)?;
    let opener = opener.ok_or(connection::Error::Detected)?;

    header
        .remove_header_protection(header_key, segment)
        .map_err(|_| connection::Error::Detected)?;

    let header_len = header.header_len;
    let packet_len = segment.len();
    let truncated = header
        .packet_number
        .expect("remove_header_protection always sets packet_number on success");
    let full_pn = truncated.expand(space.largest_received());

    if space.is_duplicate(full_pn) {
        space.note_duplicate();
        return Err(connection::Error::Duplicate);
    }

    let (header_bytes, rest) = segment.split_at_mut(header_len);
    let payload = &mut rest[..packet_len - header_len];
    opener
        .decrypt(full_pn.as_u64(), header_bytes, payload)
        .map_err(|_| connection::Error::AeadCheck)?;

    space
        .on_packet_received(full_pn)
        .map_err(|_| connection::Error::Duplicate)?;

    Ok(full_pn)
}

/// The 1-RTT counterpart to [`open_single_key`]: selects (and, on a phase
/// flip, derives) the opener per section 4.1.2, and on AEAD failure checks
/// the trailing bytes against the path's stateless-reset secret before
/// reporting an ordinary decrypt failure (section 4.1.2's stateless-reset
/// detection, testable property 5).
#[allow(clippy::too_many_arguments)]
fn open_one_rtt<K: OneRttKey, H: HeaderKey>(
    header: &mut Header,
    segment: &mut [u8],
    keys: &mut crate::connection::crypto::ApplicationKeys<K, H>,
    space: &mut crate::connection::space::SpaceState,
    reset_secret: Option<&stateless_reset::Token>,
    retransmit_timer: Duration,
    now: Timestamp,
) -> Result<PacketNumber, connection::Error> {
    let header_key = keys.header_opener.as_ref().ok_or(connection::Error::Detected)?;

    header
        .remove_header_protection(header_key, segment)
        .map_err(|_| connection::Error::Detected)?;

    let header_len = header.header_len;
    let packet_len = segment.len();
    let truncated = header
        .packet_number
        .expect("remove_header_protection always sets packet_number on success");
    let full_pn = truncated.expand(space.largest_received());

    if space.is_duplicate(full_pn) {
        space.note_duplicate();
        return Err(connection::Error::Duplicate);
    }

    let selection = keys.select_opener(header.key_phase, full_pn.as_u64(), now, retransmit_timer);

    let (header_bytes, rest) = segment.split_at_mut(header_len);
    let payload = &mut rest[..packet_len - header_len];

    let decrypted = match &selection {
        Some(Selection::Existing(key)) => key.decrypt(full_pn.as_u64(), header_bytes, payload),
        Some(Selection::Derived(key)) => key.decrypt(full_pn.as_u64(), header_bytes, payload),
        Some(Selection::ExpiredOld) | None => Err(packet_protection::Error::DECRYPT_ERROR),
    };

    if decrypted.is_err() {
        if let Some(secret) = reset_secret {
            if packet_len >= stateless_reset::MIN_STATELESS_RESET_PACKET_LEN {
                let trailing = &segment[packet_len - stateless_reset::token::LEN..];
                if let Ok(candidate) = stateless_reset::Token::try_from(trailing) {
                    if candidate == *secret {
                        return Err(connection::Error::StatelessReset);
                    }
                }
            }
        }
        return Err(connection::Error::AeadCheck);
    }

    space
        .on_packet_received(full_pn)
        .map_err(|_| connection::Error::Duplicate)?;

    if let Some(Selection::Derived(derived)) = selection {
        keys.commit_rotation(derived, full_pn.as_u64(), now, retransmit_timer);
    }

    Ok(full_pn)
}

/// Outcome of processing one segment once a connection was resolved for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Received {
    pub packet_type: PacketType,
    pub packet_number: PacketNumber,
    pub path_id: PathId,
}

/// Processes one already-routed segment against `connection`: epoch-gates
/// it, removes header and packet protection for the epochs that carry one,
/// resolves the 1-RTT path, accounts `ecn` against the connection's ECN
/// counters when the segment landed on the default path (spec section 4.3,
/// "ECN"), and returns what was received. Segment-level errors
/// (`!is_connection_fatal()`) are the caller's to drop and continue past;
/// connection-level errors should drive the connection to `closing`.
#[allow(clippy::too_many_arguments)]
pub fn receive_segment<C, CC, R>(
    connection: &mut Connection<C, CC>,
    header: &mut Header,
    segment: &mut [u8],
    peer_address: SocketAddress,
    local_address: SocketAddress,
    ecn: ExplicitCongestionNotification,
    random: &mut R,
    now: Timestamp,
) -> Result<Received, connection::Error>
where
    C: CryptoSuite,
    CC: CongestionController + Clone,
    R: quic_core::random::Generator,
{
    let packet_type = header.packet_type;
    let pto = connection
        .paths
        .path(connection.paths.active_path_id())
        .rtt_estimator
        .pto_period(1, packet_type.space());

    match epoch_gate(connection, packet_type, now, pto) {
        Disposition::Reject(err) => return Err(err),
        Disposition::AcknowledgeOnly | Disposition::Accept => {}
    }

    if !packet_type.has_packet_number() {
        // Retry and version negotiation carry no packet-protected payload;
        // their effect on connection/path state is applied by the caller
        // once it has validated the Retry integrity tag (out of this
        // pipeline's scope, which stops at the decrypted-or-rejected
        // segment).
        return Err(connection::Error::Detected);
    }

    let epoch = packet_type.epoch();
    let space = connection.spaces.get(packet_type.space());

    let packet_number = match epoch {
        Epoch::Initial => open_single_key(
            header,
            segment,
            connection.crypto.initial.opener.as_ref(),
            connection.crypto.initial.opener_header.as_ref(),
            space,
        )?,
        Epoch::Handshake => open_single_key(
            header,
            segment,
            connection.crypto.handshake.opener.as_ref(),
            connection.crypto.handshake.opener_header.as_ref(),
            space,
        )?,
        Epoch::ZeroRtt => open_single_key(
            header,
            segment,
            connection.crypto.zero_rtt.opener.as_ref(),
            connection.crypto.zero_rtt.opener_header.as_ref(),
            space,
        )?,
        Epoch::ApplicationData => {
            let retransmit_timer = pto;
            let reset_secret = connection
                .paths
                .path(connection.paths.active_path_id())
                .stateless_reset_token
                .as_ref();
            open_one_rtt(
                header,
                segment,
                &mut connection.crypto.application,
                space,
                reset_secret,
                retransmit_timer,
                now,
            )?
        }
    };

    let path_id = if packet_type == PacketType::Short {
        let destination_cid = LocalId::try_from_bytes(&[0u8; 4]).expect("4 zero bytes is a valid LocalId");
        let destination_cid = LocalId::try_from_bytes(header.destination_connection_id.get(segment))
            .unwrap_or(destination_cid);
        let resolved = connection
            .paths
            .resolve(&destination_cid, peer_address, local_address)?;
        let (path_id, _event) =
            connection
                .paths
                .on_peer_address(resolved, peer_address, local_address, random, now);
        path_id
    } else {
        connection.paths.active_path_id()
    };

    if connection.paths.is_default(path_id) {
        connection.ecn.on_packet_received(ecn);
    }

    Ok(Received {
        packet_type,
        packet_number,
        path_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        connection::crypto::ApplicationKeys,
        path_manager::PathManager,
        registry::Registry,
    };
    use quic_codec::{Encoder, EncoderBuffer, EncoderValue};
    use quic_core::{
        connection::{Epoch, LocalId as Cid, PeerId},
        crypto::key::testing::{HeaderKey as TestHeaderKey, Key as TestKey},
        inet::{IpV4Address, SocketAddressV4},
        path::Path,
        random::testing::Generator as TestRandom,
        recovery::{CubicCongestionController, RttEstimator},
        time::{Clock, NoopClock},
        varint::VarInt,
    };

    struct TestSuite;
    impl CryptoSuite for TestSuite {
        type HandshakeKey = TestKey;
        type HandshakeHeaderKey = TestHeaderKey;
        type InitialKey = TestKey;
        type InitialHeaderKey = TestHeaderKey;
        type OneRttKey = TestKey;
        type OneRttHeaderKey = TestHeaderKey;
        type ZeroRttKey = TestKey;
        type ZeroRttHeaderKey = TestHeaderKey;
    }

    fn addr(port: u16) -> SocketAddress {
        SocketAddress::IpV4(SocketAddressV4::new(IpV4Address::from([127, 0, 0, 1]), port))
    }

    fn new_connection() -> Connection<TestSuite, CubicCongestionController> {
        let path = Path::new(
            addr(443),
            addr(4433),
            Cid::try_from([1u8, 2, 3, 4].as_slice()).unwrap(),
            PeerId::try_from([5u8, 6, 7, 8].as_slice()).unwrap(),
            RttEstimator::new(Duration::from_millis(25)),
            CubicCongestionController::new(quic_core::path::MINIMUM_MTU),
            true,
        );
        let paths = PathManager::new(path, 4, 3);
        Connection::new(State::ServerListening, paths, Limits::default())
    }

    fn encode_short(dcid: &[u8], pn_byte: u8) -> Vec<u8> {
        let mut out = vec![0u8; 64];
        let mut encoder = EncoderBuffer::new(&mut out);
        encoder.encode(&0x40u8);
        encoder.encode(&dcid);
        encoder.encode(&pn_byte);
        for _ in 0..16 {
            encoder.encode(&0u8);
        }
        let len = encoder.len();
        out.truncate(len);
        out
    }

    #[test]
    fn routes_to_existing_connection_by_cid() {
        let mut registry: Registry<u32> = Registry::new(false);
        let cid = Cid::try_from([1u8, 2, 3, 4].as_slice()).unwrap();
        registry.insert_cid(cid, 9);

        let mut bytes = encode_short(&[1, 2, 3, 4], 0);
        let (header, _) = packet::decode(DecoderBufferMut::new(&mut bytes), 4).unwrap();

        match route(&registry, &header, &bytes, None) {
            Route::Existing(handle) => assert_eq!(handle, 9),
            other => panic!("expected an existing route, got {other:?}"),
        }
    }

    #[test]
    fn unmatched_initial_requests_server_creation() {
        let registry: Registry<u32> = Registry::new(false);
        let mut out = vec![0u8; 64];
        let mut encoder = EncoderBuffer::new(&mut out);
        let dcid: &[u8] = &[1u8, 2, 3, 4, 5, 6, 7, 8];
        encoder.encode(&0xc0u8);
        encoder.encode(&1u32);
        encoder.encode(&8u8);
        encoder.encode(&dcid);
        encoder.encode(&0u8);
        VarInt::try_from(0usize).unwrap().encode(&mut encoder);
        VarInt::try_from(0usize).unwrap().encode(&mut encoder);
        let len = encoder.len();
        out.truncate(len);

        let (header, _) = packet::decode(DecoderBufferMut::new(&mut out), 0).unwrap();
        assert_eq!(route(&registry, &header, &out, None), Route::CreateServer);
    }

    #[test]
    fn unmatched_short_header_is_stateless() {
        let registry: Registry<u32> = Registry::new(false);
        let mut bytes = encode_short(&[9, 9, 9, 9], 0);
        let (header, _) = packet::decode(DecoderBufferMut::new(&mut bytes), 4).unwrap();
        assert_eq!(route(&registry, &header, &bytes, None), Route::Stateless);
    }

    #[test]
    fn server_initial_below_minimum_datagram_size_is_rejected() {
        let mut out = vec![0u8; 64];
        let mut encoder = EncoderBuffer::new(&mut out);
        let dcid: &[u8] = &[1u8, 2, 3, 4, 5, 6, 7, 8];
        encoder.encode(&0xc0u8);
        encoder.encode(&1u32);
        encoder.encode(&8u8);
        encoder.encode(&dcid);
        encoder.encode(&0u8);
        VarInt::try_from(0usize).unwrap().encode(&mut encoder);
        VarInt::try_from(0usize).unwrap().encode(&mut encoder);
        let len = encoder.len();
        out.truncate(len);

        let (header, _) = packet::decode(DecoderBufferMut::new(&mut out), 0).unwrap();
        let err = admit_server_initial(&header, out.len(), &out, &Limits::default()).unwrap_err();
        assert_eq!(err, connection::Error::InitialTooShort);
    }

    #[test]
    fn epoch_gate_rejects_one_rtt_before_almost_ready() {
        let connection = new_connection();
        let now = NoopClock.get_time();
        let disposition = epoch_gate(&connection, PacketType::Short, now, Duration::from_millis(100));
        assert_eq!(
            disposition,
            Disposition::Reject(connection::Error::UnexpectedPacket)
        );
    }

    #[test]
    fn epoch_gate_acknowledges_handshake_packets_after_ready_within_the_drain_window() {
        let mut connection = new_connection();
        connection.state = State::Ready;
        let now = NoopClock.get_time();
        connection.mark_ready(now);

        let pto = Duration::from_millis(100);
        let disposition = epoch_gate(&connection, PacketType::Handshake, now, pto);
        assert_eq!(disposition, Disposition::AcknowledgeOnly);

        let past_window = now + pto * 4;
        let disposition = epoch_gate(&connection, PacketType::Handshake, past_window, pto);
        assert_eq!(
            disposition,
            Disposition::Reject(connection::Error::UnexpectedPacket)
        );
    }

    #[test]
    fn receive_segment_decrypts_and_resolves_a_one_rtt_packet() {
        let mut connection = new_connection();
        connection.state = State::Ready;
        connection.crypto.application.install(
            TestKey::new(),
            TestKey::new(),
            TestHeaderKey::new(),
            TestHeaderKey::new(),
        );

        let mut bytes = encode_short(&[1, 2, 3, 4], 0);
        let (mut header, _) = packet::decode(DecoderBufferMut::new(&mut bytes), 4).unwrap();

        let mut random = TestRandom::default();
        let now = NoopClock.get_time();
        let received = receive_segment(
            &mut connection,
            &mut header,
            &mut bytes,
            addr(4433),
            addr(443),
            quic_core::inet::ExplicitCongestionNotification::ECT0,
            &mut random,
            now,
        )
        .unwrap();

        assert_eq!(received.packet_type, PacketType::Short);
        assert_eq!(received.packet_number.space(), quic_core::packet::number::PacketNumberSpace::ApplicationData);
        assert_eq!(connection.ecn.ect0, 1);
        assert!(connection.ecn.sending_ecn_ack);
    }

    #[test]
    fn receive_segment_rejects_unexpected_epoch() {
        let mut connection = new_connection();
        // `ServerListening` does not accept 1-RTT packets yet.
        let mut bytes = encode_short(&[1, 2, 3, 4], 0);
        let (mut header, _) = packet::decode(DecoderBufferMut::new(&mut bytes), 4).unwrap();

        let mut random = TestRandom::default();
        let now = NoopClock.get_time();
        let err = receive_segment(
            &mut connection,
            &mut header,
            &mut bytes,
            addr(4433),
            addr(443),
            ExplicitCongestionNotification::NotECT,
            &mut random,
            now,
        )
        .unwrap_err();
        assert_eq!(err, connection::Error::UnexpectedPacket);
    }

    #[test]
    fn duplicate_one_rtt_packet_is_reported() {
        let mut connection = new_connection();
        connection.state = State::Ready;
        connection.crypto.application.install(
            TestKey::new(),
            TestKey::new(),
            TestHeaderKey::new(),
            TestHeaderKey::new(),
        );

        let mut random = TestRandom::default();
        let now = NoopClock.get_time();

        let mut first = encode_short(&[1, 2, 3, 4], 0);
        let (mut header, _) = packet::decode(DecoderBufferMut::new(&mut first), 4).unwrap();
        receive_segment(
            &mut connection,
            &mut header,
            &mut first,
            addr(4433),
            addr(443),
            ExplicitCongestionNotification::NotECT,
            &mut random,
            now,
        )
        .unwrap();

        let mut second = encode_short(&[1, 2, 3, 4], 0);
        let (mut header, _) = packet::decode(DecoderBufferMut::new(&mut second), 4).unwrap();
        let err = receive_segment(
            &mut connection,
            &mut header,
            &mut second,
            addr(4433),
            addr(443),
            ExplicitCongestionNotification::NotECT,
            &mut random,
            now,
        )
        .unwrap_err();
        assert_eq!(err, connection::Error::Duplicate);
    }

    #[test]
    fn a_failed_decrypt_does_not_occupy_the_packet_number_it_tried() {
        let mut connection = new_connection();
        connection.state = State::Ready;
        connection.crypto.application.install(
            TestKey {
                fail_on_decrypt: true,
                ..TestKey::new()
            },
            TestKey::new(),
            TestHeaderKey::new(),
            TestHeaderKey::new(),
        );

        let mut random = TestRandom::default();
        let now = NoopClock.get_time();

        // with a key that always fails to authenticate, decrypting this
        // packet number must not leave it recorded as received -- otherwise
        // the legitimate sender's later retransmission of that same number
        // would be dropped as a duplicate it never actually sent.
        let mut forged = encode_short(&[1, 2, 3, 4], 0);
        let (mut header, _) = packet::decode(DecoderBufferMut::new(&mut forged), 4).unwrap();
        let err = receive_segment(
            &mut connection,
            &mut header,
            &mut forged,
            addr(4433),
            addr(443),
            ExplicitCongestionNotification::NotECT,
            &mut random,
            now,
        )
        .unwrap_err();
        assert_eq!(err, connection::Error::AeadCheck);

        // swap in a key that actually authenticates, as if the real sender's
        // packet arrives next; the packet number the forged packet tried
        // must still be free to use.
        connection.crypto.application.install(
            TestKey::new(),
            TestKey::new(),
            TestHeaderKey::new(),
            TestHeaderKey::new(),
        );

        let mut legitimate = encode_short(&[1, 2, 3, 4], 0);
        let (mut header, _) = packet::decode(DecoderBufferMut::new(&mut legitimate), 4).unwrap();
        let received = receive_segment(
            &mut connection,
            &mut header,
            &mut legitimate,
            addr(4433),
            addr(443),
            ExplicitCongestionNotification::NotECT,
            &mut random,
            now,
        )
        .unwrap();
        assert_eq!(received.packet_type, PacketType::Short);
    }

    #[test]
    fn unused_application_keys_import_compiles() {
        let _: Option<ApplicationKeys<TestKey, TestHeaderKey>> = None;
    }

    #[test]
    fn decode_segment_accepts_matching_dcid() {
        let mut bytes = encode_short(&[1, 2, 3, 4], 0);
        let (header, len) = decode_segment(&mut bytes, 4, Some(&[1, 2, 3, 4])).unwrap();
        assert_eq!(header.packet_type, PacketType::Short);
        assert_eq!(len, bytes.len());
    }

    #[test]
    fn decode_segment_rejects_coalesced_dcid_mismatch() {
        let mut bytes = encode_short(&[1, 2, 3, 4], 0);
        let err = decode_segment(&mut bytes, 4, Some(&[9, 9, 9, 9])).unwrap_err();
        assert_eq!(err, connection::Error::CidSegment);
    }
}
