// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! QUIC packet headers (RFC 9000 section 17): long/short header parsing and
//! header-protection removal. Frame-level payload parsing is out of scope;
//! this module stops at handing a decrypted payload buffer to the caller.

pub mod number;

use crate::{
    connection::Epoch,
    crypto::header_crypto::{self, HeaderKey},
    packet::number::{PacketNumberSpace, TruncatedPacketNumber},
    varint::VarInt,
};
use quic_codec::{
    decoder_invariant, CheckedRange, DecoderBuffer, DecoderBufferMut, DecoderBufferMutResult,
    DecoderError,
};

pub(crate) type Tag = u8;

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2
//# Header Form:  The most significant bit (0x80) of byte 0 (the first
//#   byte) is set to 1 for long headers.
const LONG_HEADER_FORM: u8 = 0x80;

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2
//# Long Packet Type:  The next two bits (those with a mask of 0x30)
//#    of byte 0 contain a packet type.
const LONG_PACKET_TYPE_MASK: u8 = 0x30;
const LONG_PACKET_TYPE_OFFSET: u8 = 4;

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.3.1
//# Spin Bit:  The third most significant bit (0x20) of byte 0 is the
//#    latency spin bit
const SHORT_SPIN_BIT_MASK: u8 = 0x20;

/// Version field value reserved to mean "version negotiation packet"
/// (RFC 9000 section 17.2.1).
pub const VERSION_NEGOTIATION: u32 = 0;

/// Maximum connection ID length a version-1 long header may carry; packets
/// declaring more are dropped before processing (RFC 9000 section 17.2).
pub const MAX_CID_LEN: usize = 20;

/// Named wire type of a decoded packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketType {
    Initial,
    ZeroRtt,
    Handshake,
    Retry,
    VersionNegotiation,
    Short,
}

impl PacketType {
    //= https://www.rfc-editor.org/rfc/rfc9000#section-17.2
    //# +======+===========+================+
    //# | Type | Name      | Section        |
    //# +======+===========+================+
    //# | 0x00 | Initial   | Section 17.2.2 |
    //# +------+-----------+----------------+
    //# | 0x01 | 0-RTT     | Section 17.2.3 |
    //# +------+-----------+----------------+
    //# | 0x02 | Handshake | Section 17.2.4 |
    //# +------+-----------+----------------+
    //# | 0x03 | Retry     | Section 17.2.5 |
    //# +------+-----------+----------------+
    fn from_long_type_bits(tag: Tag) -> Self {
        match (tag & LONG_PACKET_TYPE_MASK) >> LONG_PACKET_TYPE_OFFSET {
            0x0 => Self::Initial,
            0x1 => Self::ZeroRtt,
            0x2 => Self::Handshake,
            _ => Self::Retry,
        }
    }

    /// The crypto epoch a packet of this type is protected under. Retry and
    /// version negotiation packets carry no packet-protected payload; their
    /// epoch is nominal.
    pub fn epoch(self) -> Epoch {
        match self {
            Self::Initial | Self::Retry | Self::VersionNegotiation => Epoch::Initial,
            Self::ZeroRtt => Epoch::ZeroRtt,
            Self::Handshake => Epoch::Handshake,
            Self::Short => Epoch::ApplicationData,
        }
    }

    pub fn space(self) -> PacketNumberSpace {
        self.epoch().packet_number_space()
    }

    pub fn is_long(self) -> bool {
        !matches!(self, Self::Short)
    }

    /// Whether this packet type carries a protected packet number and
    /// payload at all (version negotiation and Retry do not).
    pub fn has_packet_number(self) -> bool {
        !matches!(self, Self::VersionNegotiation | Self::Retry)
    }
}

/// Latency spin bit (RFC 9000 section 17.4), carried only by short-header
/// packets; unprotected, so it is visible before header protection removal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpinBit {
    #[default]
    Zero,
    One,
}

impl SpinBit {
    fn from_tag(tag: Tag) -> Self {
        if tag & SHORT_SPIN_BIT_MASK == SHORT_SPIN_BIT_MASK {
            Self::One
        } else {
            Self::Zero
        }
    }
}

/// The structural fields of a packet header: everything readable before
/// header protection is removed, plus the offsets needed to remove it.
///
/// Maps onto the data model's "Packet header (parsed)" entity; `packet_number`,
/// `pn_mask`, `has_reserved_bit_set`, and `key_phase` are filled in by
/// [`Header::remove_header_protection`] once the collaborator's header key is
/// available.
///
/// Connection ID and token fields are [`CheckedRange`]s rather than borrowed
/// slices: a `Header` is looked up in the connection registry (needing read
/// access to those ranges) and then handed, together with the same
/// underlying bytes, to [`Header::remove_header_protection`] (needing
/// exclusive access to those same bytes). Slices tied to the segment's
/// lifetime would keep that read borrow alive across the later exclusive
/// one; ranges carry no borrow at all, so `Header` is plain, `Copy` data and
/// the caller resolves a range against whichever view of the segment it
/// currently holds.
#[derive(Clone, Copy, Debug)]
pub struct Header {
    pub tag: Tag,
    pub packet_type: PacketType,
    pub version: u32,
    pub destination_connection_id: CheckedRange,
    pub source_connection_id: Option<CheckedRange>,
    pub token: Option<CheckedRange>,
    pub spin_bit: SpinBit,
    /// Offset, from the start of this packet, of the first byte after the
    /// structural header -- where the (still-protected) packet number
    /// begins.
    pub header_len: usize,
    /// Length of the packet-number-and-payload section, as declared by a
    /// long header's `Length` varint. `None` for short headers, whose
    /// payload runs to the end of the datagram.
    pub payload_len: Option<usize>,
    pub packet_number: Option<TruncatedPacketNumber>,
    pub has_reserved_bit_set: bool,
    pub key_phase: bool,
}

impl Header {
    /// Total length of this packet (header, packet number, and payload),
    /// used to split coalesced segments apart. For short-header packets this
    /// is the caller-supplied datagram length, since nothing follows a short
    /// header in a single UDP datagram.
    pub fn packet_len(&self, datagram_remaining: usize) -> usize {
        match self.payload_len {
            Some(payload_len) => self.header_len + payload_len,
            None => datagram_remaining,
        }
    }

    /// Removes header protection in place and reconstructs the packet
    /// number's truncated wire value. `packet` must start at this header's
    /// first byte and extend at least through the end of this packet.
    pub fn remove_header_protection<K: HeaderKey>(
        &mut self,
        key: &K,
        packet: &mut [u8],
    ) -> Result<(), DecoderError> {
        let space = self.packet_type.space();
        let sample_len = key.opening_sample_len();
        let sample_offset = self.header_len + 4;
        let sample = packet
            .get(sample_offset..sample_offset + sample_len)
            .ok_or(DecoderError::UnexpectedEof(sample_len))?;
        let mask = key.opening_header_protection_mask(sample);

        let (truncated_pn, header_with_pn_len) =
            header_crypto::remove_header_protection(space, mask, packet, self.header_len)?;

        let tag = packet[0];
        self.has_reserved_bit_set = if self.packet_type.is_long() {
            tag & 0x0c != 0
        } else {
            tag & 0x18 != 0
        };
        self.key_phase = self.packet_type == PacketType::Short && tag & 0x04 != 0;
        self.packet_number = Some(truncated_pn);
        self.header_len = header_with_pn_len;
        Ok(())
    }
}

/// Decodes the structural fields of one packet header from the front of
/// `buffer`. For short headers, `local_cid_len` must be the length this
/// endpoint's connection IDs are issued at (0 if this endpoint uses
/// zero-length local CIDs).
pub fn decode<'a>(
    buffer: DecoderBufferMut<'a>,
    local_cid_len: usize,
) -> DecoderBufferMutResult<'a, Header> {
    let buffer_len = buffer.len();
    let peek: DecoderBuffer<'a> = buffer.peek();

    let (tag, peek): (u8, _) = peek.decode()?;
    let offset = |remaining: &DecoderBuffer<'a>| buffer_len - remaining.len();

    let header = if tag & LONG_HEADER_FORM == LONG_HEADER_FORM {
        let (version, peek) = peek.decode::<u32>()?;

        if version == VERSION_NEGOTIATION {
            let (dcid_len, peek) = peek.decode::<u8>()?;
            let (dcid, peek) = peek.skip_into_range(dcid_len as usize, &buffer)?;
            let (scid_len, peek) = peek.decode::<u8>()?;
            let (scid, peek) = peek.skip_into_range(scid_len as usize, &buffer)?;

            Header {
                tag,
                packet_type: PacketType::VersionNegotiation,
                version,
                destination_connection_id: dcid,
                source_connection_id: Some(scid),
                token: None,
                spin_bit: SpinBit::default(),
                header_len: offset(&peek),
                payload_len: None,
                packet_number: None,
                has_reserved_bit_set: false,
                key_phase: false,
            }
        } else {
            let packet_type = PacketType::from_long_type_bits(tag);

            let (dcid_len, peek) = peek.decode::<u8>()?;
            decoder_invariant!(
                dcid_len as usize <= MAX_CID_LEN,
                "destination connection id exceeds max length"
            );
            let (dcid, peek) = peek.skip_into_range(dcid_len as usize, &buffer)?;

            let (scid_len, peek) = peek.decode::<u8>()?;
            decoder_invariant!(
                scid_len as usize <= MAX_CID_LEN,
                "source connection id exceeds max length"
            );
            let (scid, peek) = peek.skip_into_range(scid_len as usize, &buffer)?;

            let (token, peek) = if packet_type == PacketType::Initial {
                let (token_len, peek) = peek.decode::<VarInt>()?;
                let token_len: usize = token_len
                    .try_into()
                    .map_err(|_| DecoderError::LengthCapacityExceeded)?;
                let (token, peek) = peek.skip_into_range(token_len, &buffer)?;
                (Some(token), peek)
            } else if packet_type == PacketType::Retry {
                // the remainder of a Retry packet, up to the trailing
                // integrity tag, is opaque retry-token bytes with no
                // length prefix; the caller slices it out once the
                // packet length is known.
                (None, peek)
            } else {
                (None, peek)
            };

            let (payload_len, peek) = if packet_type.has_packet_number() {
                let (len, peek) = peek.decode::<VarInt>()?;
                let len: usize = len
                    .try_into()
                    .map_err(|_| DecoderError::LengthCapacityExceeded)?;
                (Some(len), peek)
            } else {
                (None, peek)
            };

            Header {
                tag,
                packet_type,
                version,
                destination_connection_id: dcid,
                source_connection_id: Some(scid),
                token,
                spin_bit: SpinBit::default(),
                header_len: offset(&peek),
                payload_len,
                packet_number: None,
                has_reserved_bit_set: false,
                key_phase: false,
            }
        }
    } else {
        decoder_invariant!(tag & 0x40 == 0x40, "fixed bit must be set");

        let (dcid, peek) = peek.skip_into_range(local_cid_len, &buffer)?;

        Header {
            tag,
            packet_type: PacketType::Short,
            version: 0,
            destination_connection_id: dcid,
            source_connection_id: None,
            token: None,
            spin_bit: SpinBit::from_tag(tag),
            header_len: offset(&peek),
            payload_len: None,
            packet_number: None,
            has_reserved_bit_set: false,
            key_phase: false,
        }
    };

    let (_, buffer) = buffer.decode_slice(header.header_len)?;
    Ok((header, buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quic_codec::{Encoder, EncoderBuffer, EncoderValue};

    fn encode_long_initial(dcid: &[u8], scid: &[u8], token: &[u8], payload_len: usize) -> Vec<u8> {
        let mut out = vec![0u8; 1500];
        let mut encoder = EncoderBuffer::new(&mut out);
        // long header form | fixed bit | initial type (0x00) | pn-len bits
        encoder.encode(&0xc0u8);
        encoder.encode(&1u32); // version 1
        encoder.encode(&(dcid.len() as u8));
        encoder.encode(&dcid);
        encoder.encode(&(scid.len() as u8));
        encoder.encode(&scid);
        VarInt::try_from(token.len()).unwrap().encode(&mut encoder);
        encoder.encode(&token);
        VarInt::try_from(payload_len).unwrap().encode(&mut encoder);
        for _ in 0..payload_len {
            encoder.encode(&0u8);
        }
        let len = encoder.len();
        out.truncate(len);
        out
    }

    #[test]
    fn decodes_initial_header_fields() {
        let dcid = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let scid = [9u8, 10, 11, 12];
        let token = [0xaa, 0xbb, 0xcc];
        let mut bytes = encode_long_initial(&dcid, &scid, &token, 20);

        let (header, remaining) = decode(DecoderBufferMut::new(&mut bytes), 0).unwrap();
        let remaining_len = remaining.len();

        assert_eq!(header.packet_type, PacketType::Initial);
        assert_eq!(header.version, 1);
        assert_eq!(header.destination_connection_id.get(&bytes), &dcid);
        assert_eq!(
            header.source_connection_id.map(|r| r.get(&bytes).to_vec()),
            Some(scid.to_vec())
        );
        assert_eq!(
            header.token.map(|r| r.get(&bytes).to_vec()),
            Some(token.to_vec())
        );
        assert_eq!(header.payload_len, Some(20));
        assert_eq!(remaining_len, 20);
    }

    #[test]
    fn rejects_long_header_missing_fixed_bit_on_short_header() {
        let mut bytes = [0x00u8, 1, 2, 3, 4];
        assert!(decode(DecoderBufferMut::new(&mut bytes), 4).is_err());
    }

    #[test]
    fn decodes_short_header_with_expected_cid_length() {
        let mut bytes = vec![0x40 | 0x20, 1, 2, 3, 4, 0xaa, 0xbb];
        let (header, remaining) = decode(DecoderBufferMut::new(&mut bytes), 4).unwrap();
        let remaining_len = remaining.len();

        assert_eq!(header.packet_type, PacketType::Short);
        assert_eq!(header.destination_connection_id.get(&bytes), &[1, 2, 3, 4]);
        assert_eq!(header.spin_bit, SpinBit::One);
        assert_eq!(remaining_len, 2);
    }
}
