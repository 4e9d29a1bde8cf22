// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Stateless reset tokens.

pub use token::Token;
pub mod token;

//= https://www.rfc-editor.org/rfc/rfc9000#section-10.3
//# An endpoint that receives a Stateless Reset does not have access to
//# the original connection state, and relies on the token value to
//# indicate that a reset has occurred.
//#
//# The endpoint that receives the Stateless Reset compares the last 16
//# bytes of the datagram to the Stateless Reset Token associated with
//# the connection ID in the Destination Connection ID field.

// Shorter than this, a datagram cannot carry a 16-byte token plus enough
// leading bytes to be mistaken for a short header packet, so it is never a
// stateless reset candidate regardless of what the destination connection ID
// lookup finds.
pub const MIN_STATELESS_RESET_PACKET_LEN: usize = 22;
