// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! Core QUIC wire types, the declarative state-machine macros used to build
//! the connection state machine, and the CUBIC congestion controller.
//!
//! This crate implements the receive-side packet pipeline (header parsing,
//! protection removal, packet number reconstruction, duplicate detection)
//! and the building blocks the connection state machine is assembled from
//! in `quic-transport`. The TLS 1.3 handshake itself is out of scope and is
//! only exposed here as a narrow collaborator interface (see
//! [`crypto::tls`]).

#[cfg(feature = "alloc")]
extern crate alloc;

/// A no-op stand-in for `tracing::debug!` used when the `state-tracing`
/// feature is disabled, so `state!`-generated transitions compile to nothing
/// in builds that don't want the dependency.
#[macro_export]
macro_rules! __tracing_noop__ {
    ($($arg:tt)*) => {};
}

pub mod connection;
pub mod crypto;
pub mod inet;
pub mod packet;
pub mod path;
pub mod random;
pub mod recovery;
pub mod slice;
pub mod state;
pub mod stateless_reset;
pub mod time;
pub mod transport;
pub mod varint;

pub use varint::VarInt;
