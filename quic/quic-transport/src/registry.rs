// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Connection registry & lookup (spec section 2, "map (connection-id,
//! peer-address) to connection context").
//!
//! Reads vastly outnumber writes: every inbound datagram does a lookup,
//! while inserts/removals only happen on connection creation, CID
//! retirement, and connection teardown. `hashbrown` is used directly rather
//! than going through `std::collections`, keeping the crate usable in
//! `no_std` + `alloc` builds.

use hashbrown::HashMap;
use quic_core::{connection::LocalId, inet::SocketAddress};

/// An opaque handle the caller uses to look its connection context up in
/// whatever storage (slab, arena, `Vec`) it keeps connections in. The
/// registry itself is agnostic to how connections are stored.
pub trait Handle: Copy + Eq {}
impl<T: Copy + Eq> Handle for T {}

/// Maps connection IDs (and, for zero-length-CID deployments, peer
/// addresses) to connection handles.
pub struct Registry<H: Handle> {
    by_cid: HashMap<LocalId, H>,
    /// Only populated when this endpoint issues zero-length local CIDs;
    /// address-keyed fallback lookup does not apply otherwise (spec section
    /// 4.1, "Connection lookup").
    by_address: HashMap<SocketAddress, H>,
    zero_length_cids: bool,
}

impl<H: Handle> Registry<H> {
    pub fn new(zero_length_cids: bool) -> Self {
        Self {
            by_cid: HashMap::new(),
            by_address: HashMap::new(),
            zero_length_cids,
        }
    }

    pub fn insert_cid(&mut self, cid: LocalId, handle: H) {
        self.by_cid.insert(cid, handle);
    }

    pub fn remove_cid(&mut self, cid: &LocalId) -> Option<H> {
        self.by_cid.remove(cid)
    }

    pub fn insert_address(&mut self, address: SocketAddress, handle: H) {
        if self.zero_length_cids {
            self.by_address.insert(address, handle);
        }
    }

    pub fn remove_address(&mut self, address: &SocketAddress) -> Option<H> {
        self.by_address.remove(address)
    }

    /// Implements spec section 4.1's "Connection lookup": CID match first;
    /// for 0-RTT/1-RTT packets only, fall back to an address match, and only
    /// when this endpoint's local CIDs are zero-length.
    pub fn lookup(&self, cid: &LocalId, source_address: Option<&SocketAddress>) -> Option<H> {
        if let Some(handle) = self.by_cid.get(cid) {
            return Some(*handle);
        }

        if !self.zero_length_cids {
            return None;
        }

        source_address.and_then(|address| self.by_address.get(address).copied())
    }

    pub fn retire(&mut self, cid: &LocalId, address: Option<&SocketAddress>) {
        self.remove_cid(cid);
        if let Some(address) = address {
            self.remove_address(address);
        }
    }

    pub fn len(&self) -> usize {
        self.by_cid.len().max(self.by_address.len())
    }

    pub fn is_empty(&self) -> bool {
        self.by_cid.is_empty() && self.by_address.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quic_core::inet::{IpV4Address, SocketAddressV4};

    fn addr(port: u16) -> SocketAddress {
        SocketAddress::IpV4(SocketAddressV4::new(IpV4Address::from([127, 0, 0, 1]), port))
    }

    #[test]
    fn nonzero_length_cids_never_fall_back_to_address() {
        let mut registry: Registry<u32> = Registry::new(false);
        let cid = LocalId::try_from([1u8, 2, 3, 4].as_slice()).unwrap();
        registry.insert_cid(cid, 7);
        registry.insert_address(addr(443), 7);

        let unknown_cid = LocalId::try_from([9u8, 9, 9, 9].as_slice()).unwrap();
        assert_eq!(registry.lookup(&cid, None), Some(7));
        assert_eq!(registry.lookup(&unknown_cid, Some(&addr(443))), None);
    }

    #[test]
    fn zero_length_cids_fall_back_to_address() {
        let mut registry: Registry<u32> = Registry::new(true);
        let zero_cid = LocalId::try_from([0u8, 0, 0, 0].as_slice()).unwrap();
        registry.insert_address(addr(443), 7);

        assert_eq!(registry.lookup(&zero_cid, Some(&addr(443))), Some(7));
        assert_eq!(registry.lookup(&zero_cid, Some(&addr(4433))), None);
    }

    #[test]
    fn retiring_removes_both_indices() {
        let mut registry: Registry<u32> = Registry::new(true);
        let cid = LocalId::try_from([1u8, 2, 3, 4].as_slice()).unwrap();
        registry.insert_cid(cid, 3);
        registry.insert_address(addr(443), 3);

        registry.retire(&cid, Some(&addr(443)));
        assert!(registry.is_empty());
    }
}
