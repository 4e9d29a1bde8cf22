// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Path lifetime: resolution of incoming 1-RTT packets to a [`Path`],
//! probe/NAT-rebinding detection, CID stash management, and promotion
//! (spec section 4.3).

use quic_core::{
    connection::{LocalId, PeerId},
    inet::SocketAddress,
    path::{challenge, Path},
    random,
    recovery::{CongestionController, RttEstimator},
    stateless_reset,
    time::Timestamp,
};
use smallvec::SmallVec;

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

/// Index of a path within a [`PathManager`]. `0` is always the active
/// default path.
pub type PathId = usize;

/// A connection-owned, not-yet-bound-to-any-path peer connection ID,
/// together with the stateless-reset secret the peer associated with it.
/// Ownership transfers to the path that dequeues it.
#[derive(Clone, Debug)]
pub struct StashedPeerCid {
    pub connection_id: PeerId,
    pub sequence_number: u64,
    pub stateless_reset_token: Option<stateless_reset::Token>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveError {
    /// Local CIDs are non-zero-length and none matched (spec 4.3 step 1).
    CidCheck,
}

impl From<ResolveError> for quic_core::connection::Error {
    fn from(_: ResolveError) -> Self {
        quic_core::connection::Error::CidCheck
    }
}

/// What happened to the path set as a result of processing one packet;
/// informational, used by the caller to decide whether a PATH_CHALLENGE
/// needs to go out on the next transmission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathEvent {
    /// The packet landed on an already-known, already-active path.
    Unchanged,
    /// A brand new path was created (zero-length-CID deployment, or a
    /// rebinding that found a usable stashed CID).
    Created,
    /// The peer address changed but no CID/address pairing was available
    /// yet; the path was not activated.
    AwaitingBinding,
    /// A new alternate address is being probed on the existing path.
    AltProbe,
    /// The "CID only" promotion case: a new path took over as path[0].
    Promoted,
}

pub struct PathManager<CC: CongestionController> {
    paths: SmallVec<[Path<CC>; 2]>,
    stash: SmallVec<[StashedPeerCid; 4]>,
    /// Length this endpoint's local CIDs are issued at; `0` means the
    /// zero-length-CID deployment mode of spec section 4.3 step 2.
    local_cid_len: usize,
    challenge_repeat_max: u8,
}

impl<CC: CongestionController + Clone> PathManager<CC> {
    pub fn new(initial_path: Path<CC>, local_cid_len: usize, challenge_repeat_max: u8) -> Self {
        let mut paths = SmallVec::new();
        paths.push(initial_path);
        Self {
            paths,
            stash: SmallVec::new(),
            local_cid_len,
            challenge_repeat_max,
        }
    }

    pub fn active_path_id(&self) -> PathId {
        0
    }

    pub fn path(&self, id: PathId) -> &Path<CC> {
        &self.paths[id]
    }

    pub fn path_mut(&mut self, id: PathId) -> &mut Path<CC> {
        &mut self.paths[id]
    }

    pub fn stash_peer_cid(&mut self, cid: StashedPeerCid) {
        self.stash.push(cid);
    }

    fn dequeue_stash(&mut self) -> Option<StashedPeerCid> {
        if self.stash.is_empty() {
            None
        } else {
            Some(self.stash.remove(0))
        }
    }

    fn find_by_local_cid(&self, cid: &LocalId) -> Option<PathId> {
        self.paths
            .iter()
            .position(|path| path.local_connection_id == *cid)
    }

    fn find_by_addresses(&self, peer: SocketAddress, local: SocketAddress) -> Option<PathId> {
        self.paths
            .iter()
            .position(|path| path.peer_address == peer && path.local_address == local)
    }

    /// Implements spec section 4.3 "Path resolution for incoming 1-RTT
    /// packets": CID match when local CIDs are non-zero-length, address
    /// match otherwise.
    pub fn resolve(
        &mut self,
        destination_cid: &LocalId,
        peer_address: SocketAddress,
        local_address: SocketAddress,
    ) -> Result<PathId, ResolveError> {
        if self.local_cid_len != 0 {
            return self
                .find_by_local_cid(destination_cid)
                .ok_or(ResolveError::CidCheck);
        }

        if let Some(id) = self.find_by_addresses(peer_address, local_address) {
            return Ok(id);
        }

        // zero-length local CIDs: allocate a new path keyed on addresses
        // alone, published immediately since the peer never has a
        // NEW_CONNECTION_ID to wait for.
        let mut new_path = self.paths[0].clone();
        new_path.local_address = local_address;
        new_path.peer_address = peer_address;
        new_path.is_published = true;
        new_path.is_registered = true;
        self.paths.push(new_path);
        Ok(self.paths.len() - 1)
    }

    /// Lazily populates `local_address` on a matched path if it was
    /// previously unknown (spec 4.3 step 3).
    pub fn populate_local_address(&mut self, id: PathId, local_address: SocketAddress) {
        let path = &mut self.paths[id];
        if path.local_address.port() == 0 {
            path.local_address = local_address;
        }
    }

    /// Handles address-change detection on an already-matched path (spec
    /// 4.3 "Address handling on a matched path"). Returns the path a
    /// subsequent frame should be associated with, and what changed.
    pub fn on_peer_address<R: random::Generator>(
        &mut self,
        id: PathId,
        peer_address: SocketAddress,
        local_address: SocketAddress,
        random: &mut R,
        now: Timestamp,
    ) -> (PathId, PathEvent) {
        self.populate_local_address(id, local_address);

        if self.paths[id].peer_address == peer_address {
            self.paths[id].is_activated = true;
            return (id, PathEvent::Unchanged);
        }

        let default_remote_cid_known = !self.paths[0].peer_connection_id.is_empty();
        let this_remote_cid_null = self.paths[id].peer_connection_id.is_empty();

        if default_remote_cid_known && this_remote_cid_null {
            if let Some(probe_id) = self
                .paths
                .iter()
                .position(|p| p.alt.peer_address == Some(peer_address))
            {
                return (probe_id, PathEvent::AltProbe);
            }

            return match self.dequeue_stash() {
                Some(stashed) => {
                    let mut new_path = self.paths[0].clone();
                    new_path.peer_address = peer_address;
                    new_path.local_address = local_address;
                    new_path.peer_connection_id = stashed.connection_id;
                    new_path.peer_connection_id_sequence = stashed.sequence_number;
                    new_path.stateless_reset_token = stashed.stateless_reset_token;
                    new_path.is_registered = true;
                    new_path.rearm_challenge(random, now);
                    self.paths.push(new_path);
                    let new_id = self.paths.len() - 1;
                    (new_id, PathEvent::Created)
                }
                // await the peer's NEW_CONNECTION_ID; do not activate yet
                None => (id, PathEvent::AwaitingBinding),
            };
        }

        // record the candidate address as an alternate under validation,
        // without disrupting the currently-active path
        self.paths[id].alt.peer_address = Some(peer_address);
        self.paths[id].alt.challenge.arm(random, now);
        (id, PathEvent::AltProbe)
    }

    /// "CID only" promotion: both endpoints' addresses stayed the default's,
    /// but a new path was established for a fresh CID. The default's remote
    /// CID moves to the new path, which becomes path[0]; the old CID is
    /// returned for retirement.
    pub fn promote(&mut self, new_path_id: PathId) -> Option<PeerId> {
        if new_path_id == 0 || new_path_id >= self.paths.len() {
            return None;
        }
        let retiring_cid = self.paths[0].peer_connection_id;
        self.paths.swap(0, new_path_id);
        Some(retiring_cid)
    }

    /// Advances every path's challenge timer, marking paths `failed` (and
    /// dropping non-default ones) past `challenge_repeat_max` retries.
    pub fn on_timer_tick(&mut self, now: Timestamp) -> Vec<PathId> {
        let mut retransmit = Vec::new();
        for (idx, path) in self.paths.iter_mut().enumerate() {
            if path.challenge.is_pending() {
                let deadline = path
                    .challenge
                    .last_sent()
                    .map(|sent| sent + path.rtt_estimator.smoothed_rtt());
                if deadline.map_or(false, |d| now >= d) {
                    path.challenge.on_timeout(now);
                    if path.challenge.is_failed() {
                        continue;
                    }
                    retransmit.push(idx);
                }
            }
        }
        retransmit
    }

    /// Drops failed, non-default paths.
    pub fn reap_failed(&mut self) {
        let mut idx = 1;
        while idx < self.paths.len() {
            if self.paths[idx].challenge.is_failed() {
                self.paths.remove(idx);
            } else {
                idx += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// ECN accounting applies only to the default path (spec section 4.3).
    pub fn is_default(&self, id: PathId) -> bool {
        id == 0
    }

    pub fn challenge_repeat_max(&self) -> u8 {
        self.challenge_repeat_max
    }
}

pub use challenge::CHALLENGE_REPEAT_MAX as DEFAULT_CHALLENGE_REPEAT_MAX;

#[cfg(test)]
mod tests {
    use super::*;
    use quic_core::{
        inet::{IpV4Address, SocketAddressV4},
        random::testing::Generator,
        recovery::CubicCongestionController,
        time::{Clock, NoopClock},
    };

    fn addr(port: u16) -> SocketAddress {
        SocketAddress::IpV4(SocketAddressV4::new(IpV4Address::from([127, 0, 0, 1]), port))
    }

    fn new_manager() -> PathManager<CubicCongestionController> {
        let path = Path::new(
            addr(443),
            addr(4433),
            LocalId::try_from([1u8, 2, 3, 4].as_slice()).unwrap(),
            PeerId::try_from([5u8, 6, 7, 8].as_slice()).unwrap(),
            RttEstimator::new(core::time::Duration::from_millis(25)),
            CubicCongestionController::new(quic_core::path::MINIMUM_MTU),
            true,
        );
        PathManager::new(path, 4, 3)
    }

    #[test]
    fn resolves_by_local_cid_when_nonzero_length() {
        let mut manager = new_manager();
        let cid = LocalId::try_from([1u8, 2, 3, 4].as_slice()).unwrap();
        assert_eq!(manager.resolve(&cid, addr(4433), addr(443)), Ok(0));
    }

    #[test]
    fn unknown_cid_is_rejected_in_nonzero_length_mode() {
        let mut manager = new_manager();
        let other = LocalId::try_from([9u8, 9, 9, 9].as_slice()).unwrap();
        assert_eq!(
            manager.resolve(&other, addr(4433), addr(443)),
            Err(ResolveError::CidCheck)
        );
    }

    #[test]
    fn nat_rebinding_with_stashed_cid_creates_and_activates_a_path() {
        let mut manager = new_manager();
        manager.stash_peer_cid(StashedPeerCid {
            connection_id: PeerId::try_from([9u8, 9, 9, 9].as_slice()).unwrap(),
            sequence_number: 1,
            stateless_reset_token: None,
        });

        let mut random = Generator::default();
        let now = NoopClock.get_time();
        let (new_id, event) = manager.on_peer_address(0, addr(5000), addr(443), &mut random, now);

        assert_eq!(event, PathEvent::Created);
        assert_ne!(new_id, 0);
        assert!(manager.path(new_id).challenge.is_pending());
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn rebinding_without_stashed_cid_awaits_binding() {
        let mut manager = new_manager();
        let mut random = Generator::default();
        let now = NoopClock.get_time();

        let (id, event) = manager.on_peer_address(0, addr(5000), addr(443), &mut random, now);
        assert_eq!(event, PathEvent::AwaitingBinding);
        assert_eq!(id, 0);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn promotion_swaps_new_path_into_slot_zero() {
        let mut manager = new_manager();
        manager.stash_peer_cid(StashedPeerCid {
            connection_id: PeerId::try_from([9u8, 9, 9, 9].as_slice()).unwrap(),
            sequence_number: 1,
            stateless_reset_token: None,
        });
        let mut random = Generator::default();
        let now = NoopClock.get_time();
        let (new_id, _) = manager.on_peer_address(0, addr(5000), addr(443), &mut random, now);

        let retiring = manager.promote(new_id).unwrap();
        assert_eq!(
            retiring,
            PeerId::try_from([5u8, 6, 7, 8].as_slice()).unwrap()
        );
        assert_eq!(
            manager.path(0).peer_connection_id,
            PeerId::try_from([9u8, 9, 9, 9].as_slice()).unwrap()
        );
    }
}
