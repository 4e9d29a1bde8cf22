// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-epoch crypto contexts (data model: "Four crypto contexts, indexed by
//! epoch"), and key-phase rotation for epoch 3 (RFC 9001 section 6).
//!
//! Header-protection keys do not rotate with the key phase (RFC 9001
//! section 5.4); only the AEAD packet-protection keys do, which is why
//! [`ApplicationKeys`] carries a single header-key pair alongside rotating
//! opener/sealer slots.

use quic_core::{
    connection::Epoch,
    crypto::{CryptoSuite, HeaderKey, Key, OneRttKey},
    time::Timestamp,
};

/// Opener/sealer pair for one direction-symmetric epoch (initial, 0-RTT,
/// handshake): a single AEAD key plus header-protection key per direction.
pub struct EpochKeys<K, H> {
    pub opener: Option<K>,
    pub opener_header: Option<H>,
    pub sealer: Option<K>,
    pub sealer_header: Option<H>,
}

impl<K, H> Default for EpochKeys<K, H> {
    fn default() -> Self {
        Self {
            opener: None,
            opener_header: None,
            sealer: None,
            sealer_header: None,
        }
    }
}

impl<K: Key, H: HeaderKey> EpochKeys<K, H> {
    pub fn is_installed(&self) -> bool {
        self.opener.is_some() || self.sealer.is_some()
    }
}

/// Which of the three application-data decrypt candidates matched a
/// received packet (spec section 4.1.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseSlot {
    Current,
    Old,
    New,
}

/// Application-data (epoch 3) keys, carrying the rotating old/current/new
/// AEAD slots described in the data model.
pub struct ApplicationKeys<K, H> {
    pub header_opener: Option<H>,
    pub header_sealer: Option<H>,
    current_opener: Option<K>,
    current_sealer: Option<K>,
    old_opener: Option<K>,
    new_opener: Option<K>,
    /// The bit the receiver currently expects on non-rotated packets.
    local_phase: bool,
    /// First packet number of the current key phase; packets at or after
    /// this PN must decrypt under the current-phase key.
    rotation_sequence: u64,
    /// Deadline after which packets still claiming the old phase are
    /// rejected outright, once a rotation has committed.
    rotation_time_guard: Option<Timestamp>,
}

impl<K, H> Default for ApplicationKeys<K, H> {
    fn default() -> Self {
        Self {
            header_opener: None,
            header_sealer: None,
            current_opener: None,
            current_sealer: None,
            old_opener: None,
            new_opener: None,
            local_phase: false,
            rotation_sequence: 0,
            rotation_time_guard: None,
        }
    }
}

/// Outcome of selecting (and possibly deriving) the key that should be used
/// to decrypt a 1-RTT packet.
pub enum Selection<'a, K> {
    /// Use this existing key.
    Existing(&'a K),
    /// The new-phase key had to be derived from `current`; the caller
    /// decrypts with the returned key and, on success, commits the
    /// rotation via [`ApplicationKeys::commit_rotation`].
    Derived(K),
    /// The old key is still valid but `now` is past its guard.
    ExpiredOld,
}

impl<K: OneRttKey, H: HeaderKey> ApplicationKeys<K, H> {
    pub fn install(&mut self, opener: K, sealer: K, header_opener: H, header_sealer: H) {
        self.current_opener = Some(opener);
        self.current_sealer = Some(sealer);
        self.header_opener = Some(header_opener);
        self.header_sealer = Some(header_sealer);
    }

    pub fn is_installed(&self) -> bool {
        self.current_opener.is_some()
    }

    pub fn local_phase(&self) -> bool {
        self.local_phase
    }

    pub fn rotation_sequence(&self) -> u64 {
        self.rotation_sequence
    }

    /// Selects the opener that should decrypt a packet carrying
    /// `received_phase` at `received_pn`, deriving the new-phase key on
    /// demand if the peer has rotated ahead of us (spec section 4.1.2).
    pub fn select_opener(
        &mut self,
        received_phase: bool,
        received_pn: u64,
        now: Timestamp,
        retransmit_timer: core::time::Duration,
    ) -> Option<Selection<'_, K>> {
        if received_phase == self.local_phase {
            return self.current_opener.as_ref().map(Selection::Existing);
        }

        if received_pn < self.rotation_sequence {
            return match (&self.old_opener, self.rotation_time_guard) {
                (Some(_), Some(guard)) if now > guard => Some(Selection::ExpiredOld),
                (Some(old), _) => Some(Selection::Existing(old)),
                (None, _) => None,
            };
        }

        if let Some(new_key) = &self.new_opener {
            return Some(Selection::Existing(new_key));
        }

        let current = self.current_opener.as_ref()?;
        let _ = retransmit_timer;
        Some(Selection::Derived(current.derive_next_key()))
    }

    /// Commits a key-phase rotation after a successful decrypt under the
    /// newly-derived key: the old key is dropped, `rotation_sequence`
    /// becomes `committed_pn`, and a grace window opens for packets still
    /// claiming the previous phase (testable property 4).
    pub fn commit_rotation(
        &mut self,
        derived: K,
        committed_pn: u64,
        now: Timestamp,
        retransmit_timer: core::time::Duration,
    ) {
        let previous_current = self
            .current_opener
            .take()
            .expect("a rotation can only commit once current keys are installed");
        self.old_opener = Some(previous_current);
        self.current_opener = Some(derived);
        self.new_opener = None;
        self.local_phase = !self.local_phase;
        self.rotation_sequence = committed_pn;
        self.rotation_time_guard = now.checked_add(retransmit_timer);
    }

    pub fn sealer(&self) -> Option<&K> {
        self.current_sealer.as_ref()
    }
}

/// The full set of per-epoch key contexts a connection owns.
pub struct Contexts<C: CryptoSuite> {
    pub initial: EpochKeys<C::InitialKey, C::InitialHeaderKey>,
    pub zero_rtt: EpochKeys<C::ZeroRttKey, C::ZeroRttHeaderKey>,
    pub handshake: EpochKeys<C::HandshakeKey, C::HandshakeHeaderKey>,
    pub application: ApplicationKeys<C::OneRttKey, C::OneRttHeaderKey>,
}

impl<C: CryptoSuite> Default for Contexts<C> {
    fn default() -> Self {
        Self {
            initial: EpochKeys::default(),
            zero_rtt: EpochKeys::default(),
            handshake: EpochKeys::default(),
            application: ApplicationKeys::default(),
        }
    }
}

impl<C: CryptoSuite> Contexts<C> {
    /// Whether header-protection keys exist for `epoch`, i.e. whether a
    /// packet of that epoch can have its header protection removed at all.
    pub fn has_opening_header_key(&self, epoch: Epoch) -> bool {
        match epoch {
            Epoch::Initial => self.initial.opener_header.is_some(),
            Epoch::ZeroRtt => self.zero_rtt.opener_header.is_some(),
            Epoch::Handshake => self.handshake.opener_header.is_some(),
            Epoch::ApplicationData => self.application.header_opener.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quic_core::{
        crypto::key::testing::{HeaderKey as TestHeaderKey, Key as TestKey},
        time::{Clock, NoopClock},
    };
    use core::time::Duration;

    fn app_keys() -> ApplicationKeys<TestKey, TestHeaderKey> {
        let mut keys = ApplicationKeys::default();
        keys.install(TestKey::new(), TestKey::new(), TestHeaderKey::new(), TestHeaderKey::new());
        keys
    }

    #[test]
    fn selects_current_key_when_phases_match() {
        let mut keys = app_keys();
        let now = NoopClock.get_time();
        assert!(matches!(
            keys.select_opener(false, 10, now, Duration::from_millis(100)),
            Some(Selection::Existing(_))
        ));
    }

    #[test]
    fn derives_new_key_on_phase_flip_and_commits_rotation() {
        let mut keys = app_keys();
        let now = NoopClock.get_time();
        let retransmit_timer = Duration::from_millis(100);

        match keys.select_opener(true, 1000, now, retransmit_timer) {
            Some(Selection::Derived(derived)) => {
                keys.commit_rotation(derived, 1000, now, retransmit_timer);
            }
            _ => panic!("expected a derived key on first rotation"),
        }

        assert!(keys.local_phase());
        assert_eq!(keys.rotation_sequence(), 1000);

        // a packet at PN 999 under the old phase is still inside the guard
        assert!(matches!(
            keys.select_opener(false, 999, now, retransmit_timer),
            Some(Selection::Existing(_))
        ));

        // past the guard, the same packet must be rejected
        let later = now + retransmit_timer + retransmit_timer;
        assert!(matches!(
            keys.select_opener(false, 999, later, retransmit_timer),
            Some(Selection::ExpiredOld)
        ));
    }
}
