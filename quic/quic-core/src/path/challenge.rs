// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Path-validation challenge state.
//!
//! A path may have up to [`MAX_CHALLENGES`] outstanding PATH_CHALLENGE values
//! armed at once: every time an address or connection ID is freshly bound to
//! a path, the primary challenge is re-armed with a fresh batch, without
//! waiting for an earlier batch to resolve first.

use crate::{random, time::Timestamp};

/// Number of concurrent challenge values a path keeps armed.
pub const MAX_CHALLENGES: usize = 3;

//= https://www.rfc-editor.org/rfc/rfc9000#section-8.2.4
//# Endpoints SHOULD abandon path validation based on a timer.
// Re-transmissions past this count without an echoed response mark the path
// failed rather than retrying indefinitely.
pub const CHALLENGE_REPEAT_MAX: u8 = 3;

/// Outstanding PATH_CHALLENGE state for one path.
#[derive(Clone, Debug, Default)]
pub struct State {
    values: [u64; MAX_CHALLENGES],
    armed: u8,
    last_sent: Option<Timestamp>,
    repeat_count: u8,
    verified: bool,
    failed: bool,
    required: bool,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills a fresh batch of challenge values and marks the path as
    /// requiring validation again.
    pub fn arm<R: random::Generator>(&mut self, random: &mut R, now: Timestamp) {
        for value in self.values.iter_mut() {
            let mut bytes = [0u8; 8];
            random.public_random_fill(&mut bytes);
            *value = u64::from_be_bytes(bytes);
        }
        self.armed = MAX_CHALLENGES as u8;
        self.last_sent = Some(now);
        self.repeat_count = 0;
        self.verified = false;
        self.failed = false;
        self.required = true;
    }

    /// The values that a PATH_RESPONSE is expected to echo back.
    pub fn values(&self) -> &[u64] {
        &self.values[..self.armed as usize]
    }

    /// Consumes a PATH_RESPONSE, returning `true` if it matched one of the
    /// armed challenge values.
    pub fn on_response(&mut self, data: u64) -> bool {
        if !self.required || self.verified || self.failed {
            return false;
        }
        if self.values().contains(&data) {
            self.verified = true;
            self.required = false;
            true
        } else {
            false
        }
    }

    /// Called when the retransmit timer for this challenge fires with no
    /// response received. Returns `true` if a retransmission should be sent.
    pub fn on_timeout(&mut self, now: Timestamp) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.repeat_count += 1;
        self.last_sent = Some(now);
        if self.repeat_count > CHALLENGE_REPEAT_MAX {
            self.failed = true;
            false
        } else {
            true
        }
    }

    pub fn is_pending(&self) -> bool {
        self.required && !self.verified && !self.failed
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn last_sent(&self) -> Option<Timestamp> {
        self.last_sent
    }

    pub fn repeat_count(&self) -> u8 {
        self.repeat_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{random::testing::Generator, time::Clock, time::NoopClock};

    #[test]
    fn arming_fills_all_slots_and_requires_validation() {
        let mut state = State::new();
        let mut rng = Generator::default();
        let now = NoopClock.get_time();

        state.arm(&mut rng, now);

        assert_eq!(state.values().len(), MAX_CHALLENGES);
        assert!(state.is_pending());
        assert!(!state.is_verified());
    }

    #[test]
    fn matching_response_verifies() {
        let mut state = State::new();
        let mut rng = Generator::default();
        let now = NoopClock.get_time();
        state.arm(&mut rng, now);

        let value = state.values()[1];
        assert!(state.on_response(value));
        assert!(state.is_verified());
        assert!(!state.is_pending());
    }

    #[test]
    fn mismatched_response_does_not_verify() {
        let mut state = State::new();
        let mut rng = Generator::default();
        let now = NoopClock.get_time();
        state.arm(&mut rng, now);

        assert!(!state.on_response(0xdead_beef_dead_beef));
        assert!(!state.is_verified());
        assert!(state.is_pending());
    }

    #[test]
    fn repeated_timeout_past_max_fails_the_challenge() {
        let mut state = State::new();
        let mut rng = Generator::default();
        let now = NoopClock.get_time();
        state.arm(&mut rng, now);

        for _ in 0..CHALLENGE_REPEAT_MAX {
            assert!(state.on_timeout(now));
            assert!(!state.is_failed());
        }
        assert!(!state.on_timeout(now));
        assert!(state.is_failed());
        assert!(!state.is_pending());
    }
}
