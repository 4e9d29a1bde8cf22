// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Hybrid Slow Start RTT-inflation filter.
//!
//! A 4-slot ring of recent RTT samples feeds a monotonically-decreasing
//! filtered minimum, and four consecutive rounds of RTT inflation over that
//! minimum signal early slow-start exit.

use crate::time::Timestamp;
use core::time::Duration;

/// Number of RTT samples averaged per round, and the number of consecutive
/// excess-RTT rounds required to signal a slow-start exit.
const SCOPE: usize = 4;

/// At most one sample is folded into the ring per this interval.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone, Debug)]
pub struct RttFilter {
    samples: [Duration; SCOPE],
    sample_current: usize,
    is_init: bool,
    sample_min: Duration,
    sample_max: Duration,
    filtered_min: Option<Duration>,
    excess_rounds: u32,
    last_sample_time: Option<Timestamp>,
}

impl Default for RttFilter {
    fn default() -> Self {
        Self {
            samples: [Duration::ZERO; SCOPE],
            sample_current: 0,
            is_init: false,
            sample_min: Duration::ZERO,
            sample_max: Duration::ZERO,
            filtered_min: None,
            excess_rounds: 0,
            last_sample_time: None,
        }
    }
}

impl RttFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn filter_min_max(&mut self, rtt: Duration) {
        self.samples[self.sample_current] = rtt;
        self.sample_current += 1;
        if self.sample_current >= SCOPE {
            self.is_init = true;
            self.sample_current = 0;
        }

        let scope = if self.is_init {
            SCOPE
        } else {
            self.sample_current
        };

        let mut sample_min = self.samples[0];
        let mut sample_max = self.samples[0];
        for sample in &self.samples[1..scope] {
            if *sample < sample_min {
                sample_min = *sample;
            } else if *sample > sample_max {
                sample_max = *sample;
            }
        }
        self.sample_min = sample_min;
        self.sample_max = sample_max;
    }

    /// Feeds a new RTT sample, returning `true` once RTT has inflated enough
    /// over the filtered minimum, for four consecutive rounds, to signal a
    /// slow-start exit.
    pub fn on_rtt_sample(&mut self, rtt: Duration, now: Timestamp) -> bool {
        if let Some(last) = self.last_sample_time {
            if now <= last + SAMPLE_INTERVAL {
                return false;
            }
        }
        self.last_sample_time = Some(now);
        self.filter_min_max(rtt);

        if !self.is_init {
            return false;
        }

        // the filtered minimum only ever decreases, tracking improvements
        match self.filtered_min {
            None => self.filtered_min = Some(self.sample_max),
            Some(filtered_min) if filtered_min > self.sample_max => {
                self.filtered_min = Some(self.sample_max);
            }
            _ => {}
        }
        let filtered_min = self.filtered_min.expect("set above");

        if self.sample_min <= filtered_min {
            self.excess_rounds = 0;
            return false;
        }

        let delta_rtt = self.sample_min - filtered_min;
        if delta_rtt * 4 > filtered_min {
            self.excess_rounds += 1;
            self.excess_rounds >= SCOPE as u32
        } else {
            self.excess_rounds = 0;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{Clock, NoopClock};

    #[test]
    fn stays_false_until_ring_fills() {
        let mut filter = RttFilter::new();
        let mut now = NoopClock.get_time();
        for _ in 0..3 {
            assert!(!filter.on_rtt_sample(Duration::from_millis(10), now));
            now += Duration::from_millis(1);
        }
    }

    #[test]
    fn signals_exit_after_four_excess_rounds() {
        let mut filter = RttFilter::new();
        let mut now = NoopClock.get_time();
        for _ in 0..4 {
            assert!(!filter.on_rtt_sample(Duration::from_millis(10), now));
            now += Duration::from_millis(1);
        }
        assert!(filter.is_init);

        let mut exited = false;
        for _ in 0..8 {
            exited = filter.on_rtt_sample(Duration::from_millis(50), now);
            now += Duration::from_millis(2);
            if exited {
                break;
            }
        }
        assert!(exited);
    }

    #[test]
    fn samples_within_the_interval_are_ignored() {
        let mut filter = RttFilter::new();
        let now = NoopClock.get_time();
        assert!(!filter.on_rtt_sample(Duration::from_millis(10), now));
        assert!(!filter.on_rtt_sample(Duration::from_millis(100), now));
        assert_eq!(filter.sample_current, 1);
    }
}
