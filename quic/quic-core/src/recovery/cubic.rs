// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! CUBIC congestion control (RFC 8312), in the notification-dispatch shape:
//! a single [`Notification`] enum is fed to
//! [`CubicCongestionController::on_notification`], and the controller's
//! current phase decides what the notification means.

use crate::{
    recovery::{
        congestion_controller::{CongestionController, Notification},
        hystart::RttFilter,
        RttEstimator,
    },
    time::Timestamp,
};
use core::{
    cmp::{max, min},
    time::Duration,
};

//= https://www.rfc-editor.org/rfc/rfc8312#section-4.1
//# W_cubic(t) = C*(t-K)^3 + W_max
const C: f64 = 0.4;

//= https://www.rfc-editor.org/rfc/rfc8312#section-4.5
//# the multiplicative decrease factor, beta_cubic, SHOULD be set to 0.7
// 7/8 is used here rather than RFC 8312's 0.7.
const BETA: f64 = 7.0 / 8.0;

/// Smoothed RTT below which slow start grows the window by the full number
/// of acknowledged bytes per round, above which the increase is scaled down
/// proportionally.
const TARGET_RENO_RTT: Duration = Duration::from_millis(75);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    SlowStart,
    Recovery,
    CongestionAvoidance,
}

/// A CUBIC congestion controller, one per path.
#[derive(Clone, Debug)]
pub struct CubicCongestionController {
    state: State,
    recovery_sequence: u64,
    next_pn: u64,
    start_of_epoch: Option<Timestamp>,
    previous_start_of_epoch: Option<Timestamp>,
    k: f64,
    w_max: f64,
    w_last_max: f64,
    w_reno: f64,
    /// `u64::MAX` stands in for an unbounded ssthresh, and also doubles as
    /// "still in slow start" for the hystart RTT check.
    ssthresh: u64,
    send_mtu: u16,
    congestion_window: u32,
    rtt_filter: RttFilter,
}

impl CubicCongestionController {
    pub fn new(max_datagram_size: u16) -> Self {
        let initial_window = Self::initial_window(max_datagram_size);
        Self {
            state: State::SlowStart,
            recovery_sequence: 0,
            next_pn: 0,
            start_of_epoch: None,
            previous_start_of_epoch: None,
            k: 0.0,
            w_max: u64::MAX as f64 / max_datagram_size as f64,
            w_last_max: u64::MAX as f64 / max_datagram_size as f64,
            w_reno: initial_window as f64,
            ssthresh: u64::MAX,
            send_mtu: max_datagram_size,
            congestion_window: initial_window,
            rtt_filter: RttFilter::new(),
        }
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-7.2
    //# Endpoints SHOULD use an initial congestion window of ten times the
    //# maximum datagram size (max_datagram_size), while limiting the window
    //# to the larger of 14,720 bytes or twice the maximum datagram size.
    fn initial_window(max_datagram_size: u16) -> u32 {
        const INITIAL_WINDOW_LIMIT: u32 = 14720;
        min(
            10 * max_datagram_size as u32,
            max(INITIAL_WINDOW_LIMIT, 2 * max_datagram_size as u32),
        )
    }

    fn minimum_window(&self) -> u32 {
        2 * self.send_mtu as u32
    }

    /// `W_cubic(t) = C*(t-K)^3 + W_max`, `t` seconds since `start_of_epoch`.
    fn w_cubic(&self, now: Timestamp) -> f64 {
        let start = self
            .start_of_epoch
            .expect("w_cubic is only evaluated in congestion avoidance");
        let t = (now - start).as_secs_f64() - self.k;
        C * t * t * t + self.w_max
    }

    fn enter_avoidance(&mut self, epoch_start: Timestamp) {
        self.k = cube_root(self.w_max * (1.0 - BETA) / C);
        self.state = State::CongestionAvoidance;
        self.start_of_epoch = Some(epoch_start);
        self.previous_start_of_epoch = Some(epoch_start);
    }

    fn enter_recovery(&mut self, notification: Notification, now: Timestamp) {
        self.recovery_sequence = self.next_pn;

        self.w_max = self.congestion_window as f64 / self.send_mtu as f64;
        //= https://www.rfc-editor.org/rfc/rfc8312#section-4.6
        //# the flow remembers the last value of W_max before it updates the
        //# value for W_max... this is indicated by a flag fast_convergence
        if self.w_max < self.w_last_max {
            self.w_last_max = self.w_max;
            self.w_max *= BETA;
        } else {
            self.w_last_max = self.w_max;
        }

        self.ssthresh = (self.w_max * BETA * self.send_mtu as f64) as u64;

        if (self.ssthresh as u32) < self.minimum_window() {
            // fall back to slow start
            self.ssthresh = u64::MAX;
            self.state = State::SlowStart;
            self.previous_start_of_epoch = self.start_of_epoch;
            self.start_of_epoch = Some(now);
            self.w_reno = self.minimum_window() as f64;
            self.congestion_window = self.minimum_window();
        } else if matches!(notification, Notification::Timeout { .. }) {
            self.congestion_window = self.minimum_window();
            self.previous_start_of_epoch = self.start_of_epoch;
            self.start_of_epoch = Some(now);
            self.state = State::SlowStart;
        } else {
            self.enter_avoidance(now);
            let win_cubic = (self.w_cubic(now) * self.send_mtu as f64) as u32;
            self.w_reno = self.congestion_window as f64 / 2.0;
            self.congestion_window = max(win_cubic, self.w_reno as u32);
        }
    }

    /// Restores the window CUBIC held before a loss that turned out to be
    /// spurious, replaying the curve from where it would have been.
    fn correct_spurious(&mut self, now: Timestamp) {
        self.w_max = self.w_last_max;
        let epoch = self.previous_start_of_epoch.unwrap_or(now);
        self.enter_avoidance(epoch);
        let w_cubic = self.w_cubic(now);
        self.w_reno = w_cubic * self.send_mtu as f64;
        self.ssthresh = (self.w_max * BETA * self.send_mtu as f64) as u64;
        self.congestion_window = self.w_reno as u32;
    }

    fn recovery_entry_allowed(
        &self,
        rtt_estimator: &RttEstimator,
        now: Timestamp,
        highest_acked: Option<u64>,
    ) -> bool {
        let epoch_elapsed = self
            .start_of_epoch
            .map_or(true, |start| now - start > rtt_estimator.smoothed_rtt());
        epoch_elapsed || highest_acked.map_or(false, |acked| self.recovery_sequence <= acked)
    }
}

impl CongestionController for CubicCongestionController {
    #[inline]
    fn congestion_window(&self) -> u32 {
        self.congestion_window
    }

    #[inline]
    fn is_slow_start(&self) -> bool {
        self.state == State::SlowStart
    }

    #[inline]
    fn on_packet_sent(&mut self, next_pn: u64) {
        self.next_pn = next_pn;
    }

    fn on_notification(
        &mut self,
        notification: Notification,
        rtt_estimator: &RttEstimator,
        now: Timestamp,
    ) {
        match self.state {
            State::SlowStart => match notification {
                Notification::Ack {
                    bytes_acknowledged, ..
                } => {
                    let smoothed_rtt = rtt_estimator.smoothed_rtt();
                    let increase = if smoothed_rtt <= TARGET_RENO_RTT {
                        bytes_acknowledged as f64
                    } else {
                        (smoothed_rtt.as_secs_f64() / TARGET_RENO_RTT.as_secs_f64())
                            * bytes_acknowledged as f64
                    };
                    self.congestion_window =
                        self.congestion_window.saturating_add(increase as u32);

                    if self.congestion_window as u64 >= self.ssthresh {
                        self.w_reno = self.congestion_window as f64 / 2.0;
                        self.enter_avoidance(now);
                    }
                }
                Notification::Repeat { highest_acked, .. }
                | Notification::Timeout { highest_acked, .. }
                | Notification::EcnCe { highest_acked, .. } => {
                    if self.recovery_entry_allowed(rtt_estimator, now, highest_acked) {
                        self.enter_recovery(notification, now);
                    }
                }
                Notification::SpuriousRepeat => self.correct_spurious(now),
                Notification::RttMeasurement(rtt) => {
                    // only used to detect early exit from the *initial* slow
                    // start, signalled by an unbounded ssthresh
                    if self.ssthresh == u64::MAX && self.rtt_filter.on_rtt_sample(rtt, now) {
                        self.ssthresh = self.congestion_window as u64;
                        self.w_max = self.congestion_window as f64 / self.send_mtu as f64;
                        self.w_last_max = self.w_max;
                        self.w_reno = self.congestion_window as f64;
                        self.enter_avoidance(now);

                        // enter the cubic test phase immediately rather than
                        // waiting out a full `K` from `now`
                        let k_duration = Duration::from_secs_f64(self.k.max(0.0));
                        self.start_of_epoch = match now.checked_sub(k_duration) {
                            Some(start) => Some(start),
                            None => {
                                self.k = 0.0;
                                Some(now)
                            }
                        };
                    }
                }
            },
            State::Recovery => {
                if let Notification::SpuriousRepeat = notification {
                    self.correct_spurious(now);
                } else {
                    match notification {
                        Notification::Ack {
                            bytes_acknowledged, ..
                        } => {
                            self.state = State::SlowStart;
                            self.congestion_window = self
                                .congestion_window
                                .saturating_add(bytes_acknowledged as u32);
                            if self.congestion_window as u64 >= self.ssthresh {
                                self.state = State::CongestionAvoidance;
                            }
                        }
                        Notification::Repeat { highest_acked, .. }
                        | Notification::Timeout { highest_acked, .. }
                        | Notification::EcnCe { highest_acked, .. } => {
                            if self.recovery_entry_allowed(rtt_estimator, now, highest_acked) {
                                self.enter_recovery(notification, now);
                            }
                        }
                        Notification::RttMeasurement(_) | Notification::SpuriousRepeat => {}
                    }
                }
            }
            State::CongestionAvoidance => match notification {
                Notification::Ack {
                    bytes_acknowledged, ..
                } => {
                    let win_cubic = (self.w_cubic(now) * self.send_mtu as f64) as u32;
                    self.w_reno +=
                        (bytes_acknowledged as f64 * self.send_mtu as f64) / self.w_reno;
                    self.congestion_window = max(win_cubic, self.w_reno as u32);
                }
                Notification::Repeat { highest_acked, .. }
                | Notification::Timeout { highest_acked, .. }
                | Notification::EcnCe { highest_acked, .. } => {
                    if self.recovery_entry_allowed(rtt_estimator, now, highest_acked) {
                        self.enter_recovery(notification, now);
                    }
                }
                Notification::SpuriousRepeat => self.correct_spurious(now),
                Notification::RttMeasurement(_) => {}
            },
        }
    }
}

/// A cheap iterative cube root: bracket by powers of 8, then refine with
/// three Newton-Raphson steps.
fn cube_root(x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }

    let mut v = 1.0f64;
    let mut y = 1.0f64;

    while v > x * 8.0 {
        v /= 8.0;
        y /= 2.0;
    }
    while v < x {
        v *= 8.0;
        y *= 2.0;
    }

    for _ in 0..3 {
        let y2 = y * y;
        let y3 = y2 * y;
        y += (x - y3) / (3.0 * y2);
    }

    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{Clock, NoopClock};

    #[test]
    fn cube_root_matches_known_values() {
        assert!((cube_root(27.0) - 3.0).abs() < 0.0001);
        assert!((cube_root(8.0) - 2.0).abs() < 0.0001);
        assert_eq!(cube_root(0.0), 0.0);
    }

    #[test]
    fn starts_in_slow_start_with_initial_window() {
        let controller = CubicCongestionController::new(1200);
        assert!(controller.is_slow_start());
        assert_eq!(controller.congestion_window(), 12000);
    }

    #[test]
    fn slow_start_ack_increases_window_by_acked_bytes() {
        let mut controller = CubicCongestionController::new(1200);
        let rtt = RttEstimator::new(Duration::from_millis(50));
        let now = NoopClock.get_time();
        let window_before = controller.congestion_window();
        controller.on_notification(
            Notification::Ack {
                bytes_acknowledged: 1200,
                time_sent: now,
            },
            &rtt,
            now,
        );
        assert_eq!(controller.congestion_window(), window_before + 1200);
    }

    #[test]
    fn loss_enters_recovery_and_lowers_window() {
        let mut controller = CubicCongestionController::new(1200);
        let rtt = RttEstimator::new(Duration::from_millis(50));
        let now = NoopClock.get_time();
        controller.on_packet_sent(10);
        let window_before = controller.congestion_window();
        controller.on_notification(
            Notification::Repeat {
                next_pn: 11,
                highest_acked: Some(5),
            },
            &rtt,
            now,
        );
        assert!(!controller.is_slow_start());
        assert!(controller.congestion_window() <= window_before);
    }

    #[test]
    fn duplicate_loss_within_epoch_is_ignored() {
        let mut controller = CubicCongestionController::new(1200);
        let rtt = RttEstimator::new(Duration::from_millis(50));
        let now = NoopClock.get_time();
        controller.on_packet_sent(10);
        controller.on_notification(
            Notification::Repeat {
                next_pn: 11,
                highest_acked: Some(5),
            },
            &rtt,
            now,
        );
        let window_after_first = controller.congestion_window();

        // a second loss reported for a PN already covered by the same
        // recovery episode must not re-enter recovery
        controller.on_notification(
            Notification::Repeat {
                next_pn: 11,
                highest_acked: Some(5),
            },
            &rtt,
            now,
        );
        assert_eq!(controller.congestion_window(), window_after_first);
    }

    #[test]
    fn spurious_repeat_restores_previous_window() {
        let mut controller = CubicCongestionController::new(1200);
        let rtt = RttEstimator::new(Duration::from_millis(50));
        let now = NoopClock.get_time();
        controller.on_packet_sent(10);
        controller.on_notification(
            Notification::Repeat {
                next_pn: 11,
                highest_acked: Some(5),
            },
            &rtt,
            now,
        );
        controller.on_notification(Notification::SpuriousRepeat, &rtt, now);
        assert!(!controller.is_slow_start());
    }

    #[test]
    fn timeout_resets_to_minimum_window_and_slow_start() {
        let mut controller = CubicCongestionController::new(1200);
        let rtt = RttEstimator::new(Duration::from_millis(50));
        let now = NoopClock.get_time();
        controller.on_packet_sent(10);
        controller.on_notification(
            Notification::Timeout {
                next_pn: 11,
                highest_acked: Some(5),
            },
            &rtt,
            now,
        );
        assert!(controller.is_slow_start());
        assert_eq!(controller.congestion_window(), controller.minimum_window());
    }
}
