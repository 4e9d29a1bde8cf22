// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The congestion-control collaborator interface.
//!
//! Unlike an event-callback design, congestion signals are funneled through a
//! single [`Notification`] dispatched to [`CongestionController::on_notification`];
//! the controller owns its own state machine and decides what each
//! notification means given its current phase.

use crate::{recovery::RttEstimator, time::Timestamp};
use core::fmt::Debug;

/// A congestion-relevant event observed on a path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Notification {
    /// `bytes_acknowledged` newly-acked bytes, attributed to the packet sent
    /// at `time_sent`.
    Ack {
        bytes_acknowledged: usize,
        time_sent: Timestamp,
    },
    /// A packet was declared lost by the loss detector.
    Repeat { next_pn: u64, highest_acked: Option<u64> },
    /// A probe-timeout fired with no intervening ack.
    Timeout { next_pn: u64, highest_acked: Option<u64> },
    /// The ECN CE counter increased.
    EcnCe { next_pn: u64, highest_acked: Option<u64> },
    /// A packet previously declared lost was acknowledged after all.
    SpuriousRepeat,
    /// A fresh RTT sample, independent of any ack/loss bookkeeping.
    RttMeasurement(core::time::Duration),
}

/// An algorithm for controlling congestion, notification-driven per path.
pub trait CongestionController: Clone + Debug {
    /// The current congestion window, in bytes.
    fn congestion_window(&self) -> u32;

    /// `true` while the controller has not yet left slow start.
    fn is_slow_start(&self) -> bool;

    /// Invoked when a packet is sent, to track the next-send packet number
    /// used by recovery-entry deduplication.
    fn on_packet_sent(&mut self, next_pn: u64);

    /// Dispatches a congestion notification.
    fn on_notification(
        &mut self,
        notification: Notification,
        rtt_estimator: &RttEstimator,
        now: Timestamp,
    );
}
