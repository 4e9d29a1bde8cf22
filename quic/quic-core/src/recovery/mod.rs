// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Loss-recovery timers and the CUBIC congestion controller.
//!
//! [`RttEstimator`] implements the RFC 9002 smoothing equations; the
//! congestion controller itself (see [`cubic`]) is built around a single
//! notification dispatch rather than a callback-per-event shape, because
//! that is the shape the wire-level `Notification` values in this core map
//! onto most directly.

pub mod congestion_controller;
pub mod cubic;
pub(crate) mod hystart;
mod rtt_estimator;

pub use congestion_controller::{CongestionController, Notification};
pub use cubic::CubicCongestionController;
pub use rtt_estimator::{RttEstimator, DEFAULT_INITIAL_RTT, K_GRANULARITY, MIN_RTT};
