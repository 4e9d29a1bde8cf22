// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Time related datatypes independent of any particular clock source.

mod timestamp;

pub use timestamp::Timestamp;

/// A source of the current time.
///
/// Implementations are provided by the collaborator that owns the event
/// loop; this crate only consumes `Timestamp`s produced by a `Clock`.
pub trait Clock {
    fn get_time(&self) -> Timestamp;
}

/// A `Clock` with a fixed, non-advancing time. Useful for deterministic tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopClock;

impl Clock for NoopClock {
    fn get_time(&self) -> Timestamp {
        unsafe { Timestamp::from_duration(core::time::Duration::from_secs(1)) }
    }
}
