// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::fmt;

/// Error produced while removing or applying packet protection.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Error {
    pub reason: &'static str,
}

impl Error {
    pub const DECODE_ERROR: Self = Self {
        reason: "DECODE_ERROR",
    };
    pub const DECRYPT_ERROR: Self = Self {
        reason: "DECRYPT_ERROR",
    };
    pub const INTERNAL_ERROR: Self = Self {
        reason: "INTERNAL_ERROR",
    };
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.reason.is_empty() {
            self.reason.fmt(f)
        } else {
            write!(f, "packet_protection::Error")
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("packet_protection::Error");
        if !self.reason.is_empty() {
            d.field("reason", &self.reason);
        }
        d.finish()
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
