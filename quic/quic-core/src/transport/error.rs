// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use crate::{
    crypto::CryptoError,
    varint::{VarInt, VarIntError},
};
use core::fmt;
use quic_codec::DecoderError;

//= https://www.rfc-editor.org/rfc/rfc9000#section-20
//# QUIC error codes are 62-bit unsigned integers.

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Error {
    pub code: VarInt,
    pub frame_type: Option<VarInt>,
    pub reason: &'static str,
}

impl Error {
    pub const fn new(code: VarInt, reason: &'static str, frame_type: Option<VarInt>) -> Self {
        Self {
            code,
            reason,
            frame_type,
        }
    }

    pub const fn with_frame_type(mut self, frame_type: VarInt) -> Self {
        self.frame_type = Some(frame_type);
        self
    }

    pub const fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = reason;
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.reason.is_empty() {
            let code: u64 = self.code.into();
            write!(f, "TransportError({code})")?;
        } else {
            f.write_str(self.reason)?;
        }

        Ok(())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

macro_rules! def_error {
    ($doc:expr, $name:ident, $code:expr) => {
        impl Error {
            #[doc = $doc]
            pub const $name: VarInt = VarInt::from_u32($code);
        }
    };
}

def_error!(
    "Signals that the connection is being closed abruptly in the absence of any error.",
    NO_ERROR,
    0x0
);
def_error!(
    "The endpoint encountered an internal error and cannot continue with the connection.",
    INTERNAL_ERROR,
    0x1
);
def_error!(
    "The server is currently busy and does not accept any new connections.",
    SERVER_BUSY,
    0x2
);
def_error!(
    "An endpoint received more data than it permitted in its advertised data limits.",
    FLOW_CONTROL_ERROR,
    0x3
);
def_error!(
    "An endpoint received a frame for a stream identifier that exceeded its advertised stream limit.",
    STREAM_LIMIT_ERROR,
    0x4
);
def_error!(
    "An endpoint received a frame for a stream that was not in a state that permitted that frame.",
    STREAM_STATE_ERROR,
    0x5
);
def_error!(
    "An endpoint received data exceeding the previously established final size of a stream.",
    FINAL_SIZE_ERROR,
    0x6
);
def_error!(
    "An endpoint received a frame that was badly formatted.",
    FRAME_ENCODING_ERROR,
    0x7
);
def_error!(
    "An endpoint received transport parameters that were badly formatted or otherwise in error.",
    TRANSPORT_PARAMETER_ERROR,
    0x8
);
def_error!(
    "An endpoint detected an error with protocol compliance not covered by a more specific code.",
    PROTOCOL_VIOLATION,
    0xA
);
def_error!(
    "An endpoint received more data in CRYPTO frames than it can buffer.",
    CRYPTO_BUFFER_EXCEEDED,
    0xD
);

impl Error {
    /// Creates a crypto-level `Error` from a TLS alert code.
    #[inline]
    pub fn crypto_error(code: u8, reason: &'static str) -> Self {
        Self {
            code: VarInt::from_u32(0x100 | u32::from(code)),
            reason,
            frame_type: None,
        }
    }
}

/// Builds a `transport::Error` with variable arguments.
#[macro_export]
macro_rules! transport_error {
    ($error:ident) => {
        $crate::transport::error::Error::new($crate::transport::error::Error::$error, "", None)
    };
    ($error:expr) => {
        $crate::transport::error::Error::new($error, "", None)
    };
    ($error:ident, $reason:expr) => {
        $crate::transport::error::Error::new(
            $crate::transport::error::Error::$error,
            $reason,
            None,
        )
    };
    ($error:expr, $reason:expr) => {
        $crate::transport::error::Error::new($error, $reason, None)
    };
    ($error:ident, $reason:expr, $frame:expr) => {
        $crate::transport::error::Error::new(
            $crate::transport::error::Error::$error,
            $reason,
            Some($frame.into()),
        )
    };
}

impl From<DecoderError> for Error {
    fn from(decoder_error: DecoderError) -> Self {
        match decoder_error {
            DecoderError::InvariantViolation(reason) => {
                transport_error!(PROTOCOL_VIOLATION, reason)
            }
            _ => transport_error!(PROTOCOL_VIOLATION, "malformed packet"),
        }
    }
}

impl From<CryptoError> for Error {
    fn from(crypto_error: CryptoError) -> Self {
        Self::crypto_error(crypto_error.code, crypto_error.reason)
    }
}

impl From<VarIntError> for Error {
    fn from(_: VarIntError) -> Self {
        transport_error!(INTERNAL_ERROR, "varint encoding limit exceeded")
    }
}

/// Converts an error into a `transport::Error` and adds reason context.
#[macro_export]
macro_rules! with_transport_information {
    ($reason:expr) => {
        |err| {
            let err: $crate::transport::error::Error = err.into();
            err.with_reason($reason)
        }
    };
    ($reason:expr, $frame:expr) => {
        |err| {
            let err: $crate::transport::error::Error = err.into();
            err.with_reason($reason).with_frame_type($frame)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_reason_when_present() {
        let err = transport_error!(PROTOCOL_VIOLATION, "bad frame");
        assert_eq!(err.to_string(), "bad frame");
    }

    #[test]
    fn display_falls_back_to_code() {
        let err = transport_error!(FLOW_CONTROL_ERROR);
        assert_eq!(err.to_string(), "TransportError(3)");
    }

    #[test]
    fn crypto_error_sets_0x100_range() {
        let err = Error::crypto_error(50, "decode_error");
        assert_eq!(err.code, VarInt::from_u32(0x132));
    }
}
