// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Transport-level error codes (RFC 9000 section 20).

pub mod error;

pub use error::Error;
