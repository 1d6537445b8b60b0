// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod measurement;
pub mod packet;
pub mod profile;

pub use measurement::Measurement;
pub use packet::{DecodedReading, RawPacket};
pub use profile::{Gender, Profile};
