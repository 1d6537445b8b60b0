// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - measurement pipeline.

pub mod advertisement;
pub mod body_composition;
pub mod debounce;
pub mod decoder;
pub mod etl;
pub mod ingest;
pub mod profile_match;
#[cfg(feature = "ble")]
pub mod scanner;

pub use advertisement::{Advertisement, AdvertisementError, AdvertisementFilter};
pub use body_composition::{BodyComposition, CompositionError};
pub use debounce::{ConfirmedMeasurement, DebounceTracker};
pub use decoder::{decode_packet, DecodeError};
pub use etl::{EtlService, EtlStats, RecalcStats};
pub use ingest::{spawn_ingest, IngestError, IngestHandle};
pub use profile_match::{find_overlaps, match_profile, ProfileMatch};
