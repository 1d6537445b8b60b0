//! Database layer.
//!
//! Pipeline code is generic over [`Store`]; production runs on Firestore and
//! local development and tests run on [`MemoryStore`].

pub mod firestore;
pub mod memory;

use std::future::Future;

use chrono::{DateTime, Utc};

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{Measurement, Profile, RawPacket};

/// Collection names as constants.
pub mod collections {
    pub const RAW_PACKETS: &str = "raw_packets";
    pub const MEASUREMENTS: &str = "measurements";
    pub const PROFILES: &str = "profiles";
}

/// Time window and owner filter for measurement queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeasurementQuery {
    /// Inclusive lower bound
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound
    pub until: Option<DateTime<Utc>>,
    pub profile_id: Option<u64>,
}

impl MeasurementQuery {
    pub fn matches(&self, m: &Measurement) -> bool {
        self.since.is_none_or(|s| m.timestamp >= s)
            && self.until.is_none_or(|u| m.timestamp < u)
            && self.profile_id.is_none_or(|id| m.profile_id == Some(id))
    }
}

/// Record store for raw packets, measurements and profiles.
pub trait Store: Clone + Send + Sync + 'static {
    // ─── Raw Packets ─────────────────────────────────────────────

    /// Append a raw packet. Re-inserting the same packet is a no-op.
    fn insert_raw_packet(
        &self,
        packet: &RawPacket,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Raw packets received at or after `since` (all when `None`), oldest
    /// first with ties broken by id.
    fn list_raw_packets(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<Vec<RawPacket>, AppError>> + Send;

    // ─── Measurements ────────────────────────────────────────────

    fn get_measurement(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<Measurement>, AppError>> + Send;

    /// Insert unless a measurement with the same id exists.
    ///
    /// Returns `true` if the measurement was written.
    fn insert_measurement_if_absent(
        &self,
        measurement: &Measurement,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Overwrite an existing measurement.
    fn update_measurement(
        &self,
        measurement: &Measurement,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Measurements matching `query`, oldest first.
    fn query_measurements(
        &self,
        query: MeasurementQuery,
    ) -> impl Future<Output = Result<Vec<Measurement>, AppError>> + Send;

    /// Most recent measurements, newest first.
    fn recent_measurements(
        &self,
        limit: u32,
        profile_id: Option<u64>,
    ) -> impl Future<Output = Result<Vec<Measurement>, AppError>> + Send;

    // ─── Profiles ────────────────────────────────────────────────

    /// All profiles ordered by id.
    fn list_profiles(&self) -> impl Future<Output = Result<Vec<Profile>, AppError>> + Send;

    fn get_profile(
        &self,
        id: u64,
    ) -> impl Future<Output = Result<Option<Profile>, AppError>> + Send;

    /// Create a profile unless its id is taken.
    ///
    /// Returns `true` if the profile was written.
    fn create_profile(
        &self,
        profile: &Profile,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn upsert_profile(
        &self,
        profile: &Profile,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Returns `true` if a profile was deleted.
    fn delete_profile(&self, id: u64) -> impl Future<Output = Result<bool, AppError>> + Send;
}
