// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Measurement ETL.
//!
//! Handles the core workflow:
//! 1. Replay newly stored raw packets through the decoder and a debounce
//!    tracker resumed from the stored measurements
//! 2. Match each confirmed weigh-in to a profile by weight range
//! 3. Compute body composition when a profile and impedance are available
//! 4. Store the measurement, keyed by the confirming packet id
//!
//! and the maintenance sweeps run when profiles change.

use std::ops::AddAssign;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::db::{MeasurementQuery, Store};
use crate::error::{AppError, Result};
use crate::models::{Measurement, Profile};
use crate::services::body_composition::{calculate, CompositionError, CompositionInput};
use crate::services::debounce::{ConfirmedMeasurement, DebounceTracker};
use crate::services::decoder::decode_packet;
use crate::services::profile_match::{match_profile, ProfileMatch};

/// Counters from one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct EtlStats {
    /// Raw packets read
    pub packets: u32,
    /// Packets skipped because they could not be decoded
    pub malformed: u32,
    /// Weigh-ins confirmed by the debounce replay
    pub confirmed: u32,
    /// Measurements written by this run
    pub created: u32,
    /// Confirmed weigh-ins that already had a measurement
    pub skipped: u32,
    /// Weigh-ins whose composition could not be computed
    pub failed: u32,
}

/// Counters from a recalculation or re-match sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RecalcStats {
    pub examined: u32,
    pub updated: u32,
    pub failed: u32,
}

impl AddAssign for RecalcStats {
    fn add_assign(&mut self, other: Self) {
        self.examined += other.examined;
        self.updated += other.updated;
        self.failed += other.failed;
    }
}

/// Result of processing one confirmed weigh-in.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Created { profile_id: Option<u64> },
    AlreadyProcessed,
}

/// Turns raw packets and confirmed events into measurements.
pub struct EtlService<S: Store> {
    db: S,
    cooldown: Duration,
    /// Serializes sweeps and holds the newest packet time the last batch
    /// run read. Live inserts rely on insert-if-absent instead.
    sweep_lock: Mutex<Option<DateTime<Utc>>>,
}

impl<S: Store> EtlService<S> {
    pub fn new(db: S, cooldown: Duration) -> Self {
        Self {
            db,
            cooldown,
            sweep_lock: Mutex::new(None),
        }
    }

    pub fn db(&self) -> &S {
        &self.db
    }

    /// Replay stored raw packets and create the missing measurements.
    ///
    /// The first run replays the whole history. Later runs start one
    /// cooldown before the newest packet the previous run read, which also
    /// catches packets stored shortly after their capture time. Devices
    /// confirmed just before that point resume their cooldown from the
    /// stored measurements, so the result matches a full replay.
    ///
    /// Malformed packets and composition failures are counted and skipped;
    /// storage errors abort the run.
    pub async fn run_batch(&self) -> Result<EtlStats> {
        let mut watermark = self.sweep_lock.lock().await;

        let replay_from = (*watermark).map(|w| w - self.cooldown);
        let packets = self.db.list_raw_packets(replay_from).await?;
        let profiles = self.db.list_profiles().await?;
        let tracker = DebounceTracker::new(self.cooldown);

        if let Some(from) = replay_from {
            self.resume_cooldowns(&tracker, from).await?;
        }

        let mut stats = EtlStats {
            packets: packets.len() as u32,
            ..Default::default()
        };

        for packet in &packets {
            let reading = match decode_packet(&packet.payload) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(
                        packet_id = %packet.id,
                        device_id = %packet.device_id,
                        error = %e,
                        "Skipping malformed packet"
                    );
                    stats.malformed += 1;
                    continue;
                }
            };

            let Some(event) = tracker.observe(packet, reading) else {
                continue;
            };
            stats.confirmed += 1;

            match self.process_confirmed(&event, &profiles).await {
                Ok(ProcessOutcome::Created { .. }) => stats.created += 1,
                Ok(ProcessOutcome::AlreadyProcessed) => stats.skipped += 1,
                Err(AppError::Internal(e)) => {
                    tracing::error!(
                        packet_id = %event.packet_id,
                        error = %e,
                        "Failed to compute measurement"
                    );
                    stats.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(newest) = packets.last().map(|p| p.received_at) {
            *watermark = Some((*watermark).map_or(newest, |w| w.max(newest)));
        }

        tracing::info!(
            replay_from = ?replay_from,
            packets = stats.packets,
            malformed = stats.malformed,
            confirmed = stats.confirmed,
            created = stats.created,
            skipped = stats.skipped,
            failed = stats.failed,
            "ETL batch complete"
        );

        Ok(stats)
    }

    /// Put devices whose weigh-in ended less than a cooldown before `from`
    /// back into cooldown.
    async fn resume_cooldowns(
        &self,
        tracker: &DebounceTracker,
        from: DateTime<Utc>,
    ) -> Result<()> {
        let recent = self
            .db
            .query_measurements(MeasurementQuery {
                since: Some(from - self.cooldown),
                until: Some(from),
                profile_id: None,
            })
            .await?;

        for m in &recent {
            tracker.resume_cooldown(&m.device_id, m.timestamp);
        }
        Ok(())
    }

    /// Store the measurement for one confirmed weigh-in.
    ///
    /// Idempotent: a second call for the same event finds the existing row.
    pub async fn process_confirmed(
        &self,
        event: &ConfirmedMeasurement,
        profiles: &[Profile],
    ) -> Result<ProcessOutcome> {
        let matched = match_profile(event.reading.weight_kg, profiles);
        log_match(event, &matched);

        let measurement = build_measurement(event, matched.profile(), Utc::now())?;
        let profile_id = measurement.profile_id;

        if self.db.insert_measurement_if_absent(&measurement).await? {
            tracing::info!(
                measurement_id = %measurement.id,
                profile_id = ?profile_id,
                weight_kg = measurement.weight_kg,
                body_fat_pct = ?measurement.body_fat_pct,
                "Measurement stored"
            );
            Ok(ProcessOutcome::Created { profile_id })
        } else {
            tracing::debug!(
                measurement_id = %measurement.id,
                "Measurement already processed (idempotent skip)"
            );
            Ok(ProcessOutcome::AlreadyProcessed)
        }
    }

    /// Recompute derived fields of every measurement owned by `profile_id`.
    ///
    /// Each row is written on its own, so an interrupted sweep can simply be
    /// run again.
    pub async fn recalculate_profile(&self, profile_id: u64) -> Result<RecalcStats> {
        let _guard = self.sweep_lock.lock().await;

        let profile = self
            .db
            .get_profile(profile_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", profile_id)))?;

        let measurements = self
            .db
            .query_measurements(MeasurementQuery {
                profile_id: Some(profile_id),
                ..Default::default()
            })
            .await?;

        let mut stats = RecalcStats::default();
        let now = Utc::now();

        for measurement in measurements {
            stats.examined += 1;
            match self.reassign(&measurement, Some(&profile), now).await {
                Ok(true) => stats.updated += 1,
                Ok(false) => {}
                Err(AppError::Internal(e)) => {
                    tracing::error!(measurement_id = %measurement.id, error = %e, "Recalculation failed");
                    stats.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            profile_id,
            examined = stats.examined,
            updated = stats.updated,
            failed = stats.failed,
            "Profile recalculation complete"
        );
        Ok(stats)
    }

    /// Re-match every measurement against the current profile ranges.
    ///
    /// Rows whose owner changes get the new profile id and fresh derived
    /// fields; rows that still match their profile are left alone.
    pub async fn rematch_all(&self) -> Result<RecalcStats> {
        let _guard = self.sweep_lock.lock().await;

        let profiles = self.db.list_profiles().await?;
        let measurements = self
            .db
            .query_measurements(MeasurementQuery::default())
            .await?;

        let mut stats = RecalcStats::default();
        let now = Utc::now();

        for measurement in measurements {
            stats.examined += 1;
            let matched = match_profile(measurement.weight_kg, &profiles);
            if matched.profile_id() == measurement.profile_id {
                continue;
            }

            tracing::debug!(
                measurement_id = %measurement.id,
                from = ?measurement.profile_id,
                to = ?matched.profile_id(),
                "Re-assigning measurement"
            );

            match self.reassign(&measurement, matched.profile(), now).await {
                Ok(true) => stats.updated += 1,
                Ok(false) => {}
                Err(AppError::Internal(e)) => {
                    tracing::error!(measurement_id = %measurement.id, error = %e, "Re-match failed");
                    stats.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            examined = stats.examined,
            updated = stats.updated,
            failed = stats.failed,
            "Measurement re-match complete"
        );
        Ok(stats)
    }

    /// Bring measurements in line after a profile was created, edited or deleted.
    pub async fn on_profile_changed(
        &self,
        previous: Option<&Profile>,
        current: Option<&Profile>,
    ) -> Result<RecalcStats> {
        match (previous, current) {
            (None, None) => Ok(RecalcStats::default()),
            (None, Some(_)) | (Some(_), None) => self.rematch_all().await,
            (Some(old), Some(new)) => {
                let mut stats = RecalcStats::default();
                if old.range_differs(new) {
                    stats += self.rematch_all().await?;
                }
                if old.body_attributes_differ(new) {
                    stats += self.recalculate_profile(new.id).await?;
                }
                Ok(stats)
            }
        }
    }

    /// Apply `profile` to a stored measurement and write it if anything changed.
    async fn reassign(
        &self,
        measurement: &Measurement,
        profile: Option<&Profile>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut updated = measurement.clone();
        apply_profile(&mut updated, profile, now)?;

        if same_derived_fields(&updated, measurement) {
            return Ok(false);
        }

        self.db.update_measurement(&updated).await?;
        Ok(true)
    }
}

/// Build a measurement for a confirmed weigh-in.
pub fn build_measurement(
    event: &ConfirmedMeasurement,
    profile: Option<&Profile>,
    now: DateTime<Utc>,
) -> std::result::Result<Measurement, CompositionError> {
    let mut measurement = Measurement {
        id: event.packet_id.clone(),
        timestamp: event.received_at,
        device_id: event.device_id.clone(),
        device_user_id: event.reading.user_id,
        profile_id: None,
        weight_kg: event.reading.weight_kg,
        impedance_raw: event.reading.impedance_raw,
        impedance_ohm: event.reading.impedance_ohm,
        body_fat_pct: None,
        fat_mass_kg: None,
        lean_mass_kg: None,
        body_water_pct: None,
        muscle_mass_kg: None,
        bone_mass_kg: None,
        bmr_kcal: None,
        bmi: None,
        updated_at: now,
    };
    apply_profile(&mut measurement, profile, now)?;
    Ok(measurement)
}

/// Set the owner of a measurement and recompute its derived fields.
///
/// Composition is only computed with both a profile and a measured
/// impedance; otherwise the derived fields are cleared.
pub fn apply_profile(
    measurement: &mut Measurement,
    profile: Option<&Profile>,
    now: DateTime<Utc>,
) -> std::result::Result<(), CompositionError> {
    let composition = match (profile, measurement.impedance_ohm) {
        (Some(p), Some(impedance_ohm)) => Some(calculate(&CompositionInput::for_profile(
            measurement.weight_kg,
            impedance_ohm,
            p,
        ))?),
        _ => None,
    };

    measurement.profile_id = profile.map(|p| p.id);
    measurement.set_composition(composition.as_ref());
    measurement.updated_at = now;
    Ok(())
}

fn same_derived_fields(a: &Measurement, b: &Measurement) -> bool {
    a.profile_id == b.profile_id
        && a.body_fat_pct == b.body_fat_pct
        && a.fat_mass_kg == b.fat_mass_kg
        && a.lean_mass_kg == b.lean_mass_kg
        && a.body_water_pct == b.body_water_pct
        && a.muscle_mass_kg == b.muscle_mass_kg
        && a.bone_mass_kg == b.bone_mass_kg
        && a.bmr_kcal == b.bmr_kcal
        && a.bmi == b.bmi
}

fn log_match(event: &ConfirmedMeasurement, matched: &ProfileMatch<'_>) {
    match matched {
        ProfileMatch::Matched(p) => {
            tracing::debug!(packet_id = %event.packet_id, profile_id = p.id, "Profile matched");
        }
        ProfileMatch::Ambiguous { chosen, candidates } => {
            tracing::warn!(
                packet_id = %event.packet_id,
                weight_kg = event.reading.weight_kg,
                chosen = chosen.id,
                candidates = ?candidates,
                "Ambiguous profile match, overlapping weight ranges"
            );
        }
        ProfileMatch::Unassigned => {
            tracing::debug!(
                packet_id = %event.packet_id,
                weight_kg = event.reading.weight_kg,
                "No profile matches weight, storing unassigned"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecodedReading, Gender};
    use chrono::TimeZone;

    fn event(impedance_raw: u16) -> ConfirmedMeasurement {
        ConfirmedMeasurement {
            packet_id: "abc".to_string(),
            device_id: "scale".to_string(),
            received_at: Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap(),
            reading: DecodedReading {
                weight_kg: 80.0,
                impedance_raw,
                impedance_ohm: (impedance_raw > 0).then(|| f64::from(impedance_raw) / 10.0),
                status_complete: true,
                locked: true,
                user_id: 1,
            },
        }
    }

    fn profile() -> Profile {
        Profile {
            id: 1,
            name: "Sam".to_string(),
            height_cm: 173,
            age: 43,
            gender: Gender::Male,
            min_weight_kg: 70.0,
            max_weight_kg: 90.0,
        }
    }

    #[test]
    fn test_build_measurement_with_profile_and_impedance() {
        let m = build_measurement(&event(5000), Some(&profile()), Utc::now()).unwrap();
        assert_eq!(m.id, "abc");
        assert_eq!(m.profile_id, Some(1));
        assert_eq!(m.impedance_ohm, Some(500.0));
        assert_eq!(m.body_fat_pct, Some(23.3));
        assert_eq!(m.bmr_kcal, Some(1746));
        assert_eq!(m.bmi, Some(26.7));
    }

    #[test]
    fn test_zero_impedance_leaves_composition_null() {
        let m = build_measurement(&event(0), Some(&profile()), Utc::now()).unwrap();
        assert_eq!(m.profile_id, Some(1));
        assert_eq!(m.impedance_ohm, None);
        assert!(!m.has_composition());
        assert_eq!(m.bmi, None);
    }

    #[test]
    fn test_unassigned_leaves_composition_null() {
        let m = build_measurement(&event(5000), None, Utc::now()).unwrap();
        assert_eq!(m.profile_id, None);
        assert!(!m.has_composition());
    }

    #[test]
    fn test_apply_profile_clears_fields_when_unassigned() {
        let now = Utc::now();
        let mut m = build_measurement(&event(5000), Some(&profile()), now).unwrap();
        apply_profile(&mut m, None, now).unwrap();
        assert_eq!(m.profile_id, None);
        assert!(!m.has_composition());
        assert_eq!(m.weight_kg, 80.0);
        assert_eq!(m.impedance_raw, 5000);
    }
}
