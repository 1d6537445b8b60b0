// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Measurement model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::services::body_composition::BodyComposition;
use crate::time_utils::utc_millis;

/// One confirmed weigh-in, stored in Firestore.
///
/// `weight_kg` and the impedance fields are facts from the scale and never
/// change. Everything else is derived and may be recomputed in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Measurement {
    /// Id of the raw packet that confirmed this weigh-in (also the document id)
    pub id: String,
    /// When the confirming frame was received
    #[serde(with = "utc_millis")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub timestamp: DateTime<Utc>,
    /// BLE device that produced the frame
    pub device_id: String,
    /// User slot reported by the scale
    pub device_user_id: u16,
    /// Owning profile, `None` when no range matched
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub profile_id: Option<u64>,
    pub weight_kg: f64,
    pub impedance_raw: u16,
    pub impedance_ohm: Option<f64>,
    pub body_fat_pct: Option<f64>,
    pub fat_mass_kg: Option<f64>,
    pub lean_mass_kg: Option<f64>,
    pub body_water_pct: Option<f64>,
    pub muscle_mass_kg: Option<f64>,
    pub bone_mass_kg: Option<f64>,
    pub bmr_kcal: Option<i64>,
    pub bmi: Option<f64>,
    /// Last time derived fields were written
    #[serde(with = "utc_millis")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub updated_at: DateTime<Utc>,
}

impl Measurement {
    /// Replace every derived body-composition field.
    pub fn set_composition(&mut self, composition: Option<&BodyComposition>) {
        self.body_fat_pct = composition.map(|c| c.body_fat_pct);
        self.fat_mass_kg = composition.map(|c| c.fat_mass_kg);
        self.lean_mass_kg = composition.map(|c| c.lean_mass_kg);
        self.body_water_pct = composition.map(|c| c.body_water_pct);
        self.muscle_mass_kg = composition.map(|c| c.muscle_mass_kg);
        self.bone_mass_kg = composition.map(|c| c.bone_mass_kg);
        self.bmr_kcal = composition.map(|c| c.bmr_kcal);
        self.bmi = composition.map(|c| c.bmi);
    }

    /// Whether body-composition fields are populated.
    pub fn has_composition(&self) -> bool {
        self.body_fat_pct.is_some()
    }
}
