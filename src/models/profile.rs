// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Household member profiles used to attribute weigh-ins.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Gender selector for the BIA formula constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Gender {
    Male,
    Female,
}

/// Profile stored in Firestore (document id = `id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Profile {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub name: String,
    pub height_cm: u32,
    pub age: u32,
    pub gender: Gender,
    /// Lower bound of the weight range owned by this profile (inclusive)
    pub min_weight_kg: f64,
    /// Upper bound of the weight range owned by this profile (inclusive)
    pub max_weight_kg: f64,
}

impl Profile {
    /// Whether `weight_kg` falls inside this profile's range.
    pub fn contains(&self, weight_kg: f64) -> bool {
        self.min_weight_kg <= weight_kg && weight_kg <= self.max_weight_kg
    }

    /// Width of the weight range, used for tie-breaking.
    pub fn range_width(&self) -> f64 {
        self.max_weight_kg - self.min_weight_kg
    }

    /// Whether the attributes feeding the BIA formulas differ.
    pub fn body_attributes_differ(&self, other: &Profile) -> bool {
        self.height_cm != other.height_cm || self.age != other.age || self.gender != other.gender
    }

    /// Whether the weight range differs.
    pub fn range_differs(&self, other: &Profile) -> bool {
        self.min_weight_kg != other.min_weight_kg || self.max_weight_kg != other.max_weight_kg
    }
}
