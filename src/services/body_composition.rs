// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Body composition from bioelectrical impedance (openScale compatible).

use serde::Serialize;

use crate::models::{Gender, Profile};

/// Inputs to the BIA formulas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositionInput {
    pub weight_kg: f64,
    pub impedance_ohm: f64,
    pub height_cm: u32,
    pub age: u32,
    pub gender: Gender,
}

impl CompositionInput {
    pub fn for_profile(weight_kg: f64, impedance_ohm: f64, profile: &Profile) -> Self {
        Self {
            weight_kg,
            impedance_ohm,
            height_cm: profile.height_cm,
            age: profile.age,
            gender: profile.gender,
        }
    }
}

/// Derived body composition metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BodyComposition {
    pub body_fat_pct: f64,
    pub fat_mass_kg: f64,
    pub lean_mass_kg: f64,
    pub body_water_pct: f64,
    pub muscle_mass_kg: f64,
    pub bone_mass_kg: f64,
    pub bmr_kcal: i64,
    pub bmi: f64,
}

/// Per-gender formula constants.
struct Coefficients {
    lbm_impedance_index: f64,
    lbm_weight: f64,
    lbm_intercept: f64,
    bone_factor: f64,
    bmr_intercept: f64,
    bmr_weight: f64,
    bmr_height: f64,
    bmr_age: f64,
}

const MALE: Coefficients = Coefficients {
    lbm_impedance_index: 0.485,
    lbm_weight: 0.338,
    lbm_intercept: 5.32,
    bone_factor: 22.0,
    bmr_intercept: 88.36,
    bmr_weight: 13.4,
    bmr_height: 4.8,
    bmr_age: 5.7,
};

const FEMALE: Coefficients = Coefficients {
    lbm_impedance_index: 0.474,
    lbm_weight: 0.180,
    lbm_intercept: 5.03,
    bone_factor: 20.0,
    bmr_intercept: 447.6,
    bmr_weight: 9.2,
    bmr_height: 3.1,
    bmr_age: 4.3,
};

const WATER_FRACTION_OF_LBM: f64 = 0.73;
const MUSCLE_FRACTION_OF_LBM: f64 = 0.9;
const BONE_CAP_FRACTION_OF_LBM: f64 = 0.05;

/// Calculate body composition.
///
/// Fails with `InvalidInput` instead of producing infinities or NaN; zero
/// impedance is expected to be filtered out by the caller.
pub fn calculate(input: &CompositionInput) -> Result<BodyComposition, CompositionError> {
    validate(input)?;

    let c = match input.gender {
        Gender::Male => &MALE,
        Gender::Female => &FEMALE,
    };

    let weight = input.weight_kg;
    let height = f64::from(input.height_cm);
    let height_m = height / 100.0;

    let lbm = c.lbm_impedance_index * (height * height / input.impedance_ohm)
        + c.lbm_weight * weight
        + c.lbm_intercept;

    let fat_mass_kg = weight - lbm;
    let body_fat_pct = fat_mass_kg / weight * 100.0;

    let body_water_kg = lbm * WATER_FRACTION_OF_LBM;
    let body_water_pct = body_water_kg / weight * 100.0;

    let muscle_mass_kg = lbm * MUSCLE_FRACTION_OF_LBM;

    let bone_mass_kg =
        (0.18 * height_m * height_m * c.bone_factor).min(lbm * BONE_CAP_FRACTION_OF_LBM);

    let bmr = c.bmr_intercept + c.bmr_weight * weight + c.bmr_height * height
        - c.bmr_age * f64::from(input.age);

    let bmi = weight / (height_m * height_m);

    Ok(BodyComposition {
        body_fat_pct: round1(body_fat_pct),
        fat_mass_kg: round1(fat_mass_kg),
        lean_mass_kg: round1(lbm),
        body_water_pct: round1(body_water_pct),
        muscle_mass_kg: round1(muscle_mass_kg),
        bone_mass_kg: round1(bone_mass_kg),
        bmr_kcal: bmr.round() as i64,
        bmi: round1(bmi),
    })
}

fn validate(input: &CompositionInput) -> Result<(), CompositionError> {
    if !(input.impedance_ohm.is_finite() && input.impedance_ohm > 0.0) {
        return Err(CompositionError::InvalidInput(format!(
            "impedance must be positive, got {}",
            input.impedance_ohm
        )));
    }
    if !(input.weight_kg.is_finite() && input.weight_kg > 0.0) {
        return Err(CompositionError::InvalidInput(format!(
            "weight must be positive, got {}",
            input.weight_kg
        )));
    }
    if input.height_cm == 0 {
        return Err(CompositionError::InvalidInput(
            "height must be positive".to_string(),
        ));
    }
    Ok(())
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Errors from the composition engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompositionError {
    #[error("Invalid composition input: {0}")]
    InvalidInput(String),
}
