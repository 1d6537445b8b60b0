// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile management.
//!
//! Every write re-attributes stored measurements before responding, so the
//! dashboard never shows rows computed from stale profile data.

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{Gender, Profile};
use crate::services::etl::RecalcStats;
use crate::services::profile_match::find_overlaps;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::{Validate, ValidationError};

pub fn routes<S: Store>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route(
            "/api/profiles",
            get(list_profiles::<S>).post(create_profile::<S>),
        )
        .route(
            "/api/profiles/{id}",
            put(update_profile::<S>).delete(delete_profile::<S>),
        )
}

/// Create/update request body.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_weight_range"))]
pub struct ProfileRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(range(min = 50, max = 250))]
    pub height_cm: u32,
    #[validate(range(min = 1, max = 120))]
    pub age: u32,
    pub gender: Gender,
    #[validate(range(min = 0.0, max = 300.0))]
    pub min_weight_kg: f64,
    #[validate(range(min = 0.0, max = 300.0))]
    pub max_weight_kg: f64,
}

fn validate_weight_range(req: &ProfileRequest) -> std::result::Result<(), ValidationError> {
    if req.min_weight_kg > req.max_weight_kg {
        let mut err = ValidationError::new("weight_range");
        err.message = Some("min_weight_kg must not exceed max_weight_kg".into());
        return Err(err);
    }
    Ok(())
}

impl ProfileRequest {
    fn into_profile(self, id: u64) -> Profile {
        Profile {
            id,
            name: self.name.trim().to_string(),
            height_cm: self.height_cm,
            age: self.age,
            gender: self.gender,
            min_weight_kg: self.min_weight_kg,
            max_weight_kg: self.max_weight_kg,
        }
    }
}

/// Response for profile writes.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProfileWriteResponse {
    pub profile: Profile,
    /// Ids of other profiles whose weight range overlaps this one
    #[cfg_attr(feature = "binding-generation", ts(type = "number[]"))]
    pub overlaps_with: Vec<u64>,
    pub recalculation: RecalcStats,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProfileDeleteResponse {
    pub deleted: bool,
    pub recalculation: RecalcStats,
}

async fn list_profiles<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Profile>>> {
    Ok(Json(state.db.list_profiles().await?))
}

/// Ids of profiles overlapping `profile`, logging each pair.
async fn overlaps_for<S: Store>(db: &S, profile: &Profile) -> Result<Vec<u64>> {
    let profiles = db.list_profiles().await?;
    let overlaps: Vec<u64> = find_overlaps(&profiles)
        .into_iter()
        .filter_map(|(a, b)| match (a, b) {
            (a, other) if a == profile.id => Some(other),
            (other, b) if b == profile.id => Some(other),
            _ => None,
        })
        .collect();

    if !overlaps.is_empty() {
        tracing::warn!(
            profile_id = profile.id,
            overlaps_with = ?overlaps,
            "Profile weight range overlaps other profiles"
        );
    }
    Ok(overlaps)
}

/// Attempts at claiming a fresh profile id before giving up.
const MAX_CREATE_ATTEMPTS: usize = 5;

/// Store `req` under the next free id (`max(existing) + 1`).
///
/// The write is create-only; if a concurrent create took the id first, the
/// id is recomputed and the write retried.
async fn insert_new_profile<S: Store>(db: &S, req: &ProfileRequest) -> Result<Profile> {
    for _ in 0..MAX_CREATE_ATTEMPTS {
        let next_id = db
            .list_profiles()
            .await?
            .iter()
            .map(|p| p.id)
            .max()
            .unwrap_or(0)
            + 1;
        let profile = req.clone().into_profile(next_id);

        if db.create_profile(&profile).await? {
            return Ok(profile);
        }
        tracing::debug!(profile_id = next_id, "Profile id taken, retrying");
    }

    Err(AppError::Unavailable("Could not allocate a profile id".to_string()))
}

async fn create_profile<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<ProfileRequest>,
) -> Result<(StatusCode, Json<ProfileWriteResponse>)> {
    req.validate()?;

    let profile = insert_new_profile(&state.db, &req).await?;
    tracing::info!(profile_id = profile.id, name = %profile.name, "Profile created");

    let overlaps_with = overlaps_for(&state.db, &profile).await?;
    let recalculation = state.etl.on_profile_changed(None, Some(&profile)).await?;

    Ok((
        StatusCode::CREATED,
        Json(ProfileWriteResponse {
            profile,
            overlaps_with,
            recalculation,
        }),
    ))
}

async fn update_profile<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<u64>,
    Json(req): Json<ProfileRequest>,
) -> Result<Json<ProfileWriteResponse>> {
    req.validate()?;

    let previous = state
        .db
        .get_profile(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", id)))?;
    let profile = req.into_profile(id);

    state.db.upsert_profile(&profile).await?;
    tracing::info!(profile_id = id, "Profile updated");

    let overlaps_with = overlaps_for(&state.db, &profile).await?;
    let recalculation = state
        .etl
        .on_profile_changed(Some(&previous), Some(&profile))
        .await?;

    Ok(Json(ProfileWriteResponse {
        profile,
        overlaps_with,
        recalculation,
    }))
}

async fn delete_profile<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<u64>,
) -> Result<Json<ProfileDeleteResponse>> {
    let previous = state
        .db
        .get_profile(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", id)))?;

    let deleted = state.db.delete_profile(id).await?;
    tracing::info!(profile_id = id, "Profile deleted");

    let recalculation = state.etl.on_profile_changed(Some(&previous), None).await?;

    Ok(Json(ProfileDeleteResponse {
        deleted,
        recalculation,
    }))
}
