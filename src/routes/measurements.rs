// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Measurement and chart endpoints for the dashboard.

use crate::db::{MeasurementQuery, Store};
use crate::error::{AppError, Result};
use crate::models::Measurement;
use crate::time_utils::parse_utc;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const MAX_LIMIT: u32 = 100;
const DEFAULT_CHART_DAYS: u32 = 30;

pub fn routes<S: Store>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/api/measurements", get(get_measurements::<S>))
        .route("/api/measurements/latest", get(get_latest::<S>))
        .route("/api/measurements/recent", get(get_recent::<S>))
        .route("/api/chart-data", get(get_chart_data::<S>))
}

#[derive(Deserialize)]
struct ProfileFilter {
    profile_id: Option<u64>,
}

/// Most recent measurement, or `null` if there is none.
async fn get_latest<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ProfileFilter>,
) -> Result<Json<Option<Measurement>>> {
    let mut latest = state.db.recent_measurements(1, params.profile_id).await?;
    Ok(Json(latest.pop()))
}

// ─── Time Window ─────────────────────────────────────────────

#[derive(Deserialize)]
struct WindowQuery {
    /// Inclusive start (RFC 3339)
    since: Option<String>,
    /// Exclusive end (RFC 3339)
    until: Option<String>,
    /// Look back this many days; ignored when `since` is given
    days: Option<u32>,
    profile_id: Option<u64>,
}

fn parse_bound(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|r| {
        parse_utc(r).map_err(|_| {
            AppError::BadRequest(format!(
                "Invalid '{}' parameter: must be RFC3339 datetime",
                name
            ))
        })
    })
    .transpose()
}

impl WindowQuery {
    fn to_query(&self, now: DateTime<Utc>, default_days: Option<u32>) -> Result<MeasurementQuery> {
        let since = match parse_bound("since", self.since.as_deref())? {
            Some(s) => Some(s),
            None => self
                .days
                .or(default_days)
                .map(|d| now - Duration::days(i64::from(d))),
        };
        let until = parse_bound("until", self.until.as_deref())?;

        if let (Some(s), Some(u)) = (since, until) {
            if s >= u {
                return Err(AppError::BadRequest(
                    "'since' must be before 'until'".to_string(),
                ));
            }
        }

        Ok(MeasurementQuery {
            since,
            until,
            profile_id: self.profile_id,
        })
    }
}

/// Measurements in a time window, oldest first.
async fn get_measurements<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<WindowQuery>,
) -> Result<Json<Vec<Measurement>>> {
    let query = params.to_query(Utc::now(), None)?;
    Ok(Json(state.db.query_measurements(query).await?))
}

// ─── Recent ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct RecentQuery {
    #[serde(default = "default_limit")]
    limit: u32,
    profile_id: Option<u64>,
}

fn default_limit() -> u32 {
    10
}

/// Most recent measurements, newest first.
async fn get_recent<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<Vec<Measurement>>> {
    let limit = params.limit.clamp(1, MAX_LIMIT);
    Ok(Json(
        state.db.recent_measurements(limit, params.profile_id).await?,
    ))
}

// ─── Chart ───────────────────────────────────────────────────

/// Parallel series for the weight and body-fat chart.
#[derive(Debug, Serialize, Default)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ChartData {
    /// Measurement dates (`YYYY-MM-DD`)
    pub labels: Vec<String>,
    pub weights: Vec<f64>,
    pub body_fat: Vec<Option<f64>>,
}

impl FromIterator<Measurement> for ChartData {
    fn from_iter<I: IntoIterator<Item = Measurement>>(iter: I) -> Self {
        let mut chart = ChartData::default();
        for m in iter {
            chart
                .labels
                .push(m.timestamp.format("%Y-%m-%d").to_string());
            chart.weights.push(m.weight_kg);
            chart.body_fat.push(m.body_fat_pct);
        }
        chart
    }
}

/// Chart series over the last 30 days by default.
async fn get_chart_data<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<WindowQuery>,
) -> Result<Json<ChartData>> {
    let query = params.to_query(Utc::now(), Some(DEFAULT_CHART_DAYS))?;
    let measurements = state.db.query_measurements(query).await?;
    Ok(Json(measurements.into_iter().collect()))
}
