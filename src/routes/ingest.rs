// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pipeline entry points: advertisement push and on-demand ETL.
//!
//! The push endpoint lets a scanner running elsewhere (or a test harness)
//! feed the live pipeline over HTTP.

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::services::advertisement::{parse_advertising_report_hex, Advertisement};
use crate::services::etl::EtlStats;
use crate::services::ingest::IngestError;
use crate::time_utils::parse_utc;
use crate::AppState;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

pub fn routes<S: Store>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/api/etl/run", post(run_etl::<S>))
        .route("/api/advertisements", post(push_advertisement::<S>))
}

/// Run a batch over all stored raw packets.
async fn run_etl<S: Store>(State(state): State<Arc<AppState<S>>>) -> Result<Json<EtlStats>> {
    tracing::info!("On-demand ETL run");
    Ok(Json(state.etl.run_batch().await?))
}

/// An advertisement as pushed by a remote scanner.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AdvertisementRequest {
    /// Raw HCI LE advertising report, hex encoded
    Hci {
        hci_report: String,
        received_at: Option<String>,
    },
    Fields {
        device_name: Option<String>,
        device_id: String,
        manufacturer_id: u16,
        /// Hex encoded
        manufacturer_data: String,
        received_at: Option<String>,
    },
}

fn parse_received_at(raw: Option<&str>) -> Result<DateTime<Utc>> {
    match raw {
        Some(r) => parse_utc(r).map_err(|_| {
            AppError::BadRequest("Invalid 'received_at': must be RFC3339 datetime".to_string())
        }),
        None => Ok(Utc::now()),
    }
}

impl AdvertisementRequest {
    fn into_advertisement(self) -> Result<Advertisement> {
        match self {
            AdvertisementRequest::Hci {
                hci_report,
                received_at,
            } => {
                let received_at = parse_received_at(received_at.as_deref())?;
                parse_advertising_report_hex(&hci_report)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?
                    .into_advertisement(received_at)
                    .ok_or_else(|| {
                        AppError::BadRequest("Report carries no manufacturer data".to_string())
                    })
            }
            AdvertisementRequest::Fields {
                device_name,
                device_id,
                manufacturer_id,
                manufacturer_data,
                received_at,
            } => Ok(Advertisement {
                device_name,
                device_id,
                manufacturer_id,
                manufacturer_data: hex::decode(manufacturer_data.trim()).map_err(|_| {
                    AppError::BadRequest("Invalid 'manufacturer_data': must be hex".to_string())
                })?,
                received_at: parse_received_at(received_at.as_deref())?,
            }),
        }
    }
}

/// Queue one advertisement for the live pipeline.
async fn push_advertisement<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<AdvertisementRequest>,
) -> Result<StatusCode> {
    let adv = req.into_advertisement()?;

    state.ingest.submit(adv).await.map_err(|e| match e {
        IngestError::QueueFull => AppError::Unavailable("Ingest queue full".to_string()),
        IngestError::Closed => AppError::Unavailable("Ingest pipeline stopped".to_string()),
    })?;

    Ok(StatusCode::ACCEPTED)
}
