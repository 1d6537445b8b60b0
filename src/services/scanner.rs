// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! BLE central scan feeding the ingest pipeline.

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager};
use chrono::Utc;
use futures_util::StreamExt;

use crate::services::advertisement::Advertisement;
use crate::services::ingest::{IngestError, IngestHandle};

#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    #[error("No Bluetooth adapter found")]
    NoAdapter,
}

/// Open the first Bluetooth adapter.
pub async fn first_adapter() -> Result<Adapter, ScannerError> {
    let manager = Manager::new().await?;
    let adapter = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or(ScannerError::NoAdapter)?;

    if let Ok(info) = adapter.adapter_info().await {
        tracing::info!(adapter = %info, "Using Bluetooth adapter");
    }
    Ok(adapter)
}

/// Scan until the event stream ends or the ingest pipeline stops.
///
/// Every manufacturer-data advertisement is forwarded; filtering by name and
/// company id happens in the pipeline.
pub async fn run_scanner(adapter: Adapter, ingest: IngestHandle) -> Result<(), ScannerError> {
    let mut events = adapter.events().await?;
    adapter.start_scan(ScanFilter::default()).await?;
    tracing::info!("BLE scan started");

    while let Some(event) = events.next().await {
        let CentralEvent::ManufacturerDataAdvertisement {
            id,
            manufacturer_data,
        } = event
        else {
            continue;
        };

        let received_at = Utc::now();
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "Advertisement from unknown peripheral");
                continue;
            }
        };
        let device_name = peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|p| p.local_name);
        let device_id = peripheral.address().to_string();

        for (manufacturer_id, data) in manufacturer_data {
            let adv = Advertisement {
                device_name: device_name.clone(),
                device_id: device_id.clone(),
                manufacturer_id,
                manufacturer_data: data,
                received_at,
            };

            match ingest.submit(adv).await {
                Ok(()) => {}
                Err(IngestError::QueueFull) => {
                    tracing::warn!(device_id = %device_id, "Ingest queue full, dropping advertisement");
                }
                Err(IngestError::Closed) => {
                    tracing::info!("Ingest pipeline closed, stopping scan");
                    adapter.stop_scan().await?;
                    return Ok(());
                }
            }
        }
    }

    adapter.stop_scan().await?;
    Ok(())
}
