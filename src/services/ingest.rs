// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live ingestion of scale advertisements.
//!
//! Advertisements arrive on a bounded channel and are handled in order by a
//! single task. That task never awaits storage: raw packets go to a writer
//! task and confirmed weigh-ins go to an ETL worker, each over its own
//! bounded channel.
//!
//! Only packets queued for storage reach the tracker, so the live path sees
//! the same packet stream a later batch replay reads back. The ETL worker
//! stores the confirming packet itself before the measurement, so a
//! measurement never points at a packet missing from the raw table. A
//! confirmed event dropped here is recovered by the next batch run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::Store;
use crate::models::RawPacket;
use crate::services::advertisement::{Advertisement, AdvertisementFilter};
use crate::services::debounce::{ConfirmedMeasurement, DebounceTracker};
use crate::services::decoder::decode_packet;
use crate::services::etl::EtlService;

/// How long a full queue may hold up a send before the item is dropped.
pub const SEND_TIMEOUT: Duration = Duration::from_millis(250);

/// How often idle devices are dropped from the tracker.
const EVICT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("Ingest queue full")]
    QueueFull,

    #[error("Ingest pipeline stopped")]
    Closed,
}

/// What became of one advertisement.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Not from the scale
    Filtered,
    /// Not queued for storage, so not tracked either
    Dropped,
    /// Stored but undecodable
    Malformed,
    /// Decoded, no weigh-in confirmed yet
    Pending,
    /// Confirmed a weigh-in; carries the raw packet id
    Confirmed(String),
}

/// Cloneable handle for pushing advertisements into the pipeline.
#[derive(Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<Advertisement>,
}

impl IngestHandle {
    pub async fn submit(&self, adv: Advertisement) -> Result<(), IngestError> {
        self.tx.send_timeout(adv, SEND_TIMEOUT).await.map_err(|e| match e {
            mpsc::error::SendTimeoutError::Timeout(_) => IngestError::QueueFull,
            mpsc::error::SendTimeoutError::Closed(_) => IngestError::Closed,
        })
    }
}

/// Filter, decode and debounce stage of the live path.
pub struct IngestPipeline {
    filter: AdvertisementFilter,
    tracker: Arc<DebounceTracker>,
    raw_tx: mpsc::Sender<RawPacket>,
    confirmed_tx: mpsc::Sender<LiveConfirmation>,
}

/// A confirmed weigh-in together with the packet that confirmed it.
#[derive(Debug, Clone)]
pub struct LiveConfirmation {
    pub packet: RawPacket,
    pub event: ConfirmedMeasurement,
}

impl IngestPipeline {
    pub fn new(
        filter: AdvertisementFilter,
        tracker: Arc<DebounceTracker>,
        raw_tx: mpsc::Sender<RawPacket>,
        confirmed_tx: mpsc::Sender<LiveConfirmation>,
    ) -> Self {
        Self {
            filter,
            tracker,
            raw_tx,
            confirmed_tx,
        }
    }

    pub async fn handle(&self, adv: Advertisement) -> IngestOutcome {
        if !self.filter.accepts(&adv) {
            return IngestOutcome::Filtered;
        }

        let packet = RawPacket::new(adv.received_at, adv.device_id.clone(), adv.scale_payload());

        let decoded = decode_packet(&packet.payload);

        if let Err(e) = self.raw_tx.send_timeout(packet.clone(), SEND_TIMEOUT).await {
            tracing::warn!(packet_id = %packet.id, error = %e, "Dropping raw packet");
            return IngestOutcome::Dropped;
        }

        let reading = match decoded {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    packet_id = %packet.id,
                    device_id = %packet.device_id,
                    error = %e,
                    "Malformed advertisement"
                );
                return IngestOutcome::Malformed;
            }
        };

        let Some(event) = self.tracker.observe(&packet, reading) else {
            return IngestOutcome::Pending;
        };

        let packet_id = event.packet_id.clone();
        let confirmation = LiveConfirmation { packet, event };
        if let Err(e) = self.confirmed_tx.send_timeout(confirmation, SEND_TIMEOUT).await {
            // The raw packet is queued for storage, so the next batch run picks it up.
            tracing::warn!(packet_id = %packet_id, error = %e, "Deferring confirmed measurement to batch");
        }

        IngestOutcome::Confirmed(packet_id)
    }
}

/// Background tasks of a running pipeline.
pub struct IngestTasks {
    pub ingest: JoinHandle<()>,
    pub raw_writer: JoinHandle<()>,
    pub etl_worker: JoinHandle<()>,
}

impl IngestTasks {
    pub fn abort(&self) {
        self.ingest.abort();
        self.raw_writer.abort();
        self.etl_worker.abort();
    }
}

/// Start the live pipeline.
///
/// The tasks run until every [`IngestHandle`] is dropped.
pub fn spawn_ingest<S: Store>(
    etl: Arc<EtlService<S>>,
    filter: AdvertisementFilter,
    tracker: Arc<DebounceTracker>,
    capacity: usize,
) -> (IngestHandle, IngestTasks) {
    let (adv_tx, adv_rx) = mpsc::channel(capacity);
    let (raw_tx, raw_rx) = mpsc::channel(capacity);
    let (confirmed_tx, confirmed_rx) = mpsc::channel(capacity);

    let pipeline = IngestPipeline::new(filter, tracker, raw_tx, confirmed_tx);

    let tasks = IngestTasks {
        ingest: tokio::spawn(run_ingest(pipeline, adv_rx)),
        raw_writer: tokio::spawn(run_raw_writer(etl.db().clone(), raw_rx)),
        etl_worker: tokio::spawn(run_etl_worker(etl, confirmed_rx)),
    };

    (IngestHandle { tx: adv_tx }, tasks)
}

async fn run_ingest(pipeline: IngestPipeline, mut rx: mpsc::Receiver<Advertisement>) {
    let mut evict = tokio::time::interval(EVICT_INTERVAL);

    loop {
        tokio::select! {
            adv = rx.recv() => {
                let Some(adv) = adv else { break };
                if let IngestOutcome::Confirmed(packet_id) = pipeline.handle(adv).await {
                    tracing::info!(packet_id = %packet_id, "Weigh-in confirmed");
                }
            }
            _ = evict.tick() => {
                let removed = pipeline.tracker.evict_expired();
                if removed > 0 {
                    tracing::debug!(removed, "Evicted idle devices from tracker");
                }
            }
        }
    }

    tracing::info!("Ingest loop stopped");
}

async fn run_raw_writer<S: Store>(db: S, mut rx: mpsc::Receiver<RawPacket>) {
    while let Some(packet) = rx.recv().await {
        if let Err(e) = db.insert_raw_packet(&packet).await {
            tracing::error!(packet_id = %packet.id, error = %e, "Failed to store raw packet");
        }
    }
}

async fn run_etl_worker<S: Store>(
    etl: Arc<EtlService<S>>,
    mut rx: mpsc::Receiver<LiveConfirmation>,
) {
    while let Some(LiveConfirmation { packet, event }) = rx.recv().await {
        // The raw writer may still hold this packet; inserting twice is a no-op.
        if let Err(e) = etl.db().insert_raw_packet(&packet).await {
            tracing::error!(packet_id = %packet.id, error = %e, "Failed to store confirming packet");
            continue;
        }

        let profiles = match etl.db().list_profiles().await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(packet_id = %event.packet_id, error = %e, "Failed to load profiles");
                continue;
            }
        };

        if let Err(e) = etl.process_confirmed(&event, &profiles).await {
            tracing::error!(packet_id = %event.packet_id, error = %e, "Live ETL failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::decoder::ScaleFrame;
    use chrono::{DateTime, TimeZone, Utc};

    fn filter() -> AdvertisementFilter {
        AdvertisementFilter {
            name: "tzc".to_string(),
            manufacturer_id: None,
        }
    }

    fn adv(frame: &ScaleFrame, at: DateTime<Utc>) -> Advertisement {
        Advertisement {
            device_name: Some("tzc".to_string()),
            device_id: "AA:BB:CC:DD:EE:FF".to_string(),
            manufacturer_id: frame.company_id(),
            manufacturer_data: frame.manufacturer_data(),
            received_at: at,
        }
    }

    fn pipeline() -> (
        IngestPipeline,
        mpsc::Receiver<RawPacket>,
        mpsc::Receiver<LiveConfirmation>,
    ) {
        pipeline_with_capacity(16)
    }

    fn pipeline_with_capacity(
        raw_capacity: usize,
    ) -> (
        IngestPipeline,
        mpsc::Receiver<RawPacket>,
        mpsc::Receiver<LiveConfirmation>,
    ) {
        let (raw_tx, raw_rx) = mpsc::channel(raw_capacity);
        let (confirmed_tx, confirmed_rx) = mpsc::channel(16);
        let p = IngestPipeline::new(
            filter(),
            Arc::new(DebounceTracker::default()),
            raw_tx,
            confirmed_tx,
        );
        (p, raw_rx, confirmed_rx)
    }

    #[tokio::test]
    async fn test_filtered_advertisement_is_not_stored() {
        let (p, mut raw_rx, _confirmed_rx) = pipeline();
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap();
        let mut other = adv(&ScaleFrame::weight(80.0), at);
        other.device_name = Some("other".to_string());

        assert_eq!(p.handle(other).await, IngestOutcome::Filtered);
        assert!(raw_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_weigh_in_confirms_once() {
        let (p, mut raw_rx, mut confirmed_rx) = pipeline();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap();
        let settling = ScaleFrame::weight(80.0);
        let complete = ScaleFrame::weight(80.0).impedance(500.0).complete();

        assert_eq!(p.handle(adv(&settling, t0)).await, IngestOutcome::Pending);
        let outcome = p
            .handle(adv(&complete, t0 + chrono::Duration::seconds(2)))
            .await;
        assert!(matches!(outcome, IngestOutcome::Confirmed(_)));
        assert_eq!(
            p.handle(adv(&complete, t0 + chrono::Duration::seconds(3)))
                .await,
            IngestOutcome::Pending
        );

        let mut stored = 0;
        while raw_rx.try_recv().is_ok() {
            stored += 1;
        }
        assert_eq!(stored, 3);

        let LiveConfirmation { packet, event } = confirmed_rx.try_recv().unwrap();
        assert_eq!(packet.id, event.packet_id);
        assert!((event.reading.weight_kg - 80.0).abs() < 0.01);
        assert_eq!(event.reading.impedance_ohm, Some(500.0));
        assert!(confirmed_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_advertisement_is_stored_and_skipped() {
        let (p, mut raw_rx, mut confirmed_rx) = pipeline();
        let short = Advertisement {
            device_name: Some("tzc".to_string()),
            device_id: "AA:BB:CC:DD:EE:FF".to_string(),
            manufacturer_id: 0xA6C0,
            manufacturer_data: vec![0x01, 0x40],
            received_at: Utc::now(),
        };

        assert_eq!(p.handle(short).await, IngestOutcome::Malformed);
        assert_eq!(raw_rx.try_recv().unwrap().payload.len(), 4);
        assert!(confirmed_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_packet_not_queued_for_storage_is_not_tracked() {
        let (p, mut raw_rx, mut confirmed_rx) = pipeline_with_capacity(1);
        let t0 = Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap();
        let settling = ScaleFrame::weight(80.0);
        let complete = ScaleFrame::weight(80.0).impedance(500.0).complete();

        // Nothing drains the raw queue, so the second send times out.
        assert_eq!(p.handle(adv(&settling, t0)).await, IngestOutcome::Pending);
        assert_eq!(
            p.handle(adv(&complete, t0 + chrono::Duration::seconds(2)))
                .await,
            IngestOutcome::Dropped
        );
        assert!(confirmed_rx.try_recv().is_err());
        assert_eq!(
            p.tracker.state("AA:BB:CC:DD:EE:FF"),
            crate::services::debounce::TrackerState::AwaitingCompletion
        );

        // Once the queue drains, the next complete frame confirms as a replay would.
        raw_rx.try_recv().unwrap();
        let next = adv(&complete, t0 + chrono::Duration::seconds(3));
        let expected =
            RawPacket::new(next.received_at, next.device_id.clone(), next.scale_payload());
        assert_eq!(
            p.handle(next).await,
            IngestOutcome::Confirmed(expected.id.clone())
        );
        assert_eq!(raw_rx.try_recv().unwrap().id, expected.id);
        assert_eq!(confirmed_rx.try_recv().unwrap().packet.id, expected.id);
    }
}
