// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use bodyscale::config::Config;
use bodyscale::db::{FirestoreDb, MemoryStore};
use bodyscale::models::{Gender, Profile, RawPacket};
use bodyscale::routes::create_router;
use bodyscale::services::decoder::ScaleFrame;
use bodyscale::services::{spawn_ingest, DebounceTracker, EtlService};
use bodyscale::AppState;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Parse an RFC3339 string for test fixtures.
#[allow(dead_code)]
pub fn parse_time(raw: &str) -> DateTime<Utc> {
    bodyscale::time_utils::parse_utc(raw).expect("valid test timestamp")
}

/// Create a test app on an in-memory store with the live pipeline running.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState<MemoryStore>>) {
    let config = Config::test_default();
    let db = MemoryStore::new();
    let etl = Arc::new(EtlService::new(db.clone(), config.cooldown()));

    let (ingest, _tasks) = spawn_ingest(
        etl.clone(),
        config.advertisement_filter(),
        Arc::new(DebounceTracker::new(config.cooldown())),
        config.ingest_queue_capacity,
    );

    let state = Arc::new(AppState {
        config,
        db,
        etl,
        ingest,
    });

    (create_router(state.clone()), state)
}

#[allow(dead_code)]
pub fn profile(id: u64, name: &str, min: f64, max: f64) -> Profile {
    Profile {
        id,
        name: name.to_string(),
        height_cm: 173,
        age: 43,
        gender: Gender::Male,
        min_weight_kg: min,
        max_weight_kg: max,
    }
}

/// Packets for one weigh-in: settling frames, the complete frame two
/// seconds in, then residual complete broadcasts.
#[allow(dead_code)]
pub fn weigh_in(
    device_id: &str,
    start: DateTime<Utc>,
    weight_kg: f64,
    impedance_ohm: f64,
) -> Vec<RawPacket> {
    let settling = ScaleFrame::weight(weight_kg - 0.4);
    let complete = ScaleFrame::weight(weight_kg)
        .impedance(impedance_ohm)
        .complete();

    vec![
        RawPacket::new(start, device_id, settling.to_bytes()),
        RawPacket::new(start + Duration::seconds(1), device_id, settling.to_bytes()),
        RawPacket::new(start + Duration::seconds(2), device_id, complete.to_bytes()),
        RawPacket::new(start + Duration::seconds(3), device_id, complete.to_bytes()),
        RawPacket::new(start + Duration::seconds(5), device_id, complete.to_bytes()),
    ]
}
