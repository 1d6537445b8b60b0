// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running.
//! Start one with `gcloud emulators firestore start` and set
//! FIRESTORE_EMULATOR_HOST; without it they are skipped.
//!
//! Records use unique ids so runs against a shared emulator do not collide.

use bodyscale::db::{MeasurementQuery, Store};
use bodyscale::models::RawPacket;
use bodyscale::services::decoder::ScaleFrame;
use bodyscale::services::etl::build_measurement;
use bodyscale::services::{decode_packet, ConfirmedMeasurement};
use chrono::{Duration, Utc};

mod common;
use common::{profile, test_db};

/// Generate a unique id for test isolation.
fn unique_id() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}

fn confirmed(packet: &RawPacket) -> ConfirmedMeasurement {
    ConfirmedMeasurement {
        packet_id: packet.id.clone(),
        device_id: packet.device_id.clone(),
        received_at: packet.received_at,
        reading: decode_packet(&packet.payload).unwrap(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PROFILE TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_profile_roundtrip_and_delete() {
    require_emulator!();

    let db = test_db().await;
    let id = unique_id();
    let p = profile(id, "Emulator", 60.0, 70.0);

    assert!(db.get_profile(id).await.unwrap().is_none());

    db.upsert_profile(&p).await.unwrap();
    assert_eq!(db.get_profile(id).await.unwrap(), Some(p));

    assert!(db.delete_profile(id).await.unwrap());
    assert!(!db.delete_profile(id).await.unwrap());
    assert!(db.get_profile(id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_create_profile_is_create_only() {
    require_emulator!();

    let db = test_db().await;
    let id = unique_id();
    let first = profile(id, "First", 60.0, 70.0);
    let second = profile(id, "Second", 80.0, 90.0);

    assert!(db.create_profile(&first).await.unwrap());
    assert!(!db.create_profile(&second).await.unwrap());
    assert_eq!(db.get_profile(id).await.unwrap(), Some(first));

    db.delete_profile(id).await.unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════
// RAW PACKET TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_raw_packets_since() {
    require_emulator!();

    let db = test_db().await;
    let device = format!("device-{}", unique_id());
    let start = Utc::now() + Duration::days(1);
    let frame = ScaleFrame::weight(80.0).to_bytes();

    for secs in [0, 10, 20] {
        let at = start + Duration::seconds(secs);
        let packet = RawPacket::new(at, device.as_str(), frame.clone());
        db.insert_raw_packet(&packet).await.unwrap();
    }

    let tail: Vec<RawPacket> = db
        .list_raw_packets(Some(start + Duration::seconds(10)))
        .await
        .unwrap()
        .into_iter()
        .filter(|p| p.device_id == device)
        .collect();
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].received_at, start + Duration::seconds(10));
}

// ═══════════════════════════════════════════════════════════════════════════
// MEASUREMENT TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_measurement_insert_if_absent() {
    require_emulator!();

    let db = test_db().await;
    let device = format!("device-{}", unique_id());
    let frame = ScaleFrame::weight(80.0).impedance(500.0).complete();
    let packet = RawPacket::new(Utc::now(), device.as_str(), frame.to_bytes());

    db.insert_raw_packet(&packet).await.unwrap();

    let measurement =
        build_measurement(&confirmed(&packet), Some(&profile(1, "Sam", 70.0, 90.0)), Utc::now())
            .unwrap();

    assert!(db.insert_measurement_if_absent(&measurement).await.unwrap());
    assert!(!db.insert_measurement_if_absent(&measurement).await.unwrap());

    let stored = db.get_measurement(&measurement.id).await.unwrap().unwrap();
    assert_eq!(stored.bmr_kcal, Some(1746));
    assert_eq!(stored.device_id, device);
}

#[tokio::test]
async fn test_measurement_query_by_profile_and_window() {
    require_emulator!();

    let db = test_db().await;
    let profile_id = unique_id();
    let owner = profile(profile_id, "Window", 70.0, 90.0);
    let start = Utc::now() - Duration::days(1);

    let mut ids = Vec::new();
    for hour in 0..3 {
        let frame = ScaleFrame::weight(80.0 + hour as f64).complete();
        let packet = RawPacket::new(
            start + Duration::hours(hour),
            format!("device-{}", profile_id),
            frame.to_bytes(),
        );
        let m = build_measurement(&confirmed(&packet), Some(&owner), Utc::now()).unwrap();
        db.insert_measurement_if_absent(&m).await.unwrap();
        ids.push(m.id);
    }

    let all = db
        .query_measurements(MeasurementQuery {
            profile_id: Some(profile_id),
            ..Default::default()
        })
        .await
        .unwrap();
    let found: Vec<&str> = all.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(found, ids.iter().map(String::as_str).collect::<Vec<_>>());

    let windowed = db
        .query_measurements(MeasurementQuery {
            since: Some(start + Duration::minutes(30)),
            until: Some(start + Duration::minutes(150)),
            profile_id: Some(profile_id),
        })
        .await
        .unwrap();
    assert_eq!(windowed.len(), 2);
    assert_eq!(windowed[0].id, ids[1]);

    let recent = db.recent_measurements(1, Some(profile_id)).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, ids[2]);
}

// ═══════════════════════════════════════════════════════════════════════════
// OFFLINE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_offline_client_reports_database_error() {
    let db = bodyscale::db::FirestoreDb::new_mock();
    let err = db.list_profiles().await.unwrap_err();
    assert!(matches!(err, bodyscale::error::AppError::Database(_)));
}
