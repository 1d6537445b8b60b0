// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory store for local development and tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::db::{MeasurementQuery, Store};
use crate::error::AppError;
use crate::models::{Measurement, Profile, RawPacket};

#[derive(Default)]
struct Tables {
    raw_packets: BTreeMap<String, RawPacket>,
    measurements: BTreeMap<String, Measurement>,
    profiles: BTreeMap<u64, Profile>,
}

/// Store backed by maps behind a single lock. Contents are lost on restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored measurements.
    pub async fn measurement_count(&self) -> usize {
        self.tables.read().await.measurements.len()
    }

    /// Number of stored raw packets.
    pub async fn raw_packet_count(&self) -> usize {
        self.tables.read().await.raw_packets.len()
    }
}

impl Store for MemoryStore {
    async fn insert_raw_packet(&self, packet: &RawPacket) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables
            .raw_packets
            .entry(packet.id.clone())
            .or_insert_with(|| packet.clone());
        Ok(())
    }

    async fn list_raw_packets(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawPacket>, AppError> {
        let tables = self.tables.read().await;
        let mut packets: Vec<RawPacket> = tables
            .raw_packets
            .values()
            .filter(|p| since.is_none_or(|s| p.received_at >= s))
            .cloned()
            .collect();
        packets.sort_by(|a, b| a.received_at.cmp(&b.received_at).then_with(|| a.id.cmp(&b.id)));
        Ok(packets)
    }

    async fn get_measurement(&self, id: &str) -> Result<Option<Measurement>, AppError> {
        Ok(self.tables.read().await.measurements.get(id).cloned())
    }

    async fn insert_measurement_if_absent(
        &self,
        measurement: &Measurement,
    ) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        if tables.measurements.contains_key(&measurement.id) {
            return Ok(false);
        }
        tables
            .measurements
            .insert(measurement.id.clone(), measurement.clone());
        Ok(true)
    }

    async fn update_measurement(&self, measurement: &Measurement) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        match tables.measurements.get_mut(&measurement.id) {
            Some(existing) => {
                *existing = measurement.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!(
                "Measurement {} not found",
                measurement.id
            ))),
        }
    }

    async fn query_measurements(
        &self,
        query: MeasurementQuery,
    ) -> Result<Vec<Measurement>, AppError> {
        let tables = self.tables.read().await;
        let mut results: Vec<Measurement> = tables
            .measurements
            .values()
            .filter(|m| query.matches(m))
            .cloned()
            .collect();
        results.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(results)
    }

    async fn recent_measurements(
        &self,
        limit: u32,
        profile_id: Option<u64>,
    ) -> Result<Vec<Measurement>, AppError> {
        let mut results = self
            .query_measurements(MeasurementQuery {
                profile_id,
                ..Default::default()
            })
            .await?;
        results.reverse();
        results.truncate(limit as usize);
        Ok(results)
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, AppError> {
        Ok(self.tables.read().await.profiles.values().cloned().collect())
    }

    async fn get_profile(&self, id: u64) -> Result<Option<Profile>, AppError> {
        Ok(self.tables.read().await.profiles.get(&id).cloned())
    }

    async fn create_profile(&self, profile: &Profile) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        if tables.profiles.contains_key(&profile.id) {
            return Ok(false);
        }
        tables.profiles.insert(profile.id, profile.clone());
        Ok(true)
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<(), AppError> {
        self.tables
            .write()
            .await
            .profiles
            .insert(profile.id, profile.clone());
        Ok(())
    }

    async fn delete_profile(&self, id: u64) -> Result<bool, AppError> {
        Ok(self.tables.write().await.profiles.remove(&id).is_some())
    }
}
