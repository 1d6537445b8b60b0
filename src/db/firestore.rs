// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Raw packets (append-only audit trail, keyed by content id)
//! - Measurements (keyed by the id of the confirming raw packet)
//! - Profiles (keyed by numeric profile id)

use chrono::{DateTime, Utc};

use crate::db::{collections, MeasurementQuery, Store};
use crate::error::AppError;
use crate::models::{Measurement, Profile, RawPacket};
use crate::time_utils::format_utc_millis;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }
}

impl Store for FirestoreDb {
    // ─── Raw Packet Operations ───────────────────────────────────

    async fn insert_raw_packet(&self, packet: &RawPacket) -> Result<(), AppError> {
        // Same id means same capture, so an overwrite is harmless.
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::RAW_PACKETS)
            .document_id(&packet.id)
            .object(packet)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_raw_packets(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawPacket>, AppError> {
        let since = since.map(format_utc_millis);

        let mut packets: Vec<RawPacket> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::RAW_PACKETS)
            .filter(move |q| {
                q.for_all([since
                    .clone()
                    .and_then(|s| q.field("received_at").greater_than_or_equal(s))])
            })
            .order_by([("received_at", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Firestore only orders by timestamp; break ties by id for a stable replay.
        packets.sort_by(|a, b| a.received_at.cmp(&b.received_at).then_with(|| a.id.cmp(&b.id)));
        Ok(packets)
    }

    // ─── Measurement Operations ──────────────────────────────────

    async fn get_measurement(&self, id: &str) -> Result<Option<Measurement>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::MEASUREMENTS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a measurement unless it already exists.
    ///
    /// Uses a create-only write, so Firestore itself rejects the second of
    /// two racing inserts (a live event and a batch run) for the same id.
    async fn insert_measurement_if_absent(
        &self,
        measurement: &Measurement,
    ) -> Result<bool, AppError> {
        let result: Result<(), firestore::errors::FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::MEASUREMENTS)
            .document_id(&measurement.id)
            .object(measurement)
            .execute()
            .await;

        match result {
            Ok(()) => Ok(true),
            Err(firestore::errors::FirestoreError::DataConflictError(_)) => {
                tracing::debug!(
                    measurement_id = %measurement.id,
                    "Measurement already exists (idempotent skip)"
                );
                Ok(false)
            }
            Err(e) => Err(AppError::Database(format!("Failed to create measurement: {}", e))),
        }
    }

    async fn update_measurement(&self, measurement: &Measurement) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::MEASUREMENTS)
            .document_id(&measurement.id)
            .object(measurement)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn query_measurements(
        &self,
        query: MeasurementQuery,
    ) -> Result<Vec<Measurement>, AppError> {
        let since = query.since.map(format_utc_millis);
        let until = query.until.map(format_utc_millis);
        let profile_id = query.profile_id;

        self.get_client()?
            .fluent()
            .select()
            .from(collections::MEASUREMENTS)
            .filter(move |q| {
                q.for_all([
                    since
                        .clone()
                        .and_then(|s| q.field("timestamp").greater_than_or_equal(s)),
                    until.clone().and_then(|u| q.field("timestamp").less_than(u)),
                    profile_id.and_then(|id| q.field("profile_id").eq(id)),
                ])
            })
            .order_by([("timestamp", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn recent_measurements(
        &self,
        limit: u32,
        profile_id: Option<u64>,
    ) -> Result<Vec<Measurement>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::MEASUREMENTS)
            .filter(move |q| q.for_all([profile_id.and_then(|id| q.field("profile_id").eq(id))]))
            .order_by([("timestamp", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Profile Operations ──────────────────────────────────────

    async fn list_profiles(&self) -> Result<Vec<Profile>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::PROFILES)
            .order_by([("id", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_profile(&self, id: u64) -> Result<Option<Profile>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PROFILES)
            .obj()
            .one(&id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn create_profile(&self, profile: &Profile) -> Result<bool, AppError> {
        let result: Result<(), firestore::errors::FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::PROFILES)
            .document_id(profile.id.to_string())
            .object(profile)
            .execute()
            .await;

        match result {
            Ok(()) => Ok(true),
            Err(firestore::errors::FirestoreError::DataConflictError(_)) => Ok(false),
            Err(e) => Err(AppError::Database(format!("Failed to create profile: {}", e))),
        }
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PROFILES)
            .document_id(profile.id.to_string())
            .object(profile)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_profile(&self, id: u64) -> Result<bool, AppError> {
        if self.get_profile(id).await?.is_none() {
            return Ok(false);
        }

        self.get_client()?
            .fluent()
            .delete()
            .from(collections::PROFILES)
            .document_id(id.to_string())
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::debug!(profile_id = id, "Deleted profile");
        Ok(true)
    }
}
