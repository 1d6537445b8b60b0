// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Debounce and completion tracking for scale advertisements.
//!
//! A weigh-in produces dozens of advertisements per second. Only the final
//! complete frame is a valid reading, and a cooldown after it suppresses
//! residual broadcasts and step-off/step-on retriggers.
//!
//! State is kept per device:
//!
//! ```text
//! Idle ──incomplete──▶ AwaitingCompletion ──complete──▶ Cooldown ──elapsed──▶ Idle
//!   └────────────────────────complete────────────────────▲
//! ```
//!
//! Time always comes from the packet's `received_at`, so replaying stored
//! packets through a fresh tracker yields the same events as the live run.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::models::{DecodedReading, RawPacket};

/// Default cooldown after a confirmed measurement.
pub const DEFAULT_COOLDOWN_SECONDS: i64 = 30;

/// Tracker state for a single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    AwaitingCompletion,
    Cooldown { until: DateTime<Utc> },
}

/// A reading judged to be a completed, stable weigh-in.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedMeasurement {
    /// Raw packet that carried the confirming frame
    pub packet_id: String,
    pub device_id: String,
    pub received_at: DateTime<Utc>,
    pub reading: DecodedReading,
}

/// Per-device debounce state machine.
///
/// Each observation takes the map entry for its device, so two frames for
/// the same device never mutate state concurrently while different devices
/// proceed independently.
#[derive(Debug)]
pub struct DebounceTracker {
    cooldown: Duration,
    devices: DashMap<String, TrackerState>,
    /// Newest `received_at` observed, as Unix millis
    newest_millis: AtomicI64,
}

impl Default for DebounceTracker {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_COOLDOWN_SECONDS))
    }
}

impl DebounceTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            devices: DashMap::new(),
            newest_millis: AtomicI64::new(i64::MIN),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Feed one decoded frame. Returns the confirmed event, if this frame is one.
    pub fn observe(
        &self,
        packet: &RawPacket,
        reading: DecodedReading,
    ) -> Option<ConfirmedMeasurement> {
        let at = packet.received_at;
        self.newest_millis.fetch_max(at.timestamp_millis(), Ordering::Relaxed);

        let mut state = self
            .devices
            .entry(packet.device_id.clone())
            .or_insert(TrackerState::Idle);

        if let TrackerState::Cooldown { until } = *state {
            if at < until {
                return None;
            }
            *state = TrackerState::Idle;
        }

        if !reading.status_complete {
            *state = TrackerState::AwaitingCompletion;
            return None;
        }

        *state = TrackerState::Cooldown {
            until: at + self.cooldown,
        };
        drop(state);

        tracing::debug!(
            device_id = %packet.device_id,
            packet_id = %packet.id,
            weight_kg = reading.weight_kg,
            "Measurement confirmed"
        );

        Some(ConfirmedMeasurement {
            packet_id: packet.id.clone(),
            device_id: packet.device_id.clone(),
            received_at: at,
            reading,
        })
    }

    /// Current state of a device (`Idle` if never seen).
    pub fn state(&self, device_id: &str) -> TrackerState {
        self.devices
            .get(device_id)
            .map(|s| *s)
            .unwrap_or(TrackerState::Idle)
    }

    /// Put a device into the cooldown that follows a weigh-in confirmed at
    /// `confirmed_at`, unless it already holds a later one.
    ///
    /// Used to resume a replay part-way through the packet history.
    pub fn resume_cooldown(&self, device_id: &str, confirmed_at: DateTime<Utc>) {
        let until = confirmed_at + self.cooldown;
        self.devices
            .entry(device_id.to_string())
            .and_modify(|state| match state {
                TrackerState::Cooldown { until: current } if *current >= until => {}
                _ => *state = TrackerState::Cooldown { until },
            })
            .or_insert(TrackerState::Cooldown { until });
    }

    /// Newest packet time observed so far.
    pub fn newest_seen(&self) -> Option<DateTime<Utc>> {
        match self.newest_millis.load(Ordering::Relaxed) {
            i64::MIN => None,
            millis => DateTime::from_timestamp_millis(millis),
        }
    }

    /// Drop devices whose cooldown ended before the newest packet seen.
    ///
    /// Cooldowns are in packet time, so the wall clock plays no part here.
    /// Returns the number of entries removed.
    pub fn evict_expired(&self) -> usize {
        let Some(now) = self.newest_seen() else {
            return 0;
        };
        let before = self.devices.len();
        self.devices
            .retain(|_, state| !matches!(state, TrackerState::Cooldown { until } if *until <= now));
        before - self.devices.len()
    }
}
