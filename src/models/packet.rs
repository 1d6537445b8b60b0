// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Raw advertisement captures and their decoded form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::time_utils::{format_utc_millis, utc_millis};

/// Number of digest bytes kept in a packet id.
const PACKET_ID_BYTES: usize = 16;

/// Raw scale advertisement as received, stored in Firestore as an audit trail.
///
/// Never mutated after creation. The payload is the 14-byte scale frame
/// (company id bytes followed by the manufacturer data).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPacket {
    /// Content id (also used as document id)
    pub id: String,
    /// When the advertisement was received
    #[serde(with = "utc_millis")]
    pub received_at: DateTime<Utc>,
    /// BLE address or platform id of the advertising device
    pub device_id: String,
    /// Scale payload bytes (hex encoded in storage)
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
}

impl RawPacket {
    /// Capture a packet, deriving its id from the capture contents.
    pub fn new(received_at: DateTime<Utc>, device_id: impl Into<String>, payload: Vec<u8>) -> Self {
        let device_id = device_id.into();
        let id = packet_id(received_at, &device_id, &payload);
        Self {
            id,
            received_at,
            device_id,
            payload,
        }
    }
}

/// Deterministic id: truncated SHA-256 over timestamp, device and payload.
fn packet_id(received_at: DateTime<Utc>, device_id: &str, payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format_utc_millis(received_at).as_bytes());
    hasher.update(b"|");
    hasher.update(device_id.as_bytes());
    hasher.update(b"|");
    hasher.update(payload);
    hex::encode(&hasher.finalize()[..PACKET_ID_BYTES])
}

/// A reading decoded from one scale frame. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DecodedReading {
    pub weight_kg: f64,
    pub impedance_raw: u16,
    /// `None` while the scale has not measured impedance yet
    pub impedance_ohm: Option<f64>,
    pub status_complete: bool,
    pub locked: bool,
    /// User slot reported by the scale (unrelated to profile ids)
    pub user_id: u16,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        hex::decode(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, secs).unwrap()
    }

    #[test]
    fn test_packet_id_is_deterministic() {
        let a = RawPacket::new(at(0), "AA:BB", vec![1, 2, 3]);
        let b = RawPacket::new(at(0), "AA:BB", vec![1, 2, 3]);
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), PACKET_ID_BYTES * 2);
    }

    #[test]
    fn test_packet_id_changes_with_contents() {
        let base = RawPacket::new(at(0), "AA:BB", vec![1, 2, 3]);
        assert_ne!(base.id, RawPacket::new(at(1), "AA:BB", vec![1, 2, 3]).id);
        assert_ne!(base.id, RawPacket::new(at(0), "AA:BC", vec![1, 2, 3]).id);
        assert_ne!(base.id, RawPacket::new(at(0), "AA:BB", vec![1, 2, 4]).id);
    }

    #[test]
    fn test_payload_serializes_as_hex() {
        let packet = RawPacket::new(at(0), "AA:BB", vec![0xa6, 0xc0, 0x21]);
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["payload"], "a6c021");
        assert_eq!(json["received_at"], "2024-01-15T07:00:00.000Z");

        let back: RawPacket = serde_json::from_value(json).unwrap();
        assert_eq!(back, packet);
    }
}
