// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scale frame decoding.
//!
//! Frame layout (big-endian):
//!
//! | Bytes  | Field                                    |
//! |--------|------------------------------------------|
//! | 0..2   | weight, divide by 600 for kg             |
//! | 2      | packet type                              |
//! | 3      | flags, `0x40` = reading locked           |
//! | 4..6   | impedance, divide by 10 for ohms; 0 = none |
//! | 6..8   | scale user slot                          |
//! | 8      | status, `0x21` = measurement complete    |
//! | 9..14  | scale MAC tail                           |
//!
//! Bytes 0..2 travel as the BLE company id of the advertisement.

use crate::models::DecodedReading;

/// Shortest frame that carries every decoded field.
pub const MIN_FRAME_LEN: usize = 9;
/// Full frame length as broadcast by the scale.
pub const FRAME_LEN: usize = 14;

pub const WEIGHT_DIVISOR: f64 = 600.0;
pub const IMPEDANCE_DIVISOR: f64 = 10.0;
pub const FLAG_LOCKED: u8 = 0x40;
pub const STATUS_COMPLETE: u8 = 0x21;
/// Status byte seen on frames that are stable but still lack impedance.
pub const STATUS_WEIGHT_ONLY: u8 = 0x20;

/// Decode a scale frame.
pub fn decode_packet(payload: &[u8]) -> Result<DecodedReading, DecodeError> {
    if payload.len() < MIN_FRAME_LEN {
        return Err(DecodeError::MalformedPacket { len: payload.len() });
    }

    let weight_raw = u16::from_be_bytes([payload[0], payload[1]]);
    let impedance_raw = u16::from_be_bytes([payload[4], payload[5]]);
    let user_id = u16::from_be_bytes([payload[6], payload[7]]);

    Ok(DecodedReading {
        weight_kg: f64::from(weight_raw) / WEIGHT_DIVISOR,
        impedance_raw,
        impedance_ohm: (impedance_raw > 0).then(|| f64::from(impedance_raw) / IMPEDANCE_DIVISOR),
        status_complete: payload[8] == STATUS_COMPLETE,
        locked: payload[3] == FLAG_LOCKED,
        user_id,
    })
}

/// Errors from frame decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed packet: {len} bytes, need at least {MIN_FRAME_LEN}")]
    MalformedPacket { len: usize },
}

/// Builder for synthetic frames with the scale's layout.
#[derive(Debug, Clone)]
pub struct ScaleFrame {
    pub weight_raw: u16,
    pub packet_type: u8,
    pub flags: u8,
    pub impedance_raw: u16,
    pub user_id: u16,
    pub status: u8,
    pub mac_tail: [u8; 5],
}

impl Default for ScaleFrame {
    fn default() -> Self {
        Self {
            weight_raw: 0,
            packet_type: 0x01,
            flags: 0x00,
            impedance_raw: 0,
            user_id: 0,
            status: 0x00,
            mac_tail: [0; 5],
        }
    }
}

impl ScaleFrame {
    /// Frame carrying `weight_kg`, rounded to the scale's resolution.
    pub fn weight(weight_kg: f64) -> Self {
        Self {
            weight_raw: (weight_kg * WEIGHT_DIVISOR).round() as u16,
            ..Self::default()
        }
    }

    /// Set impedance in ohms (0 means not measured).
    pub fn impedance(mut self, ohms: f64) -> Self {
        self.impedance_raw = (ohms * IMPEDANCE_DIVISOR).round() as u16;
        self
    }

    /// Mark the frame locked and complete, as sent at the end of a weigh-in.
    pub fn complete(mut self) -> Self {
        self.flags = FLAG_LOCKED;
        self.status = STATUS_COMPLETE;
        self
    }

    pub fn user(mut self, user_id: u16) -> Self {
        self.user_id = user_id;
        self
    }

    /// BLE company id the frame is advertised under.
    pub fn company_id(&self) -> u16 {
        self.weight_raw
    }

    /// Manufacturer data following the company id.
    pub fn manufacturer_data(&self) -> Vec<u8> {
        self.to_bytes()[2..].to_vec()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAME_LEN);
        out.extend_from_slice(&self.weight_raw.to_be_bytes());
        out.push(self.packet_type);
        out.push(self.flags);
        out.extend_from_slice(&self.impedance_raw.to_be_bytes());
        out.extend_from_slice(&self.user_id.to_be_bytes());
        out.push(self.status);
        out.extend_from_slice(&self.mac_tail);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Captured from a real weigh-in: 71.1 kg, 512.3 ohm, complete.
    const CAPTURED: [u8; 14] = [
        0xa6, 0xa8, 0x01, 0x40, 0x14, 0x03, 0x00, 0x01, 0x21, 0xc8, 0x47, 0x8c, 0x12, 0x34,
    ];

    #[test]
    fn test_decode_captured_frame() {
        let reading = decode_packet(&CAPTURED).unwrap();
        assert!((reading.weight_kg - 42664.0 / 600.0).abs() < 1e-9);
        assert_eq!(reading.impedance_raw, 5123);
        assert_eq!(reading.impedance_ohm, Some(512.3));
        assert_eq!(reading.user_id, 1);
        assert!(reading.locked);
        assert!(reading.status_complete);
    }

    #[test]
    fn test_zero_impedance_is_absent() {
        let frame = ScaleFrame::weight(80.0).to_bytes();
        let reading = decode_packet(&frame).unwrap();
        assert_eq!(reading.impedance_raw, 0);
        assert_eq!(reading.impedance_ohm, None);
        assert!(!reading.status_complete);
        assert!(!reading.locked);
    }

    #[test]
    fn test_short_payload_is_malformed() {
        assert_eq!(
            decode_packet(&CAPTURED[..8]),
            Err(DecodeError::MalformedPacket { len: 8 })
        );
        assert_eq!(
            decode_packet(&[]),
            Err(DecodeError::MalformedPacket { len: 0 })
        );
        assert!(decode_packet(&CAPTURED[..MIN_FRAME_LEN]).is_ok());
    }

    #[test]
    fn test_weight_only_status_is_not_complete() {
        let mut frame = ScaleFrame::weight(70.0).complete();
        frame.status = STATUS_WEIGHT_ONLY;
        let reading = decode_packet(&frame.to_bytes()).unwrap();
        assert!(reading.locked);
        assert!(!reading.status_complete);
    }

    #[test]
    fn test_synthetic_frame_decodes_to_inputs() {
        let frame = ScaleFrame::weight(80.0).impedance(500.0).user(3).complete();
        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), FRAME_LEN);

        let reading = decode_packet(&bytes).unwrap();
        assert!((reading.weight_kg - 80.0).abs() < 1.0 / WEIGHT_DIVISOR);
        assert_eq!(reading.impedance_ohm, Some(500.0));
        assert_eq!(reading.user_id, 3);
        assert!(reading.status_complete);
    }

    #[test]
    fn test_decode_is_total_over_byte_values() {
        for b in 0..=u8::MAX {
            let payload = [b; FRAME_LEN];
            let first = decode_packet(&payload).unwrap();
            let second = decode_packet(&payload).unwrap();
            assert_eq!(first, second);
            assert!(first.weight_kg.is_finite());
            assert_eq!(first.locked, b == FLAG_LOCKED);
            assert_eq!(first.status_complete, b == STATUS_COMPLETE);
        }
    }

    #[test]
    fn test_company_id_and_data_reassemble_frame() {
        let frame = ScaleFrame::weight(71.1).impedance(480.0).complete();
        let mut joined = frame.company_id().to_be_bytes().to_vec();
        joined.extend(frame.manufacturer_data());
        assert_eq!(joined, frame.to_bytes());
    }
}
