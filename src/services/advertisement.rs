// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! BLE advertisements and the HCI LE advertising report parser.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const HCI_EVENT_PACKET: u8 = 0x04;
const EVT_LE_META: u8 = 0x3E;
const SUBEVT_ADVERTISING_REPORT: u8 = 0x02;
/// Offset of the first report's advertising data length.
const ADV_LEN_OFFSET: usize = 13;
const ADDRESS_OFFSET: usize = 7;

const AD_COMPLETE_LOCAL_NAME: u8 = 0x09;
const AD_MANUFACTURER_DATA: u8 = 0xFF;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AdvertisementError {
    #[error("Not an LE advertising report")]
    NotAdvertisingReport,

    #[error("Advertising report truncated: {0} bytes")]
    Truncated(usize),

    #[error("Invalid hex: {0}")]
    InvalidHex(String),
}

/// One advertisement as seen by the BLE source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advertisement {
    pub device_name: Option<String>,
    pub device_id: String,
    pub manufacturer_id: u16,
    pub manufacturer_data: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl Advertisement {
    /// Payload as the decoder expects it.
    ///
    /// The scale carries the raw weight in the company id field, so the id
    /// goes in front, big-endian, followed by the manufacturer data.
    pub fn scale_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(2 + self.manufacturer_data.len());
        payload.extend_from_slice(&self.manufacturer_id.to_be_bytes());
        payload.extend_from_slice(&self.manufacturer_data);
        payload
    }
}

/// Which advertisements belong to the scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementFilter {
    pub name: String,
    /// `None` accepts any company id.
    pub manufacturer_id: Option<u16>,
}

impl AdvertisementFilter {
    pub fn accepts(&self, adv: &Advertisement) -> bool {
        adv.device_name.as_deref() == Some(self.name.as_str())
            && self.manufacturer_id.is_none_or(|id| id == adv.manufacturer_id)
    }
}

/// Fields pulled out of one HCI LE advertising report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisingReport {
    /// Advertiser address, most significant byte first.
    pub address: String,
    pub local_name: Option<String>,
    pub manufacturer: Option<(u16, Vec<u8>)>,
}

impl AdvertisingReport {
    /// Convert to an advertisement; reports without manufacturer data carry
    /// nothing for the scale pipeline.
    pub fn into_advertisement(self, received_at: DateTime<Utc>) -> Option<Advertisement> {
        let (manufacturer_id, manufacturer_data) = self.manufacturer?;
        Some(Advertisement {
            device_name: self.local_name,
            device_id: self.address,
            manufacturer_id,
            manufacturer_data,
            received_at,
        })
    }
}

/// Parse a raw HCI event carrying an LE advertising report.
///
/// Only the first report of the event is read. Malformed AD structures end
/// the walk; whatever was found before them is kept.
pub fn parse_advertising_report(data: &[u8]) -> Result<AdvertisingReport, AdvertisementError> {
    if data.len() < 4 || data[0] != HCI_EVENT_PACKET || data[1] != EVT_LE_META {
        return Err(AdvertisementError::NotAdvertisingReport);
    }
    if data[3] != SUBEVT_ADVERTISING_REPORT {
        return Err(AdvertisementError::NotAdvertisingReport);
    }
    if data.len() <= ADV_LEN_OFFSET {
        return Err(AdvertisementError::Truncated(data.len()));
    }

    let address = data[ADDRESS_OFFSET..ADDRESS_OFFSET + 6]
        .iter()
        .rev()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":");

    let adv_len = data[ADV_LEN_OFFSET] as usize;
    let start = ADV_LEN_OFFSET + 1;
    let end = (start + adv_len).min(data.len());
    let adv_data = &data[start..end];

    let mut report = AdvertisingReport {
        address,
        ..Default::default()
    };

    let mut i = 0;
    while i + 1 < adv_data.len() {
        let length = adv_data[i] as usize;
        if length == 0 || i + length >= adv_data.len() {
            break;
        }
        let ad_type = adv_data[i + 1];
        let value = &adv_data[i + 2..i + 1 + length];

        match ad_type {
            AD_COMPLETE_LOCAL_NAME => {
                if let Ok(name) = std::str::from_utf8(value) {
                    report.local_name = Some(name.to_string());
                }
            }
            AD_MANUFACTURER_DATA if value.len() >= 2 => {
                let company_id = u16::from_le_bytes([value[0], value[1]]);
                report.manufacturer = Some((company_id, value[2..].to_vec()));
            }
            _ => {}
        }

        i += 1 + length;
    }

    Ok(report)
}

/// Parse a hex-encoded HCI report, as submitted through the API.
pub fn parse_advertising_report_hex(
    hex_str: &str,
) -> Result<AdvertisingReport, AdvertisementError> {
    let cleaned: String = hex_str
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let data = hex::decode(&cleaned).map_err(|e| AdvertisementError::InvalidHex(e.to_string()))?;
    parse_advertising_report(&data)
}
