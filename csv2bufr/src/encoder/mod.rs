//! BUFR encoding boundary.
//!
//! The mapping engine never produces bits itself. It hands a [`MappedRecord`]
//! to a [`BufrEncoder`] and reads identifying keys back out of the message.
//! [`EccodesToolEncoder`] is the production implementation.

pub mod eccodes;

#[cfg(test)]
pub(crate) mod testing;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::error::EncodeResult;
use crate::models::{Geometry, MappedRecord};

pub use eccodes::{render_rules, EccodesToolEncoder};

/// Turns a mapped record into a BUFR edition 4 message.
pub trait BufrEncoder {
    /// Encode one record. Missing elements are left at their encoded missing value.
    fn encode(&self, record: &MappedRecord) -> EncodeResult<Vec<u8>>;

    /// Read identifying keys back out of an encoded message.
    fn identify(&self, message: &[u8]) -> EncodeResult<MessageIdentity>;
}

impl<T: BufrEncoder + ?Sized> BufrEncoder for &T {
    fn encode(&self, record: &MappedRecord) -> EncodeResult<Vec<u8>> {
        (**self).encode(record)
    }

    fn identify(&self, message: &[u8]) -> EncodeResult<MessageIdentity> {
        (**self).identify(message)
    }
}

impl<T: BufrEncoder + ?Sized> BufrEncoder for Box<T> {
    fn encode(&self, record: &MappedRecord) -> EncodeResult<Vec<u8>> {
        (**self).encode(record)
    }

    fn identify(&self, message: &[u8]) -> EncodeResult<MessageIdentity> {
        (**self).identify(message)
    }
}

/// Keys read back from a message, in the order they are requested.
pub const IDENTITY_KEYS: &[&str] = &[
    "dataCategory",
    "bufrHeaderCentre",
    "typicalYear",
    "typicalMonth",
    "typicalDay",
    "typicalHour",
    "typicalMinute",
    "typicalSecond",
    "#1#latitude",
    "#1#longitude",
    "#1#wigosIdentifierSeries",
    "#1#wigosIssuerOfIdentifier",
    "#1#wigosIssueNumber",
    "#1#wigosLocalIdentifierCharacter",
];

/// Identifying fields of an encoded message.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessageIdentity {
    pub data_category: Option<i64>,
    pub originating_centre: Option<i64>,
    pub phenomenon_date: Option<NaiveDateTime>,
    pub geometry: Option<Geometry>,
    pub wigos_station_identifier: Option<String>,
}

impl MessageIdentity {
    /// Build from `(key, text)` pairs as printed by the encoder.
    ///
    /// Unknown keys are ignored. `MISSING`, `undef`, empty text and ecCodes
    /// missing sentinels count as absent.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut found: Vec<(&str, &str)> = Vec::new();
        for (key, value) in pairs {
            let value = value.trim();
            if !is_absent(value) {
                found.push((key.trim(), value));
            }
        }
        let text = |key: &str| found.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);
        let int = |key: &str| text(key).and_then(parse_int);
        let float = |key: &str| text(key).and_then(|v| v.parse::<f64>().ok());

        let phenomenon_date = match (int("typicalYear"), int("typicalMonth"), int("typicalDay")) {
            (Some(y), Some(m), Some(d)) => {
                let date = NaiveDate::from_ymd_opt(y as i32, m as u32, d as u32);
                date.and_then(|date| {
                    date.and_hms_opt(
                        int("typicalHour").unwrap_or(0) as u32,
                        int("typicalMinute").unwrap_or(0) as u32,
                        int("typicalSecond").unwrap_or(0) as u32,
                    )
                })
            }
            _ => None,
        };

        let geometry = match (float("#1#latitude"), float("#1#longitude")) {
            (Some(latitude), Some(longitude)) => Some(Geometry { latitude, longitude }),
            _ => None,
        };

        let wigos_station_identifier = match (
            int("#1#wigosIdentifierSeries"),
            int("#1#wigosIssuerOfIdentifier"),
            int("#1#wigosIssueNumber"),
            text("#1#wigosLocalIdentifierCharacter"),
        ) {
            (Some(series), Some(issuer), Some(issue), Some(local)) => {
                Some(format!("{}-{}-{}-{}", series, issuer, issue, local))
            }
            _ => None,
        };

        Self {
            data_category: int("dataCategory"),
            originating_centre: int("bufrHeaderCentre"),
            phenomenon_date,
            geometry,
            wigos_station_identifier,
        }
    }
}

fn parse_int(text: &str) -> Option<i64> {
    text.parse::<i64>().ok().or_else(|| {
        text.parse::<f64>()
            .ok()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

/// ecCodes prints `MISSING` or a sentinel for absent values.
fn is_absent(text: &str) -> bool {
    if text.is_empty() || text.eq_ignore_ascii_case("missing") || text == "undef" {
        return true;
    }
    match text.parse::<f64>() {
        Ok(v) => v.abs() >= 1e99 || v.abs() == 2147483647.0,
        Err(_) => false,
    }
}
