//! Domain models for the csv2bufr pipeline.
//!
//! - [`Scalar`] - a typed value destined for one ecCodes key
//! - [`ElementValue`] - a scalar or the explicit missing marker
//! - [`ResolvedElement`] - one `(key, value)` pair of the output sequence
//! - [`ReplicationFactors`] - the three delayed replication arrays
//! - [`MappedRecord`] - everything the encoder needs for one row
//! - [`OutputRecord`] - one encoded row with its identifying metadata

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Scalar values
// =============================================================================

/// A typed value for an ecCodes key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    /// Used for array keys such as `unexpandedDescriptors`.
    Array(Vec<Scalar>),
}

impl Scalar {
    /// Type a template literal: integer, then float, otherwise text.
    ///
    /// Digit strings with a leading zero (`06700`) are identifiers and stay text.
    pub fn from_literal(literal: &str) -> Self {
        if has_leading_zero(literal.trim()) {
            return Scalar::Text(literal.to_string());
        }
        parse_number(literal).unwrap_or_else(|| Scalar::Text(literal.to_string()))
    }

    /// Turn numeric-looking text into a number; anything else is returned as is.
    ///
    /// Used for CSV cells, so zero-padded fields such as `07` become `7`.
    pub fn coerce_numeric(self) -> Self {
        match self {
            Scalar::Text(s) => parse_number(&s).unwrap_or(Scalar::Text(s)),
            other => other,
        }
    }

    /// Numeric view used by QC and scaling.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Integer(i) => Some(*i),
            Scalar::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_f64().is_some()
    }
}

fn parse_number(text: &str) -> Option<Scalar> {
    let trimmed = text.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Scalar::Integer(i));
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(Scalar::Float(f)),
        _ => None,
    }
}

fn has_leading_zero(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    let mut chars = digits.chars();
    matches!((chars.next(), chars.next()), (Some('0'), Some(c)) if c.is_ascii_digit())
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Text(s) => write!(f, "{}", s),
            Scalar::Array(items) => {
                let parts: Vec<String> = items.iter().map(|s| s.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// A resolved value or the explicit missing marker.
///
/// Serializes to `null` when missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementValue {
    Present(Scalar),
    Missing,
}

impl ElementValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, ElementValue::Missing)
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            ElementValue::Present(s) => Some(s),
            ElementValue::Missing => None,
        }
    }

    pub fn into_scalar(self) -> Option<Scalar> {
        match self {
            ElementValue::Present(s) => Some(s),
            ElementValue::Missing => None,
        }
    }
}

impl From<Scalar> for ElementValue {
    fn from(s: Scalar) -> Self {
        ElementValue::Present(s)
    }
}

impl fmt::Display for ElementValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementValue::Present(s) => s.fmt(f),
            ElementValue::Missing => write!(f, "MISSING"),
        }
    }
}

// =============================================================================
// Mapped output
// =============================================================================

/// One entry of the ordered key/value sequence handed to the encoder.
///
/// `key` is passed through verbatim, including any `#N#` repetition prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedElement {
    pub key: String,
    pub value: ElementValue,
}

impl ResolvedElement {
    pub fn new(key: impl Into<String>, value: ElementValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    pub fn missing(key: impl Into<String>) -> Self {
        Self::new(key, ElementValue::Missing)
    }
}

/// Delayed replication factors, global to the message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationFactors {
    /// `inputDelayedDescriptorReplicationFactor`
    #[serde(default)]
    pub delayed: Vec<i64>,
    /// `inputShortDelayedDescriptorReplicationFactor`
    #[serde(default)]
    pub short_delayed: Vec<i64>,
    /// `inputExtendedDelayedDescriptorReplicationFactor`
    #[serde(default)]
    pub extended_delayed: Vec<i64>,
}

impl ReplicationFactors {
    /// The ecCodes keys paired with their arrays, in the order they must be set.
    pub fn keyed(&self) -> [(&'static str, &[i64]); 3] {
        [
            ("inputShortDelayedDescriptorReplicationFactor", self.short_delayed.as_slice()),
            ("inputDelayedDescriptorReplicationFactor", self.delayed.as_slice()),
            ("inputExtendedDelayedDescriptorReplicationFactor", self.extended_delayed.as_slice()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.delayed.is_empty() && self.short_delayed.is_empty() && self.extended_delayed.is_empty()
    }
}

/// The template applied to one row, ready for the encoder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedRecord {
    pub header: Vec<ResolvedElement>,
    pub data: Vec<ResolvedElement>,
    pub replication: ReplicationFactors,
    /// WIGOS station identifier resolved from the template, if configured.
    pub wigos_station_identifier: Option<String>,
}

impl MappedRecord {
    /// Header then data, in template order.
    pub fn elements(&self) -> impl Iterator<Item = &ResolvedElement> {
        self.header.iter().chain(self.data.iter())
    }
}

// =============================================================================
// Encoded output
// =============================================================================

/// Station location read back from the encoded message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub latitude: f64,
    pub longitude: f64,
}

/// Identifying metadata for one encoded message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// `WIGOS_<wsi>_<timestamp>` when both are known, otherwise the checksum.
    pub id: String,
    pub wigos_station_identifier: Option<String>,
    pub phenomenon_date: Option<NaiveDateTime>,
    pub originating_centre: Option<i64>,
    pub data_category: Option<i64>,
    pub geometry: Option<Geometry>,
}

/// One row converted to BUFR.
#[derive(Debug, Clone, Serialize)]
pub struct OutputRecord {
    /// Zero-based data row index.
    pub row_index: usize,
    pub header: Vec<ResolvedElement>,
    pub data: Vec<ResolvedElement>,
    pub replication: ReplicationFactors,
    /// The encoded BUFR edition 4 message.
    #[serde(skip)]
    pub bufr4: Vec<u8>,
    /// Hex SHA-256 of `bufr4`.
    pub checksum: String,
    pub meta: RecordMeta,
}
