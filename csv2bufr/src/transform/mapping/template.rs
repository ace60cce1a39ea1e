//! Mapping template definition and loading.
//!
//! A template describes, per BUFR element, where the value comes from and
//! how it is checked and scaled. Value sources are prefixed strings parsed
//! once at load time:
//!
//! | Prefix      | Meaning                                   | Example                    |
//! |-------------|-------------------------------------------|----------------------------|
//! | `const:`    | literal, typed as integer, float or text  | `const:4`                  |
//! | `array:`    | comma separated literal array             | `array:301150, 307096`     |
//! | `data:`     | CSV column of the current row             | `data:air_temperature`     |
//! | `metadata:` | JSONPath into the station metadata        | `metadata:$.wsi_series`    |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

use crate::error::{CsvError, TemplateError, TemplateResult};
use crate::models::{ReplicationFactors, Scalar};
use crate::parser::CsvLayout;
use crate::validation::validate_mapping;

// =============================================================================
// Value sources
// =============================================================================

/// Where an element's value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    /// Literal from the template (`const:` and `array:`).
    Constant(Scalar),
    /// Column of the current CSV row (`data:`).
    CsvColumn(String),
    /// JSONPath into the station metadata (`metadata:`), always rooted at `$`.
    MetadataPath(String),
}

impl ValueSource {
    /// Parse a prefixed source string. On failure returns the reason.
    pub fn parse(text: &str) -> Result<Self, String> {
        let (prefix, rest) = text
            .split_once(':')
            .ok_or_else(|| "missing 'const:', 'array:', 'data:' or 'metadata:' prefix".to_string())?;

        match prefix {
            "const" => Ok(ValueSource::Constant(Scalar::from_literal(rest))),
            "array" => {
                let items: Vec<Scalar> = rest
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Scalar::from_literal)
                    .collect();
                if items.is_empty() {
                    return Err("array has no items".to_string());
                }
                Ok(ValueSource::Constant(Scalar::Array(items)))
            }
            "data" => {
                let column = rest.trim();
                if column.is_empty() {
                    return Err("empty column name".to_string());
                }
                Ok(ValueSource::CsvColumn(column.to_string()))
            }
            "metadata" => {
                let path = normalize_path(rest.trim());
                if path == "$" {
                    return Err("empty metadata path".to_string());
                }
                jsonpath_lib::select(&Value::Null, &path).map_err(|e| format!("invalid JSONPath: {:?}", e))?;
                Ok(ValueSource::MetadataPath(path))
            }
            other => Err(format!("unknown prefix '{}'", other)),
        }
    }

    /// A literal JSON number, accepted for bounds, scale and offset.
    pub fn from_number(number: &serde_json::Number) -> Self {
        let scalar = match number.as_i64() {
            Some(i) => Scalar::Integer(i),
            None => Scalar::Float(number.as_f64().unwrap_or(f64::NAN)),
        };
        ValueSource::Constant(scalar)
    }

    /// Column name if this source reads from the CSV row.
    pub fn column(&self) -> Option<&str> {
        match self {
            ValueSource::CsvColumn(c) => Some(c),
            _ => None,
        }
    }
}

/// Paths without a leading `$` are relative to the document root.
fn normalize_path(path: &str) -> String {
    if path.starts_with('$') {
        path.to_string()
    } else if path.is_empty() {
        "$".to_string()
    } else {
        format!("$.{}", path)
    }
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSource::Constant(Scalar::Array(items)) => {
                let parts: Vec<String> = items.iter().map(|s| s.to_string()).collect();
                write!(f, "array:{}", parts.join(", "))
            }
            ValueSource::Constant(s) => write!(f, "const:{}", s),
            ValueSource::CsvColumn(c) => write!(f, "data:{}", c),
            ValueSource::MetadataPath(p) => write!(f, "metadata:{}", p),
        }
    }
}

// =============================================================================
// Element and template
// =============================================================================

/// Mapping for one ecCodes key.
#[derive(Debug, Clone, PartialEq)]
pub struct BufrElementSpec {
    /// Passed to the encoder verbatim, including any `#N#` prefix.
    pub eccodes_key: String,
    pub value: ValueSource,
    pub valid_min: Option<ValueSource>,
    pub valid_max: Option<ValueSource>,
    /// `(scale, offset)`, both or neither.
    pub scale_offset: Option<(ValueSource, ValueSource)>,
}

impl BufrElementSpec {
    /// An element with only a value source.
    pub fn new(eccodes_key: impl Into<String>, value: ValueSource) -> Self {
        Self {
            eccodes_key: eccodes_key.into(),
            value,
            valid_min: None,
            valid_max: None,
            scale_offset: None,
        }
    }
}

/// A validated mapping template. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingTemplate {
    pub header: Vec<BufrElementSpec>,
    pub data: Vec<BufrElementSpec>,
    pub replication: ReplicationFactors,
    /// Rows before the first data row, including the names row.
    pub number_header_rows: usize,
    /// 1-based row holding the column names.
    pub names_on_row: usize,
    pub wigos_station_identifier: Option<ValueSource>,
}

// Wire format, checked against the schema before deserializing.

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum RawNumeric {
    Number(serde_json::Number),
    Source(String),
}

#[derive(Debug, Deserialize)]
struct RawElement {
    eccodes_key: String,
    value: String,
    #[serde(default)]
    valid_min: Option<RawNumeric>,
    #[serde(default)]
    valid_max: Option<RawNumeric>,
    #[serde(default)]
    scale: Option<RawNumeric>,
    #[serde(default)]
    offset: Option<RawNumeric>,
}

fn default_one() -> usize {
    1
}

#[derive(Debug, Deserialize)]
struct RawTemplate {
    #[serde(rename = "inputDelayedDescriptorReplicationFactor", default)]
    delayed: Vec<i64>,
    #[serde(rename = "inputShortDelayedDescriptorReplicationFactor", default)]
    short_delayed: Vec<i64>,
    #[serde(rename = "inputExtendedDelayedDescriptorReplicationFactor", default)]
    extended_delayed: Vec<i64>,
    #[serde(default = "default_one")]
    number_header_rows: usize,
    #[serde(alias = "column_names_row", default = "default_one")]
    names_on_row: usize,
    #[serde(default)]
    wigos_station_identifier: Option<String>,
    header: Vec<RawElement>,
    data: Vec<RawElement>,
}

impl MappingTemplate {
    /// Load a template from parsed JSON.
    ///
    /// Runs the schema check first, then converts every source string into a
    /// typed [`ValueSource`]. Any failure aborts the load.
    pub fn load(raw: &Value) -> TemplateResult<Self> {
        validate_mapping(raw).map_err(|violations| TemplateError::SchemaValidation { violations })?;
        let parsed: RawTemplate = serde_json::from_value(raw.clone())?;
        Self::from_raw(parsed)
    }

    /// Load a template from a JSON string.
    pub fn from_json_str(json: &str) -> TemplateResult<Self> {
        let raw: Value = serde_json::from_str(json)?;
        Self::load(&raw)
    }

    /// Load a template from a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> TemplateResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    fn from_raw(raw: RawTemplate) -> TemplateResult<Self> {
        CsvLayout::new(raw.number_header_rows, raw.names_on_row)
            .check()
            .map_err(|e| match e {
                CsvError::InvalidLayout(reason) => TemplateError::InvalidLayout(reason),
                other => TemplateError::InvalidLayout(other.to_string()),
            })?;

        let header = raw.header.into_iter().map(convert_element).collect::<TemplateResult<Vec<_>>>()?;
        let data = raw.data.into_iter().map(convert_element).collect::<TemplateResult<Vec<_>>>()?;

        let wigos_station_identifier = raw
            .wigos_station_identifier
            .map(|text| parse_source("wigos_station_identifier", &text))
            .transpose()?;

        Ok(Self {
            header,
            data,
            replication: ReplicationFactors {
                delayed: raw.delayed,
                short_delayed: raw.short_delayed,
                extended_delayed: raw.extended_delayed,
            },
            number_header_rows: raw.number_header_rows,
            names_on_row: raw.names_on_row,
            wigos_station_identifier,
        })
    }

    /// CSV layout implied by the header settings.
    pub fn layout(&self) -> CsvLayout {
        CsvLayout::new(self.number_header_rows, self.names_on_row)
    }

    /// Header then data elements, in declaration order.
    pub fn elements(&self) -> impl Iterator<Item = &BufrElementSpec> {
        self.header.iter().chain(self.data.iter())
    }

    /// Every CSV column referenced anywhere in the template, deduplicated.
    pub fn source_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .elements()
            .flat_map(|e| {
                let scale_offset = e.scale_offset.as_ref().map(|(s, o)| [s, o]);
                std::iter::once(&e.value)
                    .chain(e.valid_min.as_ref())
                    .chain(e.valid_max.as_ref())
                    .chain(scale_offset.into_iter().flatten())
                    .filter_map(|s| s.column().map(str::to_string))
                    .collect::<Vec<_>>()
            })
            .chain(
                self.wigos_station_identifier
                    .as_ref()
                    .and_then(|s| s.column().map(str::to_string)),
            )
            .collect();

        columns.sort();
        columns.dedup();
        columns
    }

    /// Check that every referenced column exists in the CSV headers.
    ///
    /// Returns the missing column names.
    pub fn validate_headers(&self, headers: &[String]) -> Result<(), Vec<String>> {
        let missing: Vec<String> = self
            .source_columns()
            .into_iter()
            .filter(|col| !headers.iter().any(|h| h == col))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }
}

fn parse_source(key: &str, text: &str) -> TemplateResult<ValueSource> {
    ValueSource::parse(text).map_err(|reason| TemplateError::InvalidValueSource {
        key: key.to_string(),
        source_text: text.to_string(),
        reason,
    })
}

/// Numeric slots accept bare numbers. A constant there must be numeric.
fn parse_numeric(key: &str, raw: RawNumeric) -> TemplateResult<ValueSource> {
    match raw {
        RawNumeric::Number(n) => Ok(ValueSource::from_number(&n)),
        RawNumeric::Source(text) => {
            let source = parse_source(key, &text)?;
            match &source {
                ValueSource::Constant(s) if !s.is_numeric() => Err(TemplateError::InvalidValueSource {
                    key: key.to_string(),
                    source_text: text,
                    reason: "constant must be numeric".to_string(),
                }),
                _ => Ok(source),
            }
        }
    }
}

fn convert_element(raw: RawElement) -> TemplateResult<BufrElementSpec> {
    let key = raw.eccodes_key;
    let value = parse_source(&key, &raw.value)?;
    let valid_min = raw.valid_min.map(|r| parse_numeric(&key, r)).transpose()?;
    let valid_max = raw.valid_max.map(|r| parse_numeric(&key, r)).transpose()?;

    let scale_offset = match (raw.scale, raw.offset) {
        (Some(scale), Some(offset)) => Some((parse_numeric(&key, scale)?, parse_numeric(&key, offset)?)),
        (None, None) => None,
        _ => return Err(TemplateError::UnpairedScaleOffset { key }),
    };

    Ok(BufrElementSpec {
        eccodes_key: key,
        value,
        valid_min,
        valid_max,
        scale_offset,
    })
}
