//! REST API request and response types.
//!
//! Messages are returned base64 encoded so a whole run fits in one JSON body.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::RowError;
use crate::models::{OutputRecord, RecordMeta};
use crate::registry::TemplateEntry;
use crate::transform::TransformSummary;

/// Body of `POST /api/transform`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransformRequest {
    /// CSV text, header rows included.
    pub data: String,

    /// Inline mapping template object, or the name of a registered template.
    pub mapping: Value,

    /// Station metadata used by `metadata:` value sources.
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

fn empty_object() -> Value {
    json!({})
}

/// How the request names its template.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingRef<'a> {
    Named(&'a str),
    Inline(&'a Value),
}

impl TransformRequest {
    pub fn mapping_ref(&self) -> Option<MappingRef<'_>> {
        match &self.mapping {
            Value::String(name) => Some(MappingRef::Named(name)),
            Value::Object(_) => Some(MappingRef::Inline(&self.mapping)),
            _ => None,
        }
    }
}

/// Response of `POST /api/transform`.
#[derive(Debug, Clone, Serialize)]
pub struct TransformResponse {
    pub messages: Vec<MessagePayload>,
    pub errors: Vec<RowFailure>,
    pub summary: TransformSummary,
}

/// One encoded BUFR message.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePayload {
    pub id: String,
    pub checksum: String,
    /// Base64 (standard alphabet, padded).
    pub bufr4: String,
    pub meta: RecordMeta,
}

impl From<OutputRecord> for MessagePayload {
    fn from(record: OutputRecord) -> Self {
        Self {
            id: record.meta.id.clone(),
            checksum: record.checksum,
            bufr4: base64::engine::general_purpose::STANDARD.encode(&record.bufr4),
            meta: record.meta,
        }
    }
}

/// A row that could not be converted.
#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    pub row: usize,
    pub message: String,
}

impl From<&RowError> for RowFailure {
    fn from(error: &RowError) -> Self {
        Self {
            row: error.row,
            message: error.kind.to_string(),
        }
    }
}

/// Response of `GET /api/templates`.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateListResponse {
    pub templates: Vec<TemplateEntry>,
}

/// Create an error response body.
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
        "messages": [],
        "errors": [],
    })
}
