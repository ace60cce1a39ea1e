//! Value resolution against one row.

use serde_json::Value;

use super::template::ValueSource;
use crate::error::{ResolveError, ResolveResult};
use crate::models::{ElementValue, Scalar};
use crate::parser::CsvRow;

/// Everything a value source can read from while one row is processed.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub row: &'a CsvRow,
    pub metadata: &'a Value,
    pub row_index: usize,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(row: &'a CsvRow, metadata: &'a Value) -> Self {
        Self {
            row,
            metadata,
            row_index: row.index,
        }
    }
}

/// Resolve a source to a value or the missing marker.
///
/// CSV cells come back as text; numeric coercion is left to the caller.
pub fn resolve(source: &ValueSource, ctx: &ExecutionContext<'_>) -> ResolveResult<ElementValue> {
    match source {
        ValueSource::Constant(value) => Ok(ElementValue::Present(value.clone())),
        ValueSource::CsvColumn(column) => match ctx.row.get(column) {
            None => Err(ResolveError::MissingColumn { column: column.clone() }),
            Some(None) => Ok(ElementValue::Missing),
            Some(Some(text)) => Ok(ElementValue::Present(Scalar::Text(text.to_string()))),
        },
        ValueSource::MetadataPath(path) => resolve_metadata(path, ctx.metadata),
    }
}

fn resolve_metadata(path: &str, metadata: &Value) -> ResolveResult<ElementValue> {
    let matches = jsonpath_lib::select(metadata, path).map_err(|e| ResolveError::InvalidPath {
        path: path.to_string(),
        message: format!("{:?}", e),
    })?;

    match matches.as_slice() {
        [value] => match value {
            Value::Null => Ok(ElementValue::Missing),
            other => json_to_scalar(path, other).map(ElementValue::Present),
        },
        _ => Err(ResolveError::MetadataResolution {
            path: path.to_string(),
            matches: matches.len(),
        }),
    }
}

fn json_to_scalar(path: &str, value: &Value) -> ResolveResult<Scalar> {
    match value {
        Value::Bool(b) => Ok(Scalar::Bool(*b)),
        Value::Number(n) => Ok(match n.as_i64() {
            Some(i) => Scalar::Integer(i),
            None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
        }),
        Value::String(s) => Ok(Scalar::Text(s.clone())),
        Value::Array(items) => items
            .iter()
            .map(|item| json_to_scalar(path, item))
            .collect::<ResolveResult<Vec<_>>>()
            .map(Scalar::Array),
        Value::Null | Value::Object(_) => Err(ResolveError::NotScalar { path: path.to_string() }),
    }
}
