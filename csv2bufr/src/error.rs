//! Error types for the csv2bufr conversion pipeline.
//!
//! Errors are layered by how far they propagate:
//!
//! - [`CsvError`] - CSV reading and header errors
//! - [`TemplateError`] - configuration errors, fatal before any row is processed
//! - [`ResolveError`] - value resolution errors, fatal for the current row only
//! - [`EncodeError`] - errors raised by the BUFR encoder, fatal for the current row only
//! - [`RowError`] - a row-level failure tagged with its row index
//! - [`RegistryError`] - stored template errors
//! - [`PipelineError`] - run-level orchestration errors
//!
//! QC rejections are not errors: out of range values become missing.

use thiserror::Error;

// =============================================================================
// CSV Errors
// =============================================================================

/// Errors while reading CSV input.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed CSV record.
    #[error("Invalid CSV format on line {line}: {message}")]
    ParseError { line: u64, message: String },

    /// Input ended before the column names row.
    #[error("CSV has {found} row(s) but the column names are expected on row {expected}")]
    MissingHeader { expected: usize, found: usize },

    /// Header configuration makes no sense.
    #[error("Invalid header layout: {0}")]
    InvalidLayout(String),
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        match err.into_kind() {
            csv::ErrorKind::Io(io) => CsvError::IoError(io),
            kind => CsvError::ParseError {
                line,
                message: format!("{:?}", kind),
            },
        }
    }
}

// =============================================================================
// Template (configuration) Errors
// =============================================================================

/// Errors detected while loading a mapping template.
///
/// These abort the whole run: a bad template never produces partial output.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template violates the mapping schema.
    #[error("Mapping template failed schema validation: {}", violations.join("; "))]
    SchemaValidation { violations: Vec<String> },

    /// A value source string could not be parsed.
    #[error("Invalid value source '{source_text}' for '{key}': {reason}")]
    InvalidValueSource {
        key: String,
        source_text: String,
        reason: String,
    },

    /// Exactly one of scale/offset was given.
    #[error("scale and offset must both be present or both be absent for '{key}'")]
    UnpairedScaleOffset { key: String },

    /// The header row settings do not describe a readable CSV layout.
    #[error("Invalid CSV layout: {0}")]
    InvalidLayout(String),

    /// Template JSON could not be read or deserialized.
    #[error("Template JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Template file could not be read.
    #[error("Failed to read template: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Resolution Errors
// =============================================================================

/// Errors resolving a value source against one row.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    /// The referenced column is not present in the row.
    #[error("Column '{column}' not found in CSV row")]
    MissingColumn { column: String },

    /// A metadata path did not resolve to exactly one value.
    #[error("Metadata path '{path}' resolved to {matches} values, expected exactly one")]
    MetadataResolution { path: String, matches: usize },

    /// A metadata path is not a valid JSONPath expression.
    #[error("Invalid metadata path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    /// A metadata path resolved to an object.
    #[error("Metadata path '{path}' does not point to a scalar value")]
    NotScalar { path: String },

    /// A bound, scale or offset resolved to something that is not a number.
    #[error("{role} for '{key}' must be numeric, got '{value}'")]
    NonNumeric {
        key: String,
        role: &'static str,
        value: String,
    },
}

// =============================================================================
// Encoding Errors
// =============================================================================

/// Errors raised by the BUFR encoding collaborator.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The encoder tool could not be started.
    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The encoder rejected the message (unknown key, incompatible type, ...).
    #[error("{program} exited with {status}: {stderr}")]
    Rejected {
        program: String,
        status: String,
        stderr: String,
    },

    /// Scratch file handling failed.
    #[error("Encoder IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The encoder produced no message.
    #[error("Encoder produced an empty message")]
    EmptyMessage,

    /// Identity keys read back from a message could not be understood.
    #[error("Could not read identity keys from message: {0}")]
    Identity(String),

    /// No BUFR4 sample could be located.
    #[error("BUFR4 sample not found: {0}")]
    SampleNotFound(String),
}

// =============================================================================
// Row Errors
// =============================================================================

/// What went wrong for a single row.
#[derive(Debug, Error)]
pub enum RowErrorKind {
    /// The CSV record itself could not be read.
    #[error(transparent)]
    Csv(#[from] CsvError),

    /// A value source failed to resolve.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The encoder rejected the mapped record.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// A row-level failure. The stream continues with the next row.
#[derive(Debug, Error)]
#[error("Row {row}: {kind}")]
pub struct RowError {
    /// Zero-based index of the data row (header rows excluded).
    pub row: usize,
    /// The underlying failure.
    #[source]
    pub kind: RowErrorKind,
}

impl RowError {
    pub fn new(row: usize, kind: impl Into<RowErrorKind>) -> Self {
        Self {
            row,
            kind: kind.into(),
        }
    }
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the stored template registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Template not found.
    #[error("Template not found: {0}")]
    NotFound(String),

    /// Stored template is not a valid mapping.
    #[error("Invalid template '{name}': {source}")]
    InvalidTemplate {
        name: String,
        #[source]
        source: TemplateError,
    },

    /// Template name is empty after normalisation.
    #[error("Invalid template name: '{0}'")]
    InvalidName(String),

    /// IO error.
    #[error("Registry IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Registry JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Run-level errors. Row-level failures are reported as [`RowError`] instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV header could not be read.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Mapping template is invalid.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Registry lookup failed.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Station metadata could not be parsed.
    #[error("Station metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Encoder could not be set up.
    #[error("Encoder error: {0}")]
    Encoder(#[from] EncodeError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for template loading.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Result type for value resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Result type for encoder operations.
pub type EncodeResult<T> = Result<T, EncodeError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
