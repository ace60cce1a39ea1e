//! # csv2bufr - tabular observations to WMO BUFR edition 4
//!
//! csv2bufr converts CSV files of surface observations into one BUFR4 message
//! per data row, driven by a JSON mapping template and a station metadata
//! document.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│  Template   │────▶│   ecCodes   │
//! │  (ISO/UTF8) │     │  (auto-enc) │     │ (QC, scale) │     │  (BUFR4)    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use csv2bufr::{transform_file, EccodesToolEncoder, Settings, TemplateRegistry};
//!
//! let settings = Settings::from_env();
//! let template = TemplateRegistry::from_settings(&settings).get("aws-template")?;
//! let encoder = EccodesToolEncoder::from_settings(&settings.eccodes)?;
//! let metadata = serde_json::from_str(&std::fs::read_to_string("station.json")?)?;
//!
//! for result in transform_file("obs.csv".as_ref(), metadata, template, encoder)? {
//!     let record = result?;
//!     std::fs::write(format!("{}.bufr4", record.meta.id), &record.bufr4)?;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Scalars, resolved elements, output records
//! - [`parser`] - CSV reading with encoding detection
//! - [`validation`] - Mapping template schema validation
//! - [`transform`] - Template mapping and the per-row driver
//! - [`encoder`] - BUFR encoding through ecCodes
//! - [`registry`] - Named template lookup and storage
//! - [`config`] - Environment settings
//! - [`logging`] - `tracing` subscriber setup
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Validation
pub mod validation;

// Transformation
pub mod transform;

// Encoding
pub mod encoder;

// Templates
pub mod registry;

// Ambient
pub mod config;
pub mod logging;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CsvError,
    EncodeError,
    PipelineError,
    RegistryError,
    ResolveError,
    RowError,
    RowErrorKind,
    ServerError,
    TemplateError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    ElementValue,
    Geometry,
    MappedRecord,
    OutputRecord,
    RecordMeta,
    ReplicationFactors,
    ResolvedElement,
    Scalar,
};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    column_names,
    decode_content,
    detect_encoding,
    read_file_auto,
    read_rows,
    CsvLayout,
    CsvRow,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{is_valid_mapping, mapping_schema, validate_mapping};

// =============================================================================
// Re-exports - Mapping
// =============================================================================

pub use transform::mapping::{
    apply_scale_offset,
    build_record,
    check_bounds,
    map_element,
    resolve,
    BoundsCheck,
    BufrElementSpec,
    ExecutionContext,
    MappingTemplate,
    QcRejection,
    QcReport,
    ValueSource,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    transform,
    transform_file,
    transform_str,
    Transform,
    TransformState,
    TransformSummary,
};

// =============================================================================
// Re-exports - Encoder
// =============================================================================

pub use encoder::{BufrEncoder, EccodesToolEncoder, MessageIdentity};

// =============================================================================
// Re-exports - Registry, Config
// =============================================================================

pub use registry::{TemplateEntry, TemplateOrigin, TemplateRegistry};
pub use config::Settings;

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
