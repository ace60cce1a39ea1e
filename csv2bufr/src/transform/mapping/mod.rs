//! Mapping engine: from a CSV row to the ordered BUFR key/value sequence.
//!
//! - `template`: mapping template definition, loading and value sources
//! - `source`: value resolution against the current row and station metadata
//! - `operations`: QC bounds and scale/offset
//! - `executor`: element mapping and record building
//!
//! ## Usage Flow
//!
//! ```text
//! MappingTemplate::load → per row: ExecutionContext → build_record → MappedRecord → encoder
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use csv2bufr::transform::mapping::{build_record, ExecutionContext, MappingTemplate, QcReport};
//! use csv2bufr::parser::CsvRow;
//!
//! let template = MappingTemplate::from_path("templates/aws-template.json")?;
//! let row = CsvRow::from_pairs(0, [("air_temperature", "21.4")]);
//! let metadata = serde_json::json!({});
//! let ctx = ExecutionContext::new(&row, &metadata);
//!
//! let mut report = QcReport::new();
//! let record = build_record(&template, &ctx, &mut report)?;
//! ```

pub mod executor;
pub mod operations;
pub mod source;
pub mod template;

pub use executor::{build_record, map_element, QcRejection, QcReport};
pub use operations::{apply_bounds, apply_scale_offset, check_bounds, BoundsCheck};
pub use source::{resolve, ExecutionContext};
pub use template::{BufrElementSpec, MappingTemplate, ValueSource};
