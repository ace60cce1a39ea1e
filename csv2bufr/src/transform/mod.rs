//! Transformation module.
//!
//! This module handles CSV to BUFR transformation:
//! - Mapping: template loading, value resolution, QC and scaling
//! - Pipeline: the per-row driver producing encoded messages

pub mod mapping;
pub mod pipeline;

pub use mapping::*;
pub use pipeline::*;
