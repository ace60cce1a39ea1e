//! JSON Schema validation for mapping templates.
//!
//! The mapping schema (JSON Schema Draft 7) is embedded at compile time from
//! `schemas/mapping.json` and compiled once. It checks structure only:
//!
//! - `header` and `data` are non-empty arrays of elements
//! - every element has `eccodes_key` and `value`
//! - value sources carry a `const:`, `data:`, `metadata:` or `array:` prefix
//! - `scale` and `offset` appear together
//!
//! Typed conversion (parsing prefixes into value sources) happens afterwards
//! in [`crate::transform::mapping::MappingTemplate::load`].
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use csv2bufr::validation::validate_mapping;
//!
//! let mapping = json!({
//!     "inputDelayedDescriptorReplicationFactor": [],
//!     "header": [{ "eccodes_key": "edition", "value": "const:4" }],
//!     "data": [{ "eccodes_key": "#1#airTemperature", "value": "data:air_temp" }]
//! });
//! assert!(validate_mapping(&mapping).is_ok());
//! ```

use once_cell::sync::Lazy;
use serde_json::Value;

static MAPPING_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/mapping.json")).expect("Invalid embedded schema")
});

static MAPPING_VALIDATOR: Lazy<jsonschema::Validator> =
    Lazy::new(|| jsonschema::draft7::new(&MAPPING_SCHEMA).expect("Invalid embedded schema"));

/// The embedded mapping schema.
pub fn mapping_schema() -> &'static Value {
    &MAPPING_SCHEMA
}

/// Validate a mapping template against the embedded mapping schema.
pub fn validate_mapping(data: &Value) -> Result<(), Vec<String>> {
    let errors: Vec<String> = MAPPING_VALIDATOR.iter_errors(data).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick check against the mapping schema.
pub fn is_valid_mapping(data: &Value) -> bool {
    MAPPING_VALIDATOR.is_valid(data)
}
