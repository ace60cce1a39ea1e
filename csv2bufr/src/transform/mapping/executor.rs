//! Template execution: one row in, one [`MappedRecord`] out.
//!
//! Per element the order is fixed: resolve, coerce CSV text, QC, scale/offset.
//! A missing value skips everything after resolution.

use serde::Serialize;
use tracing::debug;

use super::operations::{apply_scale_offset, check_bounds, BoundsCheck};
use super::source::{resolve, ExecutionContext};
use super::template::{BufrElementSpec, MappingTemplate, ValueSource};
use crate::error::{ResolveError, ResolveResult};
use crate::models::{ElementValue, MappedRecord, ResolvedElement, Scalar};

/// A value dropped by QC.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcRejection {
    pub row: usize,
    pub key: String,
    pub value: f64,
    pub valid_min: Option<f64>,
    pub valid_max: Option<f64>,
}

/// Values set to missing because they fell outside their valid range.
///
/// QC rejections are not errors; this is the only place they surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QcReport {
    pub rejections: Vec<QcRejection>,
}

impl QcReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, rejection: QcRejection) {
        self.rejections.push(rejection);
    }

    pub fn len(&self) -> usize {
        self.rejections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rejections.is_empty()
    }

    /// Rejections for a single row.
    pub fn for_row(&self, row: usize) -> impl Iterator<Item = &QcRejection> {
        self.rejections.iter().filter(move |r| r.row == row)
    }
}

/// Map one element against the current row.
pub fn map_element(
    spec: &BufrElementSpec,
    ctx: &ExecutionContext<'_>,
    report: &mut QcReport,
) -> ResolveResult<ResolvedElement> {
    let scalar = match resolve(&spec.value, ctx)? {
        ElementValue::Missing => return Ok(ResolvedElement::missing(&spec.eccodes_key)),
        ElementValue::Present(s) => s,
    };

    let scalar = match spec.value {
        ValueSource::CsvColumn(_) => scalar.coerce_numeric(),
        _ => scalar,
    };

    let scalar = if spec.valid_min.is_some() || spec.valid_max.is_some() {
        let min = resolve_bound(spec, "valid_min", spec.valid_min.as_ref(), ctx)?;
        let max = resolve_bound(spec, "valid_max", spec.valid_max.as_ref(), ctx)?;

        match check_bounds(ElementValue::Present(scalar), min, max) {
            BoundsCheck::Kept(ElementValue::Present(s)) => s,
            BoundsCheck::Kept(ElementValue::Missing) => {
                return Ok(ResolvedElement::missing(&spec.eccodes_key));
            }
            BoundsCheck::Rejected { value } => {
                debug!(
                    row = ctx.row_index,
                    key = %spec.eccodes_key,
                    value,
                    ?min,
                    ?max,
                    "value out of valid range, set to missing"
                );
                report.record(QcRejection {
                    row: ctx.row_index,
                    key: spec.eccodes_key.clone(),
                    value,
                    valid_min: min,
                    valid_max: max,
                });
                return Ok(ResolvedElement::missing(&spec.eccodes_key));
            }
        }
    } else {
        scalar
    };

    let scalar = match &spec.scale_offset {
        Some((scale, offset)) => {
            let scale = resolve_numeric(spec, "scale", scale, ctx)?;
            let offset = resolve_numeric(spec, "offset", offset, ctx)?;
            match (scale, offset) {
                (Some(s), Some(o)) => apply_scale_offset(scalar, &s, &o),
                _ => scalar,
            }
        }
        None => scalar,
    };

    Ok(ResolvedElement::new(&spec.eccodes_key, ElementValue::Present(scalar)))
}

/// Resolve a numeric parameter. Missing gives `None`; anything non-numeric is an error.
fn resolve_numeric(
    spec: &BufrElementSpec,
    role: &'static str,
    source: &ValueSource,
    ctx: &ExecutionContext<'_>,
) -> ResolveResult<Option<Scalar>> {
    match resolve(source, ctx)? {
        ElementValue::Missing => Ok(None),
        ElementValue::Present(s) => {
            let s = s.coerce_numeric();
            if s.is_numeric() {
                Ok(Some(s))
            } else {
                Err(ResolveError::NonNumeric {
                    key: spec.eccodes_key.clone(),
                    role,
                    value: s.to_string(),
                })
            }
        }
    }
}

fn resolve_bound(
    spec: &BufrElementSpec,
    role: &'static str,
    source: Option<&ValueSource>,
    ctx: &ExecutionContext<'_>,
) -> ResolveResult<Option<f64>> {
    match source {
        Some(source) => Ok(resolve_numeric(spec, role, source, ctx)?.and_then(|s| s.as_f64())),
        None => Ok(None),
    }
}

/// Apply a template to one row.
///
/// Header elements come first, then data, each in declaration order. Missing
/// elements are kept so the encoder sees the full sequence.
pub fn build_record(
    template: &MappingTemplate,
    ctx: &ExecutionContext<'_>,
    report: &mut QcReport,
) -> ResolveResult<MappedRecord> {
    let header = template
        .header
        .iter()
        .map(|spec| map_element(spec, ctx, report))
        .collect::<ResolveResult<Vec<_>>>()?;

    let data = template
        .data
        .iter()
        .map(|spec| map_element(spec, ctx, report))
        .collect::<ResolveResult<Vec<_>>>()?;

    let wigos_station_identifier = match &template.wigos_station_identifier {
        Some(source) => resolve(source, ctx)?.into_scalar().map(|s| s.to_string()),
        None => None,
    };

    Ok(MappedRecord {
        header,
        data,
        replication: template.replication.clone(),
        wigos_station_identifier,
    })
}
