//! Transform driver: CSV in, one BUFR message per row out.
//!
//! [`transform`] reads the header block eagerly and returns a lazy
//! [`Transform`] iterator. Each call to `next` processes exactly one data row:
//!
//! 1. build the execution context from the row and station metadata
//! 2. apply the template ([`build_record`])
//! 3. encode with the [`BufrEncoder`]
//! 4. checksum the message (hex SHA-256)
//! 5. read identifying keys back from the message
//!
//! A failing row yields `Err(RowError)` and the iterator moves on to the next
//! row. Dropping the iterator stops all work.
//!
//! # Example
//!
//! ```rust,ignore
//! use csv2bufr::{transform_str, EccodesToolEncoder, MappingTemplate, Settings};
//!
//! let settings = Settings::from_env();
//! let encoder = EccodesToolEncoder::from_settings(&settings.eccodes)?;
//! let template = MappingTemplate::from_path("aws-template.json")?;
//! let metadata = serde_json::json!({ "wsi_series": 0 });
//!
//! for result in transform_str(csv, metadata, template, encoder)? {
//!     match result {
//!         Ok(record) => std::fs::write(format!("{}.bufr4", record.meta.id), &record.bufr4)?,
//!         Err(e) => eprintln!("{}", e),
//!     }
//! }
//! ```

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::{Cursor, Read};
use std::iter::FusedIterator;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::mapping::{build_record, ExecutionContext, MappingTemplate, QcReport};
use crate::encoder::{BufrEncoder, MessageIdentity};
use crate::error::{PipelineResult, RowError};
use crate::models::{OutputRecord, RecordMeta};
use crate::parser::{read_file_auto, read_rows, CsvRow, CsvRows};

/// Where the driver is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransformState {
    Init,
    ParsingHeader,
    PerRow,
    Done,
}

/// Counts for a run, updated as rows are consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransformSummary {
    pub rows_read: usize,
    pub converted: usize,
    pub failed: usize,
    pub qc_rejections: usize,
}

/// Lazy per-row conversion. See the module docs.
pub struct Transform<R: Read, E: BufrEncoder> {
    state: TransformState,
    rows: Option<CsvRows<R>>,
    headers: Vec<String>,
    metadata: Value,
    template: Arc<MappingTemplate>,
    encoder: E,
    qc: QcReport,
    summary: TransformSummary,
}

/// Start a conversion.
///
/// Fails up front if the header block cannot be read; row-level problems are
/// reported by the iterator.
pub fn transform<R, E>(
    reader: R,
    metadata: Value,
    template: impl Into<Arc<MappingTemplate>>,
    encoder: E,
) -> PipelineResult<Transform<R, E>>
where
    R: Read,
    E: BufrEncoder,
{
    let mut transform = Transform {
        state: TransformState::Init,
        rows: None,
        headers: Vec::new(),
        metadata,
        template: template.into(),
        encoder,
        qc: QcReport::new(),
        summary: TransformSummary::default(),
    };
    transform.read_header(reader)?;
    Ok(transform)
}

/// Convert CSV text held in memory.
pub fn transform_str<E: BufrEncoder>(
    csv: impl Into<String>,
    metadata: Value,
    template: impl Into<Arc<MappingTemplate>>,
    encoder: E,
) -> PipelineResult<Transform<Cursor<String>, E>> {
    transform(Cursor::new(csv.into()), metadata, template, encoder)
}

/// Convert a CSV file, detecting its text encoding.
pub fn transform_file<E: BufrEncoder>(
    path: &Path,
    metadata: Value,
    template: impl Into<Arc<MappingTemplate>>,
    encoder: E,
) -> PipelineResult<Transform<Cursor<String>, E>> {
    let (text, encoding) = read_file_auto(path)?;
    debug!(path = %path.display(), %encoding, "decoded CSV input");
    transform_str(text, metadata, template, encoder)
}

impl<R: Read, E: BufrEncoder> Transform<R, E> {
    fn read_header(&mut self, reader: R) -> PipelineResult<()> {
        self.state = TransformState::ParsingHeader;
        let rows = match read_rows(reader, &self.template.layout()) {
            Ok(rows) => rows,
            Err(e) => {
                self.state = TransformState::Done;
                return Err(e.into());
            }
        };

        self.headers = rows.headers().to_vec();
        info!(columns = self.headers.len(), "CSV header read");
        if let Err(missing) = self.template.validate_headers(&self.headers) {
            warn!(?missing, "template references columns absent from the CSV header");
        }

        self.rows = Some(rows);
        self.state = TransformState::PerRow;
        Ok(())
    }

    pub fn state(&self) -> TransformState {
        self.state
    }

    /// Column names from the CSV header.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// QC rejections so far.
    pub fn qc_report(&self) -> &QcReport {
        &self.qc
    }

    pub fn summary(&self) -> TransformSummary {
        TransformSummary {
            qc_rejections: self.qc.len(),
            ..self.summary
        }
    }

    fn process_row(&mut self, row: CsvRow) -> Result<OutputRecord, RowError> {
        let index = row.index;
        let ctx = ExecutionContext::new(&row, &self.metadata);
        let record = build_record(&self.template, &ctx, &mut self.qc).map_err(|e| RowError::new(index, e))?;

        let bufr4 = self.encoder.encode(&record).map_err(|e| RowError::new(index, e))?;
        let checksum = hex::encode(Sha256::digest(&bufr4));
        let identity = self.encoder.identify(&bufr4).map_err(|e| RowError::new(index, e))?;
        let meta = record_meta(identity, record.wigos_station_identifier.clone(), &checksum);

        debug!(row = index, id = %meta.id, bytes = bufr4.len(), "row converted");

        Ok(OutputRecord {
            row_index: index,
            header: record.header,
            data: record.data,
            replication: record.replication,
            bufr4,
            checksum,
            meta,
        })
    }

    fn finish(&mut self) {
        self.state = TransformState::Done;
        self.rows = None;
        let summary = self.summary();
        info!(
            rows = summary.rows_read,
            converted = summary.converted,
            failed = summary.failed,
            qc_rejections = summary.qc_rejections,
            "conversion finished"
        );
    }
}

impl<R: Read, E: BufrEncoder> Iterator for Transform<R, E> {
    type Item = Result<OutputRecord, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != TransformState::PerRow {
            return None;
        }

        let next = self.rows.as_mut().and_then(|rows| rows.next());
        let index = self.summary.rows_read;

        let result = match next {
            None => {
                self.finish();
                return None;
            }
            Some(Err(e)) => Err(RowError::new(index, e)),
            Some(Ok(row)) => self.process_row(row),
        };

        self.summary.rows_read += 1;
        match &result {
            Ok(_) => self.summary.converted += 1,
            Err(e) => {
                self.summary.failed += 1;
                warn!(row = e.row, error = %e.kind, "row failed");
            }
        }
        Some(result)
    }
}

impl<R: Read, E: BufrEncoder> FusedIterator for Transform<R, E> {}

/// Identity fields come from the message; the template's WSI fills in only
/// when the message carries none.
fn record_meta(identity: MessageIdentity, template_wsi: Option<String>, checksum: &str) -> RecordMeta {
    let wigos_station_identifier = identity.wigos_station_identifier.or(template_wsi);

    let id = match (&wigos_station_identifier, &identity.phenomenon_date) {
        (Some(wsi), Some(date)) => format!("WIGOS_{}_{}", wsi, date.format("%Y%m%dT%H%M%S")),
        _ => checksum.to_string(),
    };

    RecordMeta {
        id,
        wigos_station_identifier,
        phenomenon_date: identity.phenomenon_date,
        originating_centre: identity.originating_centre,
        data_category: identity.data_category,
        geometry: identity.geometry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::testing::MemoryEncoder;
    use crate::error::{PipelineError, RowErrorKind};
    use crate::models::{ElementValue, Scalar};
    use serde_json::json;

    const CSV: &str = "\
wsi_local,year,month,day,hour,lat,lon,air_temp
06700,2022,03,31,12,46.25,6.13,20.5
06700,2022,3,31,13,146.25,6.13,NA
06700,2022,3,31
";

    fn template() -> MappingTemplate {
        MappingTemplate::load(&json!({
            "inputDelayedDescriptorReplicationFactor": [],
            "wigos_station_identifier": "const:0-20000-0-99999",
            "header": [
                { "eccodes_key": "edition", "value": "const:4" },
                { "eccodes_key": "dataCategory", "value": "const:0" },
                { "eccodes_key": "bufrHeaderCentre", "value": "metadata:centre" },
                { "eccodes_key": "typicalYear", "value": "data:year" },
                { "eccodes_key": "typicalMonth", "value": "data:month" },
                { "eccodes_key": "typicalDay", "value": "data:day" },
                { "eccodes_key": "typicalHour", "value": "data:hour" },
                { "eccodes_key": "unexpandedDescriptors", "value": "array:301150, 307096" }
            ],
            "data": [
                { "eccodes_key": "#1#wigosIdentifierSeries", "value": "metadata:wsi_series" },
                { "eccodes_key": "#1#wigosIssuerOfIdentifier", "value": "const:20000" },
                { "eccodes_key": "#1#wigosIssueNumber", "value": "const:0" },
                { "eccodes_key": "#1#wigosLocalIdentifierCharacter", "value": "metadata:wsi_local" },
                { "eccodes_key": "#1#latitude", "value": "data:lat", "valid_min": "const:-90", "valid_max": "const:90" },
                { "eccodes_key": "#1#longitude", "value": "data:lon", "valid_min": -180, "valid_max": 180 },
                { "eccodes_key": "#1#airTemperature", "value": "data:air_temp", "scale": "const:0", "offset": "const:273.15" }
            ]
        }))
        .unwrap()
    }

    fn metadata() -> Value {
        json!({ "centre": 94, "wsi_series": 0, "wsi_local": "06700" })
    }

    #[test]
    fn test_rows_stream_in_order_with_failures() {
        let results: Vec<_> = transform_str(CSV, metadata(), template(), MemoryEncoder::new())
            .unwrap()
            .collect();
        assert_eq!(results.len(), 3);

        let first = results[0].as_ref().unwrap();
        assert_eq!(first.row_index, 0);
        assert_eq!(first.meta.id, "WIGOS_0-20000-0-06700_20220331T120000");
        assert_eq!(first.meta.originating_centre, Some(94));
        assert_eq!(first.meta.data_category, Some(0));
        assert_eq!(first.header.len(), 8);
        assert_eq!(first.data.len(), 7);

        let second = results[1].as_ref().unwrap();
        assert_eq!(second.row_index, 1);
        assert!(second.meta.geometry.is_none());

        let err = results[2].as_ref().unwrap_err();
        assert_eq!(err.row, 2);
        assert!(matches!(err.kind, RowErrorKind::Resolve(_)));
    }

    #[test]
    fn test_checksum_is_sha256_of_message() {
        let mut transform = transform_str(CSV, metadata(), template(), MemoryEncoder::new()).unwrap();
        let record = transform.next().unwrap().unwrap();
        assert_eq!(record.checksum.len(), 64);
        assert_eq!(record.checksum, hex::encode(Sha256::digest(&record.bufr4)));
    }

    #[test]
    fn test_same_row_encodes_identically() {
        let row = "06700,2022,03,31,12,46.25,6.13,20.5\n";
        let csv = format!("wsi_local,year,month,day,hour,lat,lon,air_temp\n{row}{row}");
        let records: Vec<OutputRecord> = transform_str(csv.clone(), metadata(), template(), MemoryEncoder::new())
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].bufr4, records[1].bufr4);
        assert_eq!(records[0].checksum, records[1].checksum);

        let rerun = transform_str(csv, metadata(), template(), MemoryEncoder::new())
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(rerun.bufr4, records[0].bufr4);
        assert_eq!(rerun.checksum, records[0].checksum);
    }

    #[test]
    fn test_values_scaled_and_missing_kept() {
        let records: Vec<OutputRecord> = transform_str(CSV, metadata(), template(), MemoryEncoder::new())
            .unwrap()
            .filter_map(Result::ok)
            .collect();

        let month = records[0].header.iter().find(|e| e.key == "typicalMonth").unwrap();
        assert_eq!(month.value, ElementValue::Present(Scalar::Integer(3)));

        let temp = records[0].data.iter().find(|e| e.key == "#1#airTemperature").unwrap();
        match &temp.value {
            ElementValue::Present(Scalar::Float(f)) => assert!((f - 293.65).abs() < 1e-9),
            other => panic!("expected scaled temperature, got {:?}", other),
        }

        let local = records[0]
            .data
            .iter()
            .find(|e| e.key == "#1#wigosLocalIdentifierCharacter")
            .unwrap();
        assert_eq!(local.value, ElementValue::Present(Scalar::Text("06700".into())));

        let temp = records[1].data.iter().find(|e| e.key == "#1#airTemperature").unwrap();
        assert!(temp.value.is_missing());
    }

    #[test]
    fn test_summary_and_qc_report() {
        let mut transform = transform_str(CSV, metadata(), template(), MemoryEncoder::new()).unwrap();
        assert_eq!(transform.state(), TransformState::PerRow);
        assert_eq!(transform.headers().len(), 8);

        transform.by_ref().for_each(drop);
        assert_eq!(transform.state(), TransformState::Done);

        let summary = transform.summary();
        assert_eq!(summary.rows_read, 3);
        assert_eq!(summary.converted, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.qc_rejections, 1);

        let rejection = &transform.qc_report().rejections[0];
        assert_eq!(rejection.row, 1);
        assert_eq!(rejection.key, "#1#latitude");
    }

    #[test]
    fn test_fused_after_done() {
        let mut transform = transform_str("wsi_local\n", metadata(), template(), MemoryEncoder::new()).unwrap();
        assert!(transform.next().is_none());
        assert!(transform.next().is_none());
        assert_eq!(transform.summary().rows_read, 0);
    }

    #[test]
    fn test_lazy_consumption() {
        let encoder = MemoryEncoder::new();
        let mut transform = transform_str(CSV, metadata(), template(), &encoder).unwrap();
        let _ = transform.next();
        assert_eq!(encoder.seen.borrow().len(), 1);
        drop(transform);
        assert_eq!(encoder.seen.borrow().len(), 1);
    }

    #[test]
    fn test_encoder_rejection_is_row_error() {
        let encoder = MemoryEncoder::rejecting("#1#airTemperature");
        let results: Vec<_> = transform_str(CSV, metadata(), template(), encoder).unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results
            .iter()
            .take(2)
            .all(|r| matches!(r, Err(RowError { kind: RowErrorKind::Encode(_), .. }))));
    }

    #[test]
    fn test_header_failure_is_fatal() {
        let result = transform_str("", metadata(), template(), MemoryEncoder::new());
        assert!(matches!(result, Err(PipelineError::Csv(_))));
    }

    #[test]
    fn test_id_falls_back_to_checksum() {
        let meta = record_meta(MessageIdentity::default(), Some("0-20000-0-1".into()), "abc123");
        assert_eq!(meta.id, "abc123");
        assert_eq!(meta.wigos_station_identifier.as_deref(), Some("0-20000-0-1"));
    }

    #[test]
    fn test_template_wsi_used_when_message_has_none() {
        let identity = MessageIdentity {
            phenomenon_date: chrono::NaiveDate::from_ymd_opt(2022, 1, 2).and_then(|d| d.and_hms_opt(3, 4, 5)),
            ..Default::default()
        };
        let meta = record_meta(identity, Some("0-20000-0-99999".into()), "abc");
        assert_eq!(meta.id, "WIGOS_0-20000-0-99999_20220102T030405");
    }
}
