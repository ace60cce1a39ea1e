//! CSV reading for observation files.
//!
//! Bytes are decoded with encoding auto-detection (station loggers often
//! write ISO-8859-1), then tokenised with the `csv` crate. Rows are produced
//! lazily, one [`CsvRow`] per data line, so large files are never buffered.
//!
//! Cells whose text is one of [`MISSING_MARKERS`] are stored as declared
//! missing (`None`).

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::error::{CsvError, CsvResult};

/// Cell text treated as a declared missing value.
pub const MISSING_MARKERS: &[&str] = &["NA", "NaN", "NAN", "None", ""];

/// Returns true if the cell text is a declared missing value.
pub fn is_missing_marker(text: &str) -> bool {
    MISSING_MARKERS.contains(&text)
}

// =============================================================================
// Layout
// =============================================================================

/// Where the column names are and how many rows precede the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvLayout {
    /// Rows before the first data row, including the column names row.
    pub number_header_rows: usize,
    /// 1-based row holding the column names.
    pub names_on_row: usize,
    pub delimiter: u8,
}

impl Default for CsvLayout {
    fn default() -> Self {
        Self {
            number_header_rows: 1,
            names_on_row: 1,
            delimiter: b',',
        }
    }
}

impl CsvLayout {
    pub fn new(number_header_rows: usize, names_on_row: usize) -> Self {
        Self {
            number_header_rows,
            names_on_row,
            ..Default::default()
        }
    }

    pub(crate) fn check(&self) -> CsvResult<()> {
        if self.names_on_row == 0 {
            return Err(CsvError::InvalidLayout(
                "names_on_row is 1-based and must be at least 1".to_string(),
            ));
        }
        if self.names_on_row > self.number_header_rows {
            return Err(CsvError::InvalidLayout(format!(
                "column names on row {} but only {} header row(s)",
                self.names_on_row, self.number_header_rows
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Rows
// =============================================================================

/// One data row: column names shared with every other row, plus this row's cells.
#[derive(Debug, Clone)]
pub struct CsvRow {
    /// Zero-based data row index.
    pub index: usize,
    /// Line number in the input, for diagnostics.
    pub line: u64,
    headers: Arc<[String]>,
    values: Vec<Option<String>>,
}

impl CsvRow {
    /// Build a row directly, mostly for tests and embedding callers.
    pub fn new(index: usize, headers: Arc<[String]>, cells: Vec<String>) -> Self {
        let values = cells
            .into_iter()
            .map(|c| if is_missing_marker(&c) { None } else { Some(c) })
            .collect();
        Self {
            index,
            line: 0,
            headers,
            values,
        }
    }

    /// Build a single row from `(column, text)` pairs.
    pub fn from_pairs<K: Into<String>, V: Into<String>>(
        index: usize,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        let (headers, cells): (Vec<String>, Vec<String>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self::new(index, headers.into(), cells)
    }

    /// Look up a column.
    ///
    /// Returns `None` if the column does not exist in this row,
    /// `Some(None)` for a declared missing cell.
    pub fn get(&self, column: &str) -> Option<Option<&str>> {
        let pos = self.headers.iter().position(|h| h == column)?;
        // short rows are accepted; absent trailing cells count as absent columns
        self.values.get(pos).map(|v| v.as_deref())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

/// Lazy iterator over the data rows of a CSV input.
pub struct CsvRows<R: Read> {
    reader: csv::Reader<R>,
    headers: Arc<[String]>,
    next_index: usize,
    finished: bool,
}

impl<R: Read> CsvRows<R> {
    /// Column names read from the header block.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl<R: Read> Iterator for CsvRows<R> {
    type Item = CsvResult<CsvRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let mut record = csv::StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(true) => {
                let index = self.next_index;
                self.next_index += 1;
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                let mut row = CsvRow::new(
                    index,
                    Arc::clone(&self.headers),
                    record.iter().map(str::to_string).collect(),
                );
                row.line = line;
                Some(Ok(row))
            }
            Ok(false) => {
                self.finished = true;
                None
            }
            Err(e) => {
                // keep going: the row index still advances past the bad record
                self.next_index += 1;
                Some(Err(e.into()))
            }
        }
    }
}

/// Read the header block and return a lazy iterator over the data rows.
pub fn read_rows<R: Read>(input: R, layout: &CsvLayout) -> CsvResult<CsvRows<R>> {
    layout.check()?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(layout.delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut headers = None;
    let mut record = csv::StringRecord::new();
    for row in 1..=layout.number_header_rows {
        if !reader.read_record(&mut record)? {
            return Err(CsvError::MissingHeader {
                expected: layout.names_on_row,
                found: row - 1,
            });
        }
        if row == layout.names_on_row {
            headers = Some(record.iter().map(str::to_string).collect::<Vec<_>>());
        }
    }

    let headers = headers.ok_or(CsvError::MissingHeader {
        expected: layout.names_on_row,
        found: 0,
    })?;

    Ok(CsvRows {
        reader,
        headers: headers.into(),
        next_index: 0,
        finished: false,
    })
}

/// Column names of a CSV text without reading the data rows.
pub fn column_names(csv: &str, layout: &CsvLayout) -> CsvResult<Vec<String>> {
    Ok(read_rows(csv.as_bytes(), layout)?.headers().to_vec())
}

// =============================================================================
// Encoding detection
// =============================================================================

/// Detect the encoding of raw bytes using chardet.
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to a string using the named encoding.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Decode bytes with auto-detected encoding. Returns the text and the encoding used.
pub fn decode_auto(bytes: &[u8]) -> (String, String) {
    let encoding = detect_encoding(bytes);
    let text = decode_content(bytes, &encoding);
    (text, encoding)
}

/// Read a CSV file to a string with auto-detected encoding.
pub fn read_file_auto<P: AsRef<Path>>(path: P) -> CsvResult<(String, String)> {
    let bytes = std::fs::read(path.as_ref())?;
    Ok(decode_auto(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBS: &str = "\"wsi\",\"year\",\"mslp\"\n\"0-20000-0-06700\",2022,1013.25\n\"0-20000-0-06700\",2022,None\n";

    #[test]
    fn test_reads_header_and_rows() {
        let rows = read_rows(OBS.as_bytes(), &CsvLayout::default()).unwrap();
        assert_eq!(rows.headers(), &["wsi", "year", "mslp"]);

        let rows: Vec<CsvRow> = rows.map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].index, 0);
        assert_eq!(rows[0].get("wsi"), Some(Some("0-20000-0-06700")));
        assert_eq!(rows[0].get("mslp"), Some(Some("1013.25")));
        assert_eq!(rows[1].index, 1);
    }

    #[test]
    fn test_none_text_is_declared_missing() {
        let rows: Vec<CsvRow> = read_rows(OBS.as_bytes(), &CsvLayout::default())
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows[1].get("mslp"), Some(None));
    }

    #[test]
    fn test_absent_column() {
        let row = CsvRow::from_pairs(0, [("a", "1")]);
        assert_eq!(row.get("b"), None);
    }

    #[test]
    fn test_short_row_column_absent() {
        let csv = "a,b,c\n1,2\n";
        let rows: Vec<CsvRow> = read_rows(csv.as_bytes(), &CsvLayout::default())
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows[0].get("b"), Some(Some("2")));
        assert_eq!(rows[0].get("c"), None);
    }

    #[test]
    fn test_names_on_second_row() {
        let csv = "TOA5,logger\nTIMESTAMP,AirTemp\nTS,degC\n2021-11-18 18:00,17.2\n";
        let rows = read_rows(csv.as_bytes(), &CsvLayout::new(3, 2)).unwrap();
        assert_eq!(rows.headers(), &["TIMESTAMP", "AirTemp"]);
        let rows: Vec<CsvRow> = rows.map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("AirTemp"), Some(Some("17.2")));
    }

    #[test]
    fn test_invalid_layout() {
        let result = read_rows(OBS.as_bytes(), &CsvLayout::new(1, 2));
        assert!(matches!(result, Err(CsvError::InvalidLayout(_))));
    }

    #[test]
    fn test_empty_input_has_no_header() {
        let result = read_rows("".as_bytes(), &CsvLayout::default());
        assert!(matches!(result, Err(CsvError::MissingHeader { .. })));
    }

    #[test]
    fn test_latin1_decoding() {
        // "Genève" in ISO-8859-1
        let bytes: &[u8] = &[0x47, 0x65, 0x6E, 0xE8, 0x76, 0x65];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert_eq!(decoded, "Genève");
    }

    #[test]
    fn test_column_names() {
        let names = column_names(OBS, &CsvLayout::default()).unwrap();
        assert_eq!(names, vec!["wsi", "year", "mslp"]);
    }
}
