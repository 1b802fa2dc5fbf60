//! CSV statement extraction.
//!
//! Reads every row up front (exports are small), finds the header row
//! within the scan window, then maps the remaining rows through the
//! detected column layout.

use csv::ReaderBuilder;
use finsight_core::{ExtractError, RawRecord};

use crate::schema::{detect_header, rows_to_records};

pub fn extract_csv(bytes: &[u8]) -> Result<Vec<RawRecord>, ExtractError> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_reader(bytes);

    let mut rows: Vec<Vec<String>> = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| ExtractError::CorruptInput(format!("csv: {e}")))?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }

    let (header_row, layout) = detect_header(&rows)?;
    Ok(rows_to_records(&rows, header_row, &layout))
}
