//! finsight-extract: statement extraction (CSV / spreadsheet / PDF text)
//! into ordered raw records.
//!
//! One strategy per declared format; the format is a closed tag, never
//! sniffed from content. Records come out in document order, which the
//! normalizer preserves through posted-date ties.

pub mod csv_file;
pub mod pdf_text;
pub mod schema;
pub mod sheet;

use finsight_core::{ExtractError, RawRecord, SourceFormat};

/// Turn a raw file buffer into ordered raw records.
///
/// Fails with `CorruptInput` when the bytes cannot be parsed as the
/// declared format and `SchemaNotFound` when no header row with the
/// expected columns appears within the scan window.
pub fn extract(bytes: &[u8], format: SourceFormat) -> Result<Vec<RawRecord>, ExtractError> {
    match format {
        SourceFormat::Csv => csv_file::extract_csv(bytes),
        SourceFormat::Spreadsheet => sheet::extract_sheet(bytes),
        SourceFormat::Pdf => pdf_text::extract_pdf(bytes),
    }
}
