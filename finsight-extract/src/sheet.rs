//! Spreadsheet statement extraction via calamine.
//!
//! Sheets are tried in workbook order; the first one with a recognizable
//! header row wins. Date cells frequently arrive as Excel serial numbers,
//! so the date column gets converted to ISO dates before normalization.

use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use finsight_core::{ExtractError, RawRecord};

use crate::schema::{HeaderLayout, detect_header, rows_to_records};

pub fn extract_sheet(bytes: &[u8]) -> Result<Vec<RawRecord>, ExtractError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| ExtractError::CorruptInput(format!("workbook: {e}")))?;

    let sheet_names = workbook.sheet_names().to_owned();
    let mut last_err = ExtractError::SchemaNotFound(crate::schema::SCAN_WINDOW);

    for name in &sheet_names {
        let Ok(range) = workbook.worksheet_range(name) else {
            continue;
        };
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();

        match detect_header(&rows) {
            Ok((header_row, layout)) => {
                let rows = convert_date_column(rows, header_row, &layout);
                return Ok(rows_to_records(&rows, header_row, &layout));
            }
            Err(e) => last_err = e,
        }
    }

    Err(last_err)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_float(*f),
        Data::DateTime(dt) => excel_serial_to_iso(dt.as_f64()),
        // keep the date part; normalization only wants the day
        Data::DateTimeIso(s) => match s.split_once('T') {
            Some((day, _)) => day.to_string(),
            None => s.clone(),
        },
        Data::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Render floats without trailing zeros so "12.50" survives as "12.5"
/// (the normalizer pads fractions back out).
fn format_float(f: f64) -> String {
    if f == f.trunc() {
        format!("{}", f as i64)
    } else {
        format!("{f}")
    }
}

/// Excel stores dates as day counts from 1899-12-30 (the epoch accounts for
/// the 1900 leap-year bug). Rewrite numeric cells in the date column as ISO
/// dates.
fn convert_date_column(
    mut rows: Vec<Vec<String>>,
    header_row: usize,
    layout: &HeaderLayout,
) -> Vec<Vec<String>> {
    for row in rows.iter_mut().skip(header_row + 1) {
        if let Some(cell) = row.get_mut(layout.date) {
            if let Ok(serial) = cell.parse::<f64>() {
                if (1.0..=200_000.0).contains(&serial) {
                    *cell = excel_serial_to_iso(serial);
                }
            }
        }
    }
    rows
}

pub fn excel_serial_to_iso(serial: f64) -> String {
    let base = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap_or(chrono::NaiveDate::MIN);
    let date = base + chrono::Duration::days(serial as i64);
    date.format("%Y-%m-%d").to_string()
}
