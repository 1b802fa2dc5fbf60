//! Header detection for tabular sources (CSV and spreadsheets).
//!
//! Bank exports put the header row anywhere in the first screenful, often
//! below blank padding and disclaimer rows. We scan a bounded window for a
//! row whose cells cover {date, description, amount-or-debit/credit} and
//! read the column layout off it.

use finsight_core::{ExtractError, RawRecord};

/// Rows scanned before giving up with `SchemaNotFound`.
pub const SCAN_WINDOW: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Date,
    Description,
    Amount,
    Debit,
    Credit,
}

fn match_column(cell: &str) -> Option<ColumnKind> {
    let key = cell.trim().to_ascii_lowercase();
    match key.as_str() {
        "date" | "posted date" | "post date" | "transaction date" | "trans date"
        | "posting date" => Some(ColumnKind::Date),
        "description" | "payee" | "merchant" | "details" | "memo" | "narrative"
        | "transaction description" => Some(ColumnKind::Description),
        "amount" | "value" | "transaction amount" => Some(ColumnKind::Amount),
        "debit" | "withdrawal" | "withdrawals" | "money out" => Some(ColumnKind::Debit),
        "credit" | "deposit" | "deposits" | "money in" => Some(ColumnKind::Credit),
        _ => None,
    }
}

/// Column positions read off the detected header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLayout {
    pub date: usize,
    pub description: usize,
    pub amount: Option<usize>,
    pub debit: Option<usize>,
    pub credit: Option<usize>,
}

impl HeaderLayout {
    fn from_row(row: &[String]) -> Option<Self> {
        let mut date = None;
        let mut description = None;
        let mut amount = None;
        let mut debit = None;
        let mut credit = None;

        for (idx, cell) in row.iter().enumerate() {
            match match_column(cell) {
                Some(ColumnKind::Date) if date.is_none() => date = Some(idx),
                Some(ColumnKind::Description) if description.is_none() => {
                    description = Some(idx)
                }
                Some(ColumnKind::Amount) if amount.is_none() => amount = Some(idx),
                Some(ColumnKind::Debit) if debit.is_none() => debit = Some(idx),
                Some(ColumnKind::Credit) if credit.is_none() => credit = Some(idx),
                _ => {}
            }
        }

        let layout = HeaderLayout {
            date: date?,
            description: description?,
            amount,
            debit,
            credit,
        };
        if layout.amount.is_none() && layout.debit.is_none() && layout.credit.is_none() {
            return None;
        }
        Some(layout)
    }
}

/// Scan the first `SCAN_WINDOW` rows for a header. Returns the header's
/// row index and its layout.
pub fn detect_header(rows: &[Vec<String>]) -> Result<(usize, HeaderLayout), ExtractError> {
    for (idx, row) in rows.iter().take(SCAN_WINDOW).enumerate() {
        if let Some(layout) = HeaderLayout::from_row(row) {
            return Ok((idx, layout));
        }
    }
    Err(ExtractError::SchemaNotFound(SCAN_WINDOW))
}

/// Map data rows below the header into raw records, skipping blank rows.
/// `row_index` is the absolute row position in the document.
pub fn rows_to_records(
    rows: &[Vec<String>],
    header_row: usize,
    layout: &HeaderLayout,
) -> Vec<RawRecord> {
    let mut records = Vec::new();
    for (offset, row) in rows.iter().enumerate().skip(header_row + 1) {
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let cell = |idx: usize| row.get(idx).map(|s| s.trim().to_string()).unwrap_or_default();
        let opt_cell = |idx: Option<usize>| {
            idx.map(&cell).filter(|s| !s.is_empty())
        };
        records.push(RawRecord {
            row_index: offset,
            date: cell(layout.date),
            description: cell(layout.description),
            amount: opt_cell(layout.amount),
            debit: opt_cell(layout.debit),
            credit: opt_cell(layout.credit),
        });
    }
    records
}
