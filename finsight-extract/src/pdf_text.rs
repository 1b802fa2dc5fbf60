//! PDF statement extraction.
//!
//! PDFs are flattened to text with pdf-extract, then parsed line by line.
//! A header line announces the transaction table; every later line that
//! looks like `DATE  DESCRIPTION  AMOUNT [BALANCE]` becomes a record, so
//! tables that continue across page breaks are picked up without caring
//! where the pages fall.

use std::sync::LazyLock;

use finsight_core::{ExtractError, RawRecord};
use regex::Regex;

/// Lines scanned for the table header before giving up.
const HEADER_SCAN_LINES: usize = 120;

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bdate\b.*\b(description|payee|merchant|details)\b.*\b(amount|debit|withdrawal)s?\b")
        .expect("header pattern")
});

static ROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^\s*(?P<date>\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4}|\d{1,2}\.\d{1,2}\.\d{4}|[A-Za-z]{3}\s+\d{1,2},\s+\d{4})\s+",
        r"(?P<desc>.+?)\s+",
        r"(?P<polarity>-)?\s*[$€£]?(?P<amt>[\d,]+\.\d{2})",
        r"(?:\s+(?P<balance>-?[\d,]+\.\d{2}))?\s*$"
    ))
    .expect("statement row pattern")
});

pub fn extract_pdf(bytes: &[u8]) -> Result<Vec<RawRecord>, ExtractError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ExtractError::CorruptInput(format!("pdf: {e}")))?;
    parse_statement_text(&text)
}

/// Parse flattened statement text. Split out from the PDF decoding so the
/// row grammar is testable against plain fixtures.
pub fn parse_statement_text(text: &str) -> Result<Vec<RawRecord>, ExtractError> {
    let mut in_table = false;
    let mut records = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        if !in_table {
            if line_no >= HEADER_SCAN_LINES {
                break;
            }
            if HEADER_RE.is_match(line) {
                in_table = true;
            }
            continue;
        }

        if let Some(caps) = ROW_RE.captures(line) {
            let polarity = if caps.name("polarity").is_some() { "-" } else { "" };
            records.push(RawRecord {
                row_index: line_no,
                date: caps["date"].to_string(),
                description: caps["desc"].trim().to_string(),
                amount: Some(format!("{polarity}{}", &caps["amt"])),
                debit: None,
                credit: None,
            });
        }
    }

    if !in_table {
        return Err(ExtractError::SchemaNotFound(HEADER_SCAN_LINES));
    }
    Ok(records)
}
