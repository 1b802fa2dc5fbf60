//! Normalization of extracted raw records into canonical transactions.
//!
//! Bank exports disagree on date formats, sign conventions, and merchant
//! text. Everything after this pass speaks one dialect: dates are
//! `NaiveDate`, amounts are signed minor units (debit negative, credit
//! positive), merchants are uppercased with processor noise stripped.

use chrono::NaiveDate;

use crate::error::UnparsableRecord;
use crate::transaction::{RawRecord, Transaction, TransactionId, UploadId};

/// Accepted date formats, tried in order; the first successful parse wins.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%d %b %Y",
];

/// Tokens banks and processors prepend to merchant text.
const BOILERPLATE_TOKENS: &[&str] = &[
    "POS", "DEBIT", "CREDIT", "PURCHASE", "ACH", "WEB", "ID", "PPD", "REF",
    "TST*", "SQ*", "CKCD", "RECURRING", "CHECKCARD",
];

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Parse an amount string into signed minor units without going through
/// floating point. Handles currency symbols, thousands separators,
/// parenthesized negatives, and trailing CR/DR markers.
pub fn parse_amount_minor(raw: &str) -> Option<i64> {
    let mut text = raw.trim().to_string();
    if text.is_empty() {
        return None;
    }
    let mut negative = false;

    let upper = text.to_ascii_uppercase();
    if let Some(rest) = upper.strip_suffix("CR") {
        text = rest.trim_end().to_string();
    } else if let Some(rest) = upper.strip_suffix("DR") {
        negative = true;
        text = rest.trim_end().to_string();
    }

    if text.starts_with('(') && text.ends_with(')') && text.len() >= 2 {
        negative = true;
        text = text[1..text.len() - 1].trim().to_string();
    }

    let mut cleaned = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '$' | '€' | '£' | ',' | ' ' => {}
            _ => cleaned.push(c),
        }
    }
    if let Some(rest) = cleaned.strip_prefix('+') {
        cleaned = rest.to_string();
    }
    if let Some(rest) = cleaned.strip_prefix('-') {
        negative = true;
        cleaned = rest.to_string();
    }
    if cleaned.is_empty() {
        return None;
    }

    let (whole, frac) = match cleaned.split_once('.') {
        Some((w, f)) => (w, f),
        None => (cleaned.as_str(), ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    // bank exports carry at most two decimal places; anything else is noise
    if frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let cents: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    let minor = whole.checked_mul(100)?.checked_add(cents)?;
    Some(if negative { -minor } else { minor })
}

/// Collapse merchant text: uppercase, drop reference numbers, card-last-4
/// suffixes and processor boilerplate, squeeze whitespace.
pub fn collapse_merchant(raw: &str) -> String {
    let upper = raw.to_ascii_uppercase();
    let mut kept: Vec<&str> = Vec::new();
    for token in upper.split_whitespace() {
        let t = token.trim_matches(|c: char| matches!(c, ',' | ';' | ':'));
        if t.is_empty()
            || is_reference_token(t)
            || is_card_suffix(t)
            || BOILERPLATE_TOKENS.contains(&t)
        {
            continue;
        }
        kept.push(t);
    }
    kept.join(" ")
}

fn is_reference_token(t: &str) -> bool {
    t.len() >= 5 && t.chars().all(|c| c.is_ascii_digit())
}

fn is_card_suffix(t: &str) -> bool {
    if let Some(rest) = t.strip_prefix('*').or_else(|| t.strip_prefix('#')) {
        return rest.len() == 4 && rest.chars().all(|c| c.is_ascii_digit());
    }
    let masked = t.chars().take_while(|c| *c == 'X').count();
    if masked >= 2 {
        let rest = &t[masked..];
        return !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit());
    }
    false
}

/// Output of a normalization pass: the batch that parsed, plus the records
/// that did not (counted on the job, never dropped silently).
#[derive(Debug, Clone)]
pub struct NormalizeOutcome {
    pub transactions: Vec<Transaction>,
    pub skipped: Vec<UnparsableRecord>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize a batch. Unparsable records are excluded from the output
    /// and reported in `skipped`; the batch itself never fails. Output is
    /// sorted by posted date ascending, ties broken by document order.
    pub fn normalize(&self, upload: UploadId, records: &[RawRecord]) -> NormalizeOutcome {
        let mut transactions = Vec::with_capacity(records.len());
        let mut skipped = Vec::new();

        for rec in records {
            match normalize_record(upload, rec) {
                Ok(txn) => transactions.push(txn),
                Err(e) => skipped.push(e),
            }
        }

        transactions.sort_by_key(|t| (t.posted_date, t.row_index));
        NormalizeOutcome {
            transactions,
            skipped,
        }
    }
}

fn normalize_record(upload: UploadId, rec: &RawRecord) -> Result<Transaction, UnparsableRecord> {
    let posted_date = parse_date(&rec.date).ok_or_else(|| UnparsableRecord {
        row_index: rec.row_index,
        reason: format!("unrecognized date {:?}", rec.date),
    })?;

    let amount_minor = amount_from_columns(rec).ok_or_else(|| UnparsableRecord {
        row_index: rec.row_index,
        reason: "no parseable amount".to_string(),
    })?;

    Ok(Transaction {
        id: TransactionId::new(),
        upload,
        posted_date,
        amount_minor,
        merchant: collapse_merchant(&rec.description),
        raw_description: rec.description.trim().to_string(),
        category: None,
        category_confidence: 0.0,
        anomalous: None,
        row_index: rec.row_index,
    })
}

/// Sign resolution: explicit debit/credit columns win over a single signed
/// amount column.
fn amount_from_columns(rec: &RawRecord) -> Option<i64> {
    if let Some(debit) = rec.debit.as_deref().filter(|s| !s.trim().is_empty()) {
        return parse_amount_minor(debit).map(|v| -v.abs());
    }
    if let Some(credit) = rec.credit.as_deref().filter(|s| !s.trim().is_empty()) {
        return parse_amount_minor(credit).map(|v| v.abs());
    }
    rec.amount.as_deref().and_then(parse_amount_minor)
}
