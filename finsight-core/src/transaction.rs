//! Statement, raw-record and transaction types shared across the pipeline.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::category::Category;
use crate::error::ExtractError;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(UploadId);
id_type!(JobId);
id_type!(TransactionId);

/// Declared input format of an uploaded statement file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    #[serde(rename = "pdf")]
    Pdf,
    #[serde(rename = "csv")]
    Csv,
    #[serde(rename = "spreadsheet")]
    Spreadsheet,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Pdf => "pdf",
            SourceFormat::Csv => "csv",
            SourceFormat::Spreadsheet => "spreadsheet",
        }
    }

    /// Parse a declared format label. Unknown labels are the one place
    /// `UnsupportedFormat` can arise; past this point the format is a
    /// closed tag.
    pub fn parse(label: &str) -> Result<Self, ExtractError> {
        match label.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(SourceFormat::Pdf),
            "csv" => Ok(SourceFormat::Csv),
            "spreadsheet" | "xlsx" | "xls" | "ods" => Ok(SourceFormat::Spreadsheet),
            other => Err(ExtractError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Guess a format from a file extension (CLI convenience).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(SourceFormat::Pdf),
            "csv" => Some(SourceFormat::Csv),
            "xlsx" | "xls" | "ods" => Some(SourceFormat::Spreadsheet),
            _ => None,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded statement file. Immutable once created; owned by the job
/// that processes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementUpload {
    pub id: UploadId,
    /// Owning account reference (label or external id).
    pub account: String,
    pub format: SourceFormat,
    pub byte_size: u64,
    pub uploaded_at: DateTime<Utc>,
}

impl StatementUpload {
    pub fn new(account: impl Into<String>, format: SourceFormat, byte_size: u64) -> Self {
        Self {
            id: UploadId::new(),
            account: account.into(),
            format,
            byte_size,
            uploaded_at: Utc::now(),
        }
    }
}

/// One row extracted verbatim from a statement file. Transient: produced by
/// the extractor, consumed by the normalizer, then discarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Position in document order. Ties on posted date are broken by this.
    pub row_index: usize,
    pub date: String,
    pub description: String,
    /// Single signed-amount column, when the source has one.
    pub amount: Option<String>,
    /// Separate debit/credit columns, when the source has them.
    pub debit: Option<String>,
    pub credit: Option<String>,
}

/// Canonical transaction. Amounts are signed minor units: debit negative,
/// credit positive, for every source format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub upload: UploadId,
    pub posted_date: NaiveDate,
    pub amount_minor: i64,
    /// Merchant name after noise collapse (uppercased, boilerplate stripped).
    pub merchant: String,
    pub raw_description: String,
    /// None until the categorization pass runs.
    pub category: Option<Category>,
    pub category_confidence: f64,
    /// None until the anomaly pass runs.
    pub anomalous: Option<bool>,
    /// Original document position, carried through for stable ordering.
    pub row_index: usize,
}

impl Transaction {
    pub fn is_debit(&self) -> bool {
        self.amount_minor < 0
    }

    pub fn is_credit(&self) -> bool {
        self.amount_minor > 0
    }

    pub fn abs_amount_minor(&self) -> i64 {
        self.amount_minor.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format_labels() {
        assert_eq!(SourceFormat::parse("CSV").unwrap(), SourceFormat::Csv);
        assert_eq!(SourceFormat::parse("xlsx").unwrap(), SourceFormat::Spreadsheet);
        assert!(matches!(
            SourceFormat::parse("docx"),
            Err(ExtractError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(TransactionId::new(), TransactionId::new());
    }

    #[test]
    fn test_sign_helpers() {
        let txn = Transaction {
            id: TransactionId::new(),
            upload: UploadId::new(),
            posted_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            amount_minor: -4250,
            merchant: "COFFEE BAR".to_string(),
            raw_description: "COFFEE BAR #42".to_string(),
            category: None,
            category_confidence: 0.0,
            anomalous: None,
            row_index: 0,
        };
        assert!(txn.is_debit());
        assert!(!txn.is_credit());
        assert_eq!(txn.abs_amount_minor(), 4250);
    }
}
