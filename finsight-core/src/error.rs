//! Error taxonomy for the statement pipeline.
//!
//! Extraction errors are deterministic for a given input and are never
//! retried. Classifier and timeout errors are transient and retried with
//! backoff by the orchestrator. Per-record normalization failures are
//! absorbed into a count and never fail a batch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::transaction::{JobId, UploadId};

/// Extraction failures. Deterministic given the same bytes and format.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported format: {0:?} (expected pdf, csv, or spreadsheet)")]
    UnsupportedFormat(String),

    #[error("corrupt input: {0}")]
    CorruptInput(String),

    #[error("no header row containing date/description/amount found within the first {0} rows")]
    SchemaNotFound(usize),
}

/// A single raw record the normalizer could not turn into a transaction.
/// Reported as a count on the job, never fatal to the batch.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("row {row_index}: {reason}")]
pub struct UnparsableRecord {
    pub row_index: usize,
    pub reason: String,
}

/// Categorization failures. Transient: the backend may come back.
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

/// Orchestration-level errors, including those surfaced directly to callers.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error("stage exceeded its {0:?} budget")]
    StageTimeout(Duration),

    #[error("an active job already exists for upload {0}")]
    DuplicateJob(UploadId),

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("result not ready: job {0} has not completed")]
    NotReady(JobId),

    #[error("job was cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    /// Transient errors qualify for retry in the stages that allow it.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::Classify(ClassifyError::Unavailable(_))
                | PipelineError::StageTimeout(_)
                | PipelineError::Storage(_)
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Extract(ExtractError::UnsupportedFormat(_)) => {
                ErrorKind::UnsupportedFormat
            }
            PipelineError::Extract(ExtractError::CorruptInput(_)) => ErrorKind::CorruptInput,
            PipelineError::Extract(ExtractError::SchemaNotFound(_)) => ErrorKind::SchemaNotFound,
            PipelineError::Classify(ClassifyError::Unavailable(_)) => {
                ErrorKind::ClassifierUnavailable
            }
            PipelineError::StageTimeout(_) => ErrorKind::StageTimeout,
            PipelineError::DuplicateJob(_) => ErrorKind::DuplicateJob,
            PipelineError::JobNotFound(_) => ErrorKind::JobNotFound,
            PipelineError::NotReady(_) => ErrorKind::NotReady,
            PipelineError::Cancelled => ErrorKind::Cancelled,
            PipelineError::Storage(_) => ErrorKind::Storage,
        }
    }
}

/// Flat error classification recorded on failed jobs and exposed in status
/// queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    UnsupportedFormat,
    CorruptInput,
    SchemaNotFound,
    ClassifierUnavailable,
    StageTimeout,
    DuplicateJob,
    JobNotFound,
    NotReady,
    Cancelled,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::UnsupportedFormat => "unsupported-format",
            ErrorKind::CorruptInput => "corrupt-input",
            ErrorKind::SchemaNotFound => "schema-not-found",
            ErrorKind::ClassifierUnavailable => "classifier-unavailable",
            ErrorKind::StageTimeout => "stage-timeout",
            ErrorKind::DuplicateJob => "duplicate-job",
            ErrorKind::JobNotFound => "job-not-found",
            ErrorKind::NotReady => "not-ready",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Storage => "storage",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_errors_are_not_transient() {
        let err = PipelineError::Extract(ExtractError::CorruptInput("truncated".into()));
        assert!(!err.is_transient());
        assert_eq!(err.kind(), ErrorKind::CorruptInput);

        let err = PipelineError::Extract(ExtractError::SchemaNotFound(32));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_classifier_and_timeout_are_transient() {
        let err = PipelineError::Classify(ClassifyError::Unavailable("503".into()));
        assert!(err.is_transient());
        assert_eq!(err.kind(), ErrorKind::ClassifierUnavailable);

        let err = PipelineError::StageTimeout(Duration::from_secs(30));
        assert!(err.is_transient());
    }

    #[test]
    fn test_cancelled_kind() {
        assert_eq!(PipelineError::Cancelled.kind(), ErrorKind::Cancelled);
    }
}
