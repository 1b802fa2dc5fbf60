//! Analysis job state machine and the immutable result it produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::StatementSummary;
use crate::error::ErrorKind;
use crate::transaction::{JobId, StatementUpload, Transaction, TransactionId};

/// Pipeline stages, in order. Transitions are one-directional; `Failed` is
/// reachable from any non-terminal stage and nothing leaves a terminal
/// stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStage {
    Created,
    Extracting,
    Normalizing,
    Categorizing,
    DetectingAnomalies,
    Aggregating,
    Completed,
    Failed,
}

impl JobStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Completed | JobStage::Failed)
    }

    fn order(&self) -> u8 {
        match self {
            JobStage::Created => 0,
            JobStage::Extracting => 1,
            JobStage::Normalizing => 2,
            JobStage::Categorizing => 3,
            JobStage::DetectingAnomalies => 4,
            JobStage::Aggregating => 5,
            JobStage::Completed => 6,
            JobStage::Failed => 7,
        }
    }

    /// Legal successor check: strictly forward, or `Failed` from any
    /// non-terminal stage.
    pub fn can_transition_to(&self, next: JobStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobStage::Failed => true,
            JobStage::Created => false,
            _ => next.order() == self.order() + 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Created => "created",
            JobStage::Extracting => "extracting",
            JobStage::Normalizing => "normalizing",
            JobStage::Categorizing => "categorizing",
            JobStage::DetectingAnomalies => "detecting-anomalies",
            JobStage::Aggregating => "aggregating",
            JobStage::Completed => "completed",
            JobStage::Failed => "failed",
        }
    }
}

/// What went wrong, and where, recorded on a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub stage: JobStage,
    pub kind: ErrorKind,
    pub message: String,
}

/// One end-to-end processing run for a single statement. Mutated only by
/// the orchestrator; stage and timestamp always change together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: JobId,
    pub upload: StatementUpload,
    pub stage: JobStage,
    /// Unparsable records absorbed during normalization.
    pub skipped_records: u32,
    pub error: Option<ErrorDetail>,
    /// Entry timestamp for every stage reached, in transition order.
    pub stage_history: Vec<(JobStage, DateTime<Utc>)>,
}

impl AnalysisJob {
    pub fn new(upload: StatementUpload) -> Self {
        Self {
            id: JobId::new(),
            upload,
            stage: JobStage::Created,
            skipped_records: 0,
            error: None,
            stage_history: vec![(JobStage::Created, Utc::now())],
        }
    }

    /// Advance to `next`, stamping the entry time. Illegal transitions,
    /// including anything out of a terminal stage, are rejected.
    pub fn transition(&mut self, next: JobStage, at: DateTime<Utc>) -> bool {
        if !self.stage.can_transition_to(next) {
            return false;
        }
        self.stage = next;
        self.stage_history.push((next, at));
        true
    }

    pub fn entered_at(&self, stage: JobStage) -> Option<DateTime<Utc>> {
        self.stage_history
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, at)| *at)
    }

    /// Wall-clock seconds from first processing stage to terminal stage.
    pub fn processing_secs(&self) -> Option<f64> {
        let start = self.entered_at(JobStage::Extracting)?;
        let end = self
            .entered_at(JobStage::Completed)
            .or_else(|| self.entered_at(JobStage::Failed))?;
        Some((end - start).num_milliseconds() as f64 / 1000.0)
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            id: self.id,
            stage: self.stage,
            skipped_records: self.skipped_records,
            error: self.error.clone(),
        }
    }
}

/// Read-only snapshot handed to status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub stage: JobStage,
    pub skipped_records: u32,
    pub error: Option<ErrorDetail>,
}

/// Final output of a completed pipeline run. Created once, immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub job: JobId,
    /// Categorized transactions in posted-date order.
    pub transactions: Vec<Transaction>,
    pub summary: StatementSummary,
    pub anomalies: Vec<TransactionId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::SourceFormat;

    fn job() -> AnalysisJob {
        AnalysisJob::new(StatementUpload::new("acct-1", SourceFormat::Csv, 128))
    }

    #[test]
    fn test_forward_transitions_only() {
        let mut j = job();
        assert!(j.transition(JobStage::Extracting, Utc::now()));
        assert!(j.transition(JobStage::Normalizing, Utc::now()));
        // no skipping ahead, no going back
        assert!(!j.transition(JobStage::Aggregating, Utc::now()));
        assert!(!j.transition(JobStage::Extracting, Utc::now()));
        assert_eq!(j.stage, JobStage::Normalizing);
    }

    #[test]
    fn test_failed_reachable_from_any_nonterminal() {
        let mut j = job();
        assert!(j.transition(JobStage::Extracting, Utc::now()));
        assert!(j.transition(JobStage::Failed, Utc::now()));
        // terminal is sticky
        assert!(!j.transition(JobStage::Normalizing, Utc::now()));
        assert!(!j.transition(JobStage::Completed, Utc::now()));
    }

    #[test]
    fn test_stage_history_records_entry_times() {
        let mut j = job();
        j.transition(JobStage::Extracting, Utc::now());
        j.transition(JobStage::Normalizing, Utc::now());
        assert_eq!(j.stage_history.len(), 3);
        assert!(j.entered_at(JobStage::Extracting).is_some());
        assert!(j.entered_at(JobStage::Completed).is_none());
    }
}
