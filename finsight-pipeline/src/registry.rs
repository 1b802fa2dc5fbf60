//! Process-wide registry of active jobs, keyed by upload.
//!
//! Populated on submit, cleared when a job reaches a terminal stage. This
//! is what makes duplicate submissions for an in-flight statement a
//! rejection rather than a queue.

use std::collections::HashMap;
use std::sync::Mutex;

use finsight_core::{JobId, PipelineError, UploadId};

#[derive(Debug, Default)]
pub struct JobRegistry {
    active: Mutex<HashMap<UploadId, JobId>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the upload for a new job. At most one active run per upload.
    pub fn claim(&self, upload: UploadId, job: JobId) -> Result<(), PipelineError> {
        let mut active = self.lock();
        if active.contains_key(&upload) {
            return Err(PipelineError::DuplicateJob(upload));
        }
        active.insert(upload, job);
        Ok(())
    }

    /// Drop the claim once the job is terminal.
    pub fn release(&self, upload: UploadId) {
        self.lock().remove(&upload);
    }

    pub fn active_job(&self, upload: UploadId) -> Option<JobId> {
        self.lock().get(&upload).copied()
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UploadId, JobId>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_rejected_until_release() {
        let registry = JobRegistry::new();
        let upload = UploadId::new();
        let first = JobId::new();

        registry.claim(upload, first).unwrap();
        assert!(matches!(
            registry.claim(upload, JobId::new()),
            Err(PipelineError::DuplicateJob(_))
        ));
        assert_eq!(registry.active_job(upload), Some(first));

        registry.release(upload);
        assert!(registry.claim(upload, JobId::new()).is_ok());
    }
}
