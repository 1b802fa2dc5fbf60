//! External collaborator boundaries: object storage for uploaded files and
//! durable persistence for jobs and results.
//!
//! The orchestrator is written against these traits only; the in-memory
//! implementations back tests and the local CLI.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use finsight_core::{AnalysisJob, AnalysisResult, JobId, JobStage, PipelineError, UploadId};

/// Source of uploaded statement bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn fetch_file(&self, id: UploadId) -> Result<Vec<u8>, PipelineError>;
}

/// Durable job/result persistence. Assumed strongly consistent per job id.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &AnalysisJob) -> Result<(), PipelineError>;
    async fn update_job_stage(
        &self,
        id: JobId,
        stage: JobStage,
        at: DateTime<Utc>,
    ) -> Result<(), PipelineError>;
    async fn save_result(&self, result: &AnalysisResult) -> Result<(), PipelineError>;
    async fn load_job(&self, id: JobId) -> Result<AnalysisJob, PipelineError>;
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory object store.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    files: Mutex<HashMap<UploadId, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, id: UploadId, bytes: Vec<u8>) {
        lock(&self.files).insert(id, bytes);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch_file(&self, id: UploadId) -> Result<Vec<u8>, PipelineError> {
        lock(&self.files)
            .get(&id)
            .cloned()
            .ok_or_else(|| PipelineError::Storage(format!("no uploaded file for {id}")))
    }
}

/// In-memory job store.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, AnalysisJob>>,
    results: Mutex<HashMap<JobId, AnalysisResult>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/CLI accessor for a persisted result.
    pub fn saved_result(&self, id: JobId) -> Option<AnalysisResult> {
        lock(&self.results).get(&id).cloned()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &AnalysisJob) -> Result<(), PipelineError> {
        lock(&self.jobs).insert(job.id, job.clone());
        Ok(())
    }

    async fn update_job_stage(
        &self,
        id: JobId,
        stage: JobStage,
        at: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let mut jobs = lock(&self.jobs);
        let job = jobs
            .get_mut(&id)
            .ok_or(PipelineError::JobNotFound(id))?;
        job.stage = stage;
        job.stage_history.push((stage, at));
        Ok(())
    }

    async fn save_result(&self, result: &AnalysisResult) -> Result<(), PipelineError> {
        lock(&self.results).insert(result.job, result.clone());
        Ok(())
    }

    async fn load_job(&self, id: JobId) -> Result<AnalysisJob, PipelineError> {
        lock(&self.jobs)
            .get(&id)
            .cloned()
            .ok_or(PipelineError::JobNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finsight_core::{SourceFormat, StatementUpload};

    #[tokio::test]
    async fn test_object_store_round_trip() {
        let store = MemoryObjectStore::new();
        let id = UploadId::new();
        store.put(id, b"bytes".to_vec());
        assert_eq!(store.fetch_file(id).await.unwrap(), b"bytes");
        assert!(store.fetch_file(UploadId::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_job_store_stage_updates() {
        let store = MemoryJobStore::new();
        let job = AnalysisJob::new(StatementUpload::new("acct", SourceFormat::Csv, 10));
        store.create_job(&job).await.unwrap();

        store
            .update_job_stage(job.id, JobStage::Extracting, Utc::now())
            .await
            .unwrap();
        let loaded = store.load_job(job.id).await.unwrap();
        assert_eq!(loaded.stage, JobStage::Extracting);
        assert_eq!(loaded.stage_history.len(), 2);
    }
}
