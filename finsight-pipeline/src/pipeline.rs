//! The job orchestrator: one asynchronous state machine per statement.
//!
//! Stages run strictly in sequence within a job; jobs run concurrently
//! across a bounded pool. Stage and entry timestamp always change together
//! under one lock, the durable store is notified after. The two stages
//! with external-dependency risk (Extracting, Categorizing) retry
//! transient failures with exponential backoff; extraction errors are
//! deterministic and never retried.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use finsight_classify::CategorizationEngine;
use finsight_core::{
    AnalysisJob, AnalysisResult, AnomalyDetector, Category, CategoryHistory, ClassifyError,
    ErrorDetail, JobId, JobStage, JobStatus, Normalizer, PipelineError, StatementUpload,
    Transaction, aggregate,
};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::registry::JobRegistry;
use crate::store::{JobStore, ObjectStore};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct JobEntry {
    job: AnalysisJob,
    cancel: watch::Sender<bool>,
    result: Option<Arc<AnalysisResult>>,
}

struct Inner {
    config: PipelineConfig,
    objects: Arc<dyn ObjectStore>,
    store: Arc<dyn JobStore>,
    engine: Arc<CategorizationEngine>,
    registry: JobRegistry,
    jobs: Mutex<HashMap<JobId, JobEntry>>,
    history: Mutex<CategoryHistory>,
    job_slots: Arc<Semaphore>,
    class_slots: Arc<Semaphore>,
    normalizer: Normalizer,
    detector: AnomalyDetector,
}

/// Handle for submitting statements and querying jobs. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        objects: Arc<dyn ObjectStore>,
        store: Arc<dyn JobStore>,
        engine: Arc<CategorizationEngine>,
    ) -> Self {
        let detector = AnomalyDetector::new(config.anomaly.clone());
        let job_slots = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        let class_slots = Arc::new(Semaphore::new(config.max_concurrent_classifications.max(1)));
        Self {
            inner: Arc::new(Inner {
                config,
                objects,
                store,
                engine,
                registry: JobRegistry::new(),
                jobs: Mutex::new(HashMap::new()),
                history: Mutex::new(CategoryHistory::new()),
                job_slots,
                class_slots,
                normalizer: Normalizer::new(),
                detector,
            }),
        }
    }

    /// Enqueue a new analysis job for an upload. Rejects with
    /// `DuplicateJob` while a job for the same upload is still active.
    pub async fn submit_statement(&self, upload: StatementUpload) -> Result<JobId, PipelineError> {
        let job = AnalysisJob::new(upload);
        let job_id = job.id;
        let upload_id = job.upload.id;

        self.inner.registry.claim(upload_id, job_id)?;
        if let Err(e) = self.inner.store.create_job(&job).await {
            self.inner.registry.release(upload_id);
            return Err(e);
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        lock(&self.inner.jobs).insert(
            job_id,
            JobEntry {
                job,
                cancel: cancel_tx,
                result: None,
            },
        );

        tokio::spawn(run_job(self.inner.clone(), job_id, cancel_rx));
        info!(job = %job_id, upload = %upload_id, "statement submitted");
        Ok(job_id)
    }

    /// Read-only stage snapshot. Never blocks on pipeline work; failed jobs
    /// stay queryable indefinitely.
    pub fn job_status(&self, id: JobId) -> Result<JobStatus, PipelineError> {
        lock(&self.inner.jobs)
            .get(&id)
            .map(|entry| entry.job.status())
            .ok_or(PipelineError::JobNotFound(id))
    }

    /// The completed result, or `NotReady` for any non-`Completed` stage.
    pub fn result(&self, id: JobId) -> Result<Arc<AnalysisResult>, PipelineError> {
        let jobs = lock(&self.inner.jobs);
        let entry = jobs.get(&id).ok_or(PipelineError::JobNotFound(id))?;
        match (entry.job.stage, &entry.result) {
            (JobStage::Completed, Some(result)) => Ok(result.clone()),
            _ => Err(PipelineError::NotReady(id)),
        }
    }

    /// Request cancellation. No-op for jobs already terminal; in-flight
    /// classifier results are discarded, never written.
    pub fn cancel(&self, id: JobId) -> Result<(), PipelineError> {
        let jobs = lock(&self.inner.jobs);
        let entry = jobs.get(&id).ok_or(PipelineError::JobNotFound(id))?;
        if !entry.job.stage.is_terminal() {
            let _ = entry.cancel.send(true);
        }
        Ok(())
    }

    pub fn active_jobs(&self) -> usize {
        self.inner.registry.active_count()
    }

    /// Replace the anomaly history (prior statements for the account).
    pub fn seed_history(&self, history: CategoryHistory) {
        *lock(&self.inner.history) = history;
    }
}

async fn run_job(inner: Arc<Inner>, job_id: JobId, mut cancel: watch::Receiver<bool>) {
    let Ok(_permit) = inner.job_slots.clone().acquire_owned().await else {
        return;
    };

    match drive(&inner, job_id, &mut cancel).await {
        Ok(result) => {
            if *cancel.borrow() {
                finish_failed(&inner, job_id, JobStage::Aggregating, PipelineError::Cancelled)
                    .await;
                return;
            }
            finish_completed(&inner, job_id, result).await;
        }
        Err((stage, err)) => finish_failed(&inner, job_id, stage, err).await,
    }
}

/// Run every stage in order. Returns the stage that failed alongside the
/// error so the job record can say where it died.
async fn drive(
    inner: &Arc<Inner>,
    job_id: JobId,
    cancel: &mut watch::Receiver<bool>,
) -> Result<AnalysisResult, (JobStage, PipelineError)> {
    let upload = lock(&inner.jobs)
        .get(&job_id)
        .map(|entry| entry.job.upload.clone())
        .ok_or((JobStage::Created, PipelineError::JobNotFound(job_id)))?;

    // Extracting: object storage + format parsing. Retried on transient
    // storage trouble; parse errors are final.
    transition(inner, job_id, JobStage::Extracting)
        .await
        .map_err(|e| (JobStage::Extracting, e))?;
    let records = {
        let objects = inner.objects.clone();
        let upload_id = upload.id;
        let format = upload.format;
        run_stage(inner, cancel, true, move || {
            let objects = objects.clone();
            async move {
                let bytes = objects.fetch_file(upload_id).await?;
                Ok(finsight_extract::extract(&bytes, format)?)
            }
        })
        .await
        .map_err(|e| (JobStage::Extracting, e))?
    };

    // Normalizing: pure compute; per-record failures become a count.
    transition(inner, job_id, JobStage::Normalizing)
        .await
        .map_err(|e| (JobStage::Normalizing, e))?;
    let outcome = {
        let normalizer = inner.normalizer;
        let upload_id = upload.id;
        run_stage(inner, cancel, false, move || {
            let records = records.clone();
            async move { Ok(normalizer.normalize(upload_id, &records)) }
        })
        .await
        .map_err(|e| (JobStage::Normalizing, e))?
    };
    if !outcome.skipped.is_empty() {
        warn!(
            job = %job_id,
            skipped = outcome.skipped.len(),
            "unparsable records excluded from batch"
        );
        if let Some(entry) = lock(&inner.jobs).get_mut(&job_id) {
            entry.job.skipped_records = outcome.skipped.len() as u32;
        }
    }

    // Categorizing: fan out across the classifier pool, reassemble in
    // document order before the anomaly pass.
    transition(inner, job_id, JobStage::Categorizing)
        .await
        .map_err(|e| (JobStage::Categorizing, e))?;
    let categorized = {
        let engine = inner.engine.clone();
        let slots = inner.class_slots.clone();
        let txns = outcome.transactions;
        run_stage(inner, cancel, true, move || {
            let engine = engine.clone();
            let slots = slots.clone();
            let txns = txns.clone();
            async move { categorize_batch(engine, slots, txns).await }
        })
        .await
        .map_err(|e| (JobStage::Categorizing, e))?
    };

    // DetectingAnomalies.
    transition(inner, job_id, JobStage::DetectingAnomalies)
        .await
        .map_err(|e| (JobStage::DetectingAnomalies, e))?;
    check_cancel(cancel).map_err(|e| (JobStage::DetectingAnomalies, e))?;
    let mut categorized = categorized;
    let flagged = {
        let history = lock(&inner.history);
        inner.detector.detect(&categorized, &history)
    };
    for txn in &mut categorized {
        txn.anomalous = Some(flagged.contains(&txn.id));
    }

    // Aggregating.
    transition(inner, job_id, JobStage::Aggregating)
        .await
        .map_err(|e| (JobStage::Aggregating, e))?;
    check_cancel(cancel).map_err(|e| (JobStage::Aggregating, e))?;
    let summary = aggregate(&categorized);
    let anomalies = categorized
        .iter()
        .filter(|t| t.anomalous == Some(true))
        .map(|t| t.id)
        .collect();

    Ok(AnalysisResult {
        job: job_id,
        transactions: categorized,
        summary,
        anomalies,
    })
}

/// One stage attempt loop: budget per attempt, bounded retries with
/// exponential backoff for retryable stages, late results discarded once
/// the job is cancelled.
async fn run_stage<T, F, Fut>(
    inner: &Inner,
    cancel: &mut watch::Receiver<bool>,
    retryable: bool,
    mut op: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let max_attempts = if retryable {
        inner.config.max_stage_attempts.max(1)
    } else {
        1
    };
    let budget = inner.config.stage_timeout();
    let mut attempt = 1u32;

    loop {
        check_cancel(cancel)?;
        let err = match tokio::time::timeout(budget, op()).await {
            Ok(Ok(value)) => {
                check_cancel(cancel)?;
                return Ok(value);
            }
            Ok(Err(e)) => e,
            Err(_) => PipelineError::StageTimeout(budget),
        };
        if attempt >= max_attempts || !err.is_transient() {
            return Err(err);
        }
        warn!(attempt, error = %err, "transient stage failure; backing off");
        tokio::time::sleep(inner.config.backoff_delay(attempt)).await;
        attempt += 1;
    }
}

/// Categorize every transaction concurrently under the classifier-slot
/// bound, then stitch the answers back in original order. Any backend
/// failure fails the whole stage; remaining in-flight calls are dropped.
async fn categorize_batch(
    engine: Arc<CategorizationEngine>,
    slots: Arc<Semaphore>,
    txns: Vec<Transaction>,
) -> Result<Vec<Transaction>, PipelineError> {
    let mut set: JoinSet<Result<(usize, Category, f64), ClassifyError>> = JoinSet::new();
    for (idx, txn) in txns.iter().cloned().enumerate() {
        let engine = engine.clone();
        let slots = slots.clone();
        set.spawn(async move {
            let _permit = slots
                .acquire_owned()
                .await
                .map_err(|_| ClassifyError::Unavailable("classifier pool closed".to_string()))?;
            let (category, confidence) = engine.categorize(&txn).await?;
            Ok((idx, category, confidence))
        });
    }

    let mut answers: Vec<Option<(Category, f64)>> = vec![None; txns.len()];
    while let Some(joined) = set.join_next().await {
        let (idx, category, confidence) = joined
            .map_err(|e| PipelineError::Storage(format!("classification task: {e}")))??;
        answers[idx] = Some((category, confidence));
    }

    let mut out = txns;
    for (txn, answer) in out.iter_mut().zip(answers) {
        let (category, confidence) = answer
            .ok_or_else(|| PipelineError::Storage("missing classification".to_string()))?;
        txn.category = Some(category);
        txn.category_confidence = confidence;
    }
    Ok(out)
}

fn check_cancel(cancel: &watch::Receiver<bool>) -> Result<(), PipelineError> {
    if *cancel.borrow() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Atomic stage advance: stage and entry timestamp change together under
/// the jobs lock, then the durable store is brought up to date.
async fn transition(inner: &Inner, job_id: JobId, stage: JobStage) -> Result<(), PipelineError> {
    let at = Utc::now();
    {
        let mut jobs = lock(&inner.jobs);
        let entry = jobs
            .get_mut(&job_id)
            .ok_or(PipelineError::JobNotFound(job_id))?;
        if !entry.job.transition(stage, at) {
            return Err(PipelineError::Storage(format!(
                "illegal transition {} -> {}",
                entry.job.stage.as_str(),
                stage.as_str()
            )));
        }
    }
    info!(job = %job_id, stage = stage.as_str(), "stage entered");
    inner.store.update_job_stage(job_id, stage, at).await
}

async fn finish_completed(inner: &Arc<Inner>, job_id: JobId, result: AnalysisResult) {
    let result = Arc::new(result);
    if let Err(e) = inner.store.save_result(&result).await {
        finish_failed(inner, job_id, JobStage::Aggregating, e).await;
        return;
    }

    let at = Utc::now();
    let upload_id = {
        let mut jobs = lock(&inner.jobs);
        jobs.get_mut(&job_id).map(|entry| {
            entry.job.transition(JobStage::Completed, at);
            entry.result = Some(result.clone());
            entry.job.upload.id
        })
    };
    let _ = inner.store.update_job_stage(job_id, JobStage::Completed, at).await;

    lock(&inner.history).absorb(&result.transactions);
    if let Some(upload_id) = upload_id {
        inner.registry.release(upload_id);
    }
    info!(
        job = %job_id,
        transactions = result.transactions.len(),
        anomalies = result.anomalies.len(),
        "job completed"
    );
}

/// Terminal failure: record which stage died and why, discard partial
/// work, free the upload for a fresh submission.
async fn finish_failed(inner: &Arc<Inner>, job_id: JobId, stage: JobStage, err: PipelineError) {
    let at = Utc::now();
    let kind = err.kind();
    let upload_id = {
        let mut jobs = lock(&inner.jobs);
        jobs.get_mut(&job_id).map(|entry| {
            entry.job.error = Some(ErrorDetail {
                stage,
                kind,
                message: err.to_string(),
            });
            entry.job.transition(JobStage::Failed, at);
            entry.job.upload.id
        })
    };
    let _ = inner.store.update_job_stage(job_id, JobStage::Failed, at).await;

    if let Some(upload_id) = upload_id {
        inner.registry.release(upload_id);
    }
    warn!(job = %job_id, stage = stage.as_str(), %kind, "job failed");
}
