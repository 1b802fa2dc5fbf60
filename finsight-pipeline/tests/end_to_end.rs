//! End-to-end pipeline runs over in-memory stores.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use finsight_classify::{BackendProvider, CategorizationEngine, ClassifierBackend, RuleProvider};
use finsight_core::{
    Category, CategoryHistory, ClassifyError, ErrorKind, JobId, JobStage, JobStatus,
    PipelineError, SourceFormat, StatementUpload, UploadId,
};
use finsight_pipeline::{
    MemoryJobStore, MemoryObjectStore, ObjectStore, Pipeline, PipelineConfig,
};

fn test_config() -> PipelineConfig {
    PipelineConfig {
        retry_backoff_ms: 5,
        ..PipelineConfig::default()
    }
}

fn rules_engine() -> Arc<CategorizationEngine> {
    Arc::new(CategorizationEngine::new(vec![Arc::new(RuleProvider::new())]))
}

fn pipeline_with(
    engine: Arc<CategorizationEngine>,
) -> (Pipeline, Arc<MemoryObjectStore>, Arc<MemoryJobStore>) {
    let objects = Arc::new(MemoryObjectStore::new());
    let store = Arc::new(MemoryJobStore::new());
    let pipeline = Pipeline::new(test_config(), objects.clone(), store.clone(), engine);
    (pipeline, objects, store)
}

async fn submit_csv(
    pipeline: &Pipeline,
    objects: &MemoryObjectStore,
    csv: &str,
) -> (JobId, UploadId) {
    let upload = StatementUpload::new("acct-1", SourceFormat::Csv, csv.len() as u64);
    let upload_id = upload.id;
    objects.put(upload_id, csv.as_bytes().to_vec());
    let job = pipeline.submit_statement(upload).await.expect("submit");
    (job, upload_id)
}

async fn wait_terminal(pipeline: &Pipeline, job: JobId) -> JobStatus {
    for _ in 0..2000 {
        let status = pipeline.job_status(job).expect("status");
        if status.stage.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job never reached a terminal stage");
}

// Scenario: a statement with one unparsable date completes, excluding the
// bad row and reporting it in the count.
#[tokio::test]
async fn test_bad_row_is_counted_not_fatal() {
    let (pipeline, objects, store) = pipeline_with(rules_engine());
    let csv = "Date,Description,Amount\n\
2026-01-05,STARBUCKS STORE 80112,-5.75\n\
not-a-date,GROCERY MART,-20.00\n\
2026-01-06,PAYROLL ACME INC,2500.00\n";
    let (job, _) = submit_csv(&pipeline, &objects, csv).await;

    let status = wait_terminal(&pipeline, job).await;
    assert_eq!(status.stage, JobStage::Completed);
    assert_eq!(status.skipped_records, 1);
    assert!(status.error.is_none());

    let result = pipeline.result(job).expect("result");
    assert_eq!(result.transactions.len(), 2);
    assert_eq!(result.summary.transaction_count, 2);
    assert_eq!(result.transactions[0].category, Some(Category::Food));
    assert_eq!(result.transactions[1].category, Some(Category::Income));
    assert_eq!(result.transactions[1].amount_minor, 250_000);

    // persisted too
    assert!(store.saved_result(job).is_some());
}

// Scenario: an amount far outside its category's history gets flagged.
#[tokio::test]
async fn test_outlier_flagged_against_history() {
    let (pipeline, objects, _store) = pipeline_with(rules_engine());
    let mut history = CategoryHistory::new();
    for _ in 0..10 {
        history.record(Category::Food, 1_000, "STARBUCKS");
    }
    pipeline.seed_history(history);

    let csv = "Date,Description,Amount\n\
2026-01-05,STARBUCKS,-500.00\n\
2026-01-06,STARBUCKS,-9.50\n";
    let (job, _) = submit_csv(&pipeline, &objects, csv).await;

    let status = wait_terminal(&pipeline, job).await;
    assert_eq!(status.stage, JobStage::Completed);

    let result = pipeline.result(job).expect("result");
    assert_eq!(result.anomalies.len(), 1);
    let flagged = result
        .transactions
        .iter()
        .find(|t| t.anomalous == Some(true))
        .expect("one flagged transaction");
    assert_eq!(flagged.amount_minor, -50_000);
}

// Scenario: duplicate submission for an active upload is rejected and the
// original job is unaffected.
#[tokio::test]
async fn test_duplicate_submission_rejected() {
    struct SlowStore {
        inner: Arc<MemoryObjectStore>,
    }

    #[async_trait]
    impl ObjectStore for SlowStore {
        async fn fetch_file(&self, id: UploadId) -> Result<Vec<u8>, PipelineError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.inner.fetch_file(id).await
        }
    }

    let objects = Arc::new(MemoryObjectStore::new());
    let store = Arc::new(MemoryJobStore::new());
    let pipeline = Pipeline::new(
        test_config(),
        Arc::new(SlowStore {
            inner: objects.clone(),
        }),
        store.clone(),
        rules_engine(),
    );

    let csv = "Date,Description,Amount\n2026-01-05,STARBUCKS,-5.75\n";
    let upload = StatementUpload::new("acct-1", SourceFormat::Csv, csv.len() as u64);
    objects.put(upload.id, csv.as_bytes().to_vec());

    let job = pipeline.submit_statement(upload.clone()).await.expect("submit");
    let dup = pipeline.submit_statement(upload).await;
    assert!(matches!(dup, Err(PipelineError::DuplicateJob(_))));

    let status = wait_terminal(&pipeline, job).await;
    assert_eq!(status.stage, JobStage::Completed);

    // the upload is free again once the job is terminal
    assert_eq!(pipeline.active_jobs(), 0);
}

// Scenario: classifier down for every retry attempt fails the job with the
// backend error kind and persists nothing.
#[tokio::test]
async fn test_classifier_outage_fails_job_without_result() {
    struct DownBackend {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ClassifierBackend for DownBackend {
        async fn classify(&self, _: &str, _: &str) -> Result<(String, f64), ClassifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ClassifyError::Unavailable("timed out".to_string()))
        }
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let engine = Arc::new(CategorizationEngine::new(vec![
        Arc::new(RuleProvider::new()),
        Arc::new(BackendProvider::new(DownBackend {
            calls: calls.clone(),
        })),
    ]));
    let (pipeline, objects, store) = pipeline_with(engine);

    // merchant no rule matches, so the backend is consulted
    let csv = "Date,Description,Amount\n2026-01-05,ZZYZX HOLDINGS,-12.00\n";
    let (job, _) = submit_csv(&pipeline, &objects, csv).await;

    let status = wait_terminal(&pipeline, job).await;
    assert_eq!(status.stage, JobStage::Failed);
    let error = status.error.expect("error detail");
    assert_eq!(error.stage, JobStage::Categorizing);
    assert_eq!(error.kind, ErrorKind::ClassifierUnavailable);

    // one transaction, three stage attempts
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    assert!(matches!(
        pipeline.result(job),
        Err(PipelineError::NotReady(_))
    ));
    assert!(store.saved_result(job).is_none());
}

// Cancellation transitions to Failed with the Cancelled kind and discards
// in-flight work.
#[tokio::test]
async fn test_cancellation_discards_work() {
    struct StallBackend;

    #[async_trait]
    impl ClassifierBackend for StallBackend {
        async fn classify(&self, _: &str, _: &str) -> Result<(String, f64), ClassifyError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(("food".to_string(), 0.9))
        }
    }

    let engine = Arc::new(CategorizationEngine::new(vec![Arc::new(
        BackendProvider::new(StallBackend),
    )]));
    let (pipeline, objects, store) = pipeline_with(engine);

    let csv = "Date,Description,Amount\n2026-01-05,ZZYZX HOLDINGS,-12.00\n";
    let (job, _) = submit_csv(&pipeline, &objects, csv).await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    pipeline.cancel(job).expect("cancel");

    let status = wait_terminal(&pipeline, job).await;
    assert_eq!(status.stage, JobStage::Failed);
    assert_eq!(status.error.expect("detail").kind, ErrorKind::Cancelled);
    assert!(store.saved_result(job).is_none());
    assert_eq!(pipeline.active_jobs(), 0);
}

// A provider chain with no opinion still completes: total coverage via the
// Uncategorized floor.
#[tokio::test]
async fn test_unknown_merchants_complete_uncategorized() {
    let (pipeline, objects, _store) = pipeline_with(rules_engine());
    let csv = "Date,Description,Amount\n2026-01-05,ZZYZX HOLDINGS,-12.00\n";
    let (job, _) = submit_csv(&pipeline, &objects, csv).await;

    let status = wait_terminal(&pipeline, job).await;
    assert_eq!(status.stage, JobStage::Completed);
    let result = pipeline.result(job).expect("result");
    assert_eq!(
        result.transactions[0].category,
        Some(Category::Uncategorized)
    );
    assert_eq!(result.transactions[0].category_confidence, 0.0);
}
