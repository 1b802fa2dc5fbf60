//! finsight-core: domain types and batch-level analysis for statement processing.

pub mod aggregate;
pub mod anomaly;
pub mod category;
pub mod error;
pub mod job;
pub mod normalize;
pub mod transaction;

pub use aggregate::{CategorySummary, StatementSummary, aggregate};
pub use anomaly::{AnomalyConfig, AnomalyDetector, CategoryHistory};
pub use category::Category;
pub use error::{ClassifyError, ErrorKind, ExtractError, PipelineError, UnparsableRecord};
pub use job::{AnalysisJob, AnalysisResult, ErrorDetail, JobStage, JobStatus};
pub use normalize::{NormalizeOutcome, Normalizer};
pub use transaction::{
    JobId, RawRecord, SourceFormat, StatementUpload, Transaction, TransactionId, UploadId,
};
