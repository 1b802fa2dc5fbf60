//! finsight-pipeline: asynchronous orchestration of statement analysis
//! jobs.
//!
//! A job walks Created → Extracting → Normalizing → Categorizing →
//! DetectingAnomalies → Aggregating → Completed, with Failed reachable
//! from any non-terminal stage. Results are all-or-nothing: nothing is
//! persisted unless the whole pipeline finished.

pub mod config;
pub mod pipeline;
pub mod registry;
pub mod store;

pub use config::PipelineConfig;
pub use pipeline::Pipeline;
pub use registry::JobRegistry;
pub use store::{JobStore, MemoryJobStore, MemoryObjectStore, ObjectStore};
