//! Orchestrator tuning knobs.

use std::time::Duration;

use finsight_core::AnomalyConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent jobs across the worker pool.
    pub max_concurrent_jobs: usize,
    /// Concurrent classifier invocations within one Categorizing stage.
    pub max_concurrent_classifications: usize,
    /// Wall-clock budget applied to each stage independently.
    pub stage_timeout_ms: u64,
    /// Attempts for the stages with external-dependency risk
    /// (Extracting, Categorizing). Other stages get one attempt.
    pub max_stage_attempts: u32,
    /// Base backoff delay; doubles per attempt.
    pub retry_backoff_ms: u64,
    pub anomaly: AnomalyConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            max_concurrent_classifications: 8,
            stage_timeout_ms: 60_000,
            max_stage_attempts: 3,
            retry_backoff_ms: 100,
            anomaly: AnomalyConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }

    /// Exponential backoff: base * 2^(attempt-1).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}
