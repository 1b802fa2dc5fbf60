//! Provider-chain categorization engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use finsight_core::{Category, ClassifyError, Transaction};

/// A provider's answer wins outright at or above this confidence.
pub const CONFIDENCE_THRESHOLD: f64 = 0.9;

/// One link in the categorization chain.
#[async_trait]
pub trait CategoryProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means "no opinion"; errors are transient backend
    /// failures and bubble up for the orchestrator to retry.
    async fn categorize(
        &self,
        txn: &Transaction,
    ) -> Result<Option<(Category, f64)>, ClassifyError>;
}

/// Queries providers in order. The first answer at or above the threshold
/// wins; otherwise the latest below-threshold answer stands; otherwise
/// `Uncategorized` with zero confidence. Total for any well-formed
/// transaction.
///
/// Categorization is a pure function of (merchant, reference data), so
/// results are cached by merchant key.
pub struct CategorizationEngine {
    providers: Vec<Arc<dyn CategoryProvider>>,
    cache: Mutex<HashMap<String, (Category, f64)>>,
}

impl CategorizationEngine {
    pub fn new(providers: Vec<Arc<dyn CategoryProvider>>) -> Self {
        Self {
            providers,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn categorize(&self, txn: &Transaction) -> Result<(Category, f64), ClassifyError> {
        if !txn.merchant.is_empty() {
            if let Ok(cache) = self.cache.lock() {
                if let Some(hit) = cache.get(&txn.merchant) {
                    return Ok(*hit);
                }
            }
        }

        let mut candidate: Option<(Category, f64)> = None;
        for provider in &self.providers {
            if let Some((category, confidence)) = provider.categorize(txn).await? {
                if confidence >= CONFIDENCE_THRESHOLD {
                    self.remember(&txn.merchant, (category, confidence));
                    return Ok((category, confidence));
                }
                candidate = Some((category, confidence));
            }
        }

        let out = candidate.unwrap_or((Category::Uncategorized, 0.0));
        self.remember(&txn.merchant, out);
        Ok(out)
    }

    fn remember(&self, merchant: &str, answer: (Category, f64)) {
        if merchant.is_empty() {
            return;
        }
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(merchant.to_string(), answer);
        }
    }
}
