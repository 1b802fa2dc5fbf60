//! Statistical anomaly flagging over categorized transactions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::category::Category;
use crate::transaction::{Transaction, TransactionId};

/// Thresholds for the detector. Defaults match the product constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// A category needs this many samples before statistical flagging
    /// applies to it at all.
    pub min_samples: usize,
    /// Flag when |amount| exceeds mean + multiplier * stddev.
    pub stddev_multiplier: f64,
    /// First-ever transactions for unseen merchants above this absolute
    /// amount (minor units) are flagged.
    pub new_merchant_threshold_minor: i64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            min_samples: 3,
            stddev_multiplier: 3.0,
            new_merchant_threshold_minor: 50_000,
        }
    }
}

/// Historical spending pattern for one account: absolute amounts per
/// category plus the set of merchants seen before. Fed back from completed
/// jobs; empty for a first statement, in which case the current batch
/// supplies the statistics.
#[derive(Debug, Clone, Default)]
pub struct CategoryHistory {
    amounts: HashMap<Category, Vec<i64>>,
    merchants: HashSet<String>,
}

impl CategoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, category: Category, abs_amount_minor: i64, merchant: &str) {
        self.amounts.entry(category).or_default().push(abs_amount_minor);
        if !merchant.is_empty() {
            self.merchants.insert(merchant.to_string());
        }
    }

    /// Fold a completed, categorized batch into the history.
    pub fn absorb(&mut self, transactions: &[Transaction]) {
        for txn in transactions {
            let category = txn.category.unwrap_or(Category::Uncategorized);
            self.record(category, txn.abs_amount_minor(), &txn.merchant);
        }
    }

    pub fn samples(&self, category: Category) -> &[i64] {
        self.amounts.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn knows_merchant(&self, merchant: &str) -> bool {
        self.merchants.contains(merchant)
    }

    pub fn has_merchants(&self) -> bool {
        !self.merchants.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    /// Flag transactions inconsistent with the account's pattern. Returns
    /// the ids of flagged transactions; callers set `Transaction.anomalous`
    /// for the whole batch from this set.
    ///
    /// Categories with fewer than `min_samples` observations yield no
    /// statistical flags. The unseen-merchant rule only applies once a
    /// merchant history exists, so a first statement never flags on it.
    pub fn detect(
        &self,
        transactions: &[Transaction],
        history: &CategoryHistory,
    ) -> BTreeSet<TransactionId> {
        let mut flagged = BTreeSet::new();

        // Per-category stats: history wins; a first statement falls back to
        // the current batch.
        let mut stats: HashMap<Category, (f64, f64, usize)> = HashMap::new();
        for txn in transactions {
            let category = txn.category.unwrap_or(Category::Uncategorized);
            stats.entry(category).or_insert_with(|| {
                let hist = history.samples(category);
                if hist.is_empty() {
                    let batch: Vec<i64> = transactions
                        .iter()
                        .filter(|t| t.category.unwrap_or(Category::Uncategorized) == category)
                        .map(|t| t.abs_amount_minor())
                        .collect();
                    mean_stddev(&batch)
                } else {
                    mean_stddev(hist)
                }
            });
        }

        for txn in transactions {
            let category = txn.category.unwrap_or(Category::Uncategorized);
            let amount = txn.abs_amount_minor() as f64;

            if let Some(&(mean, stddev, n)) = stats.get(&category) {
                if n >= self.config.min_samples
                    && amount > mean + self.config.stddev_multiplier * stddev
                {
                    flagged.insert(txn.id);
                    continue;
                }
            }

            if history.has_merchants()
                && !history.knows_merchant(&txn.merchant)
                && txn.abs_amount_minor() > self.config.new_merchant_threshold_minor
            {
                flagged.insert(txn.id);
            }
        }

        flagged
    }
}

fn mean_stddev(samples: &[i64]) -> (f64, f64, usize) {
    let n = samples.len();
    if n == 0 {
        return (0.0, 0.0, 0);
    }
    let mean = samples.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let variance = samples
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;
    (mean, variance.sqrt(), n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::UploadId;
    use chrono::NaiveDate;

    fn txn(amount_minor: i64, category: Category, merchant: &str) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            upload: UploadId::new(),
            posted_date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            amount_minor,
            merchant: merchant.to_string(),
            raw_description: merchant.to_string(),
            category: Some(category),
            category_confidence: 0.95,
            anomalous: None,
            row_index: 0,
        }
    }

    #[test]
    fn test_sparse_category_never_flags() {
        let detector = AnomalyDetector::default();
        let history = CategoryHistory::new();
        // two food samples only, one wildly large
        let batch = vec![
            txn(-500, Category::Food, "COFFEE BAR"),
            txn(-9_000_000, Category::Food, "COFFEE BAR"),
        ];
        assert!(detector.detect(&batch, &history).is_empty());
    }

    #[test]
    fn test_outlier_against_history_is_flagged() {
        let detector = AnomalyDetector::default();
        let mut history = CategoryHistory::new();
        for _ in 0..10 {
            history.record(Category::Food, 1_000, "COFFEE BAR");
        }
        let big = txn(-50_000, Category::Food, "COFFEE BAR");
        let batch = vec![txn(-900, Category::Food, "COFFEE BAR"), big.clone()];
        let flagged = detector.detect(&batch, &history);
        assert!(flagged.contains(&big.id));
        assert_eq!(flagged.len(), 1);
    }

    #[test]
    fn test_first_statement_uses_batch_stats() {
        let detector = AnomalyDetector::default();
        let history = CategoryHistory::new();
        let mut batch: Vec<Transaction> = (0..10)
            .map(|_| txn(-1_000, Category::Food, "COFFEE BAR"))
            .collect();
        let big = txn(-100_000, Category::Food, "COFFEE BAR");
        batch.push(big.clone());
        let flagged = detector.detect(&batch, &history);
        assert!(flagged.contains(&big.id));
    }

    #[test]
    fn test_unseen_merchant_above_threshold() {
        let detector = AnomalyDetector::default();
        let mut history = CategoryHistory::new();
        for _ in 0..5 {
            history.record(Category::Shopping, 2_000, "BOOKSTORE");
        }
        let new_big = txn(-75_000, Category::Entertainment, "CASINO ROYALE");
        let new_small = txn(-1_500, Category::Entertainment, "ARCADE");
        let flagged = detector.detect(&[new_big.clone(), new_small], &history);
        assert!(flagged.contains(&new_big.id));
        assert_eq!(flagged.len(), 1);
    }

    #[test]
    fn test_unseen_merchant_rule_inert_without_history() {
        let detector = AnomalyDetector::default();
        let history = CategoryHistory::new();
        let batch = vec![txn(-75_000, Category::Shopping, "FURNITURE BARN")];
        assert!(detector.detect(&batch, &history).is_empty());
    }
}
