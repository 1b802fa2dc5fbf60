//! Deterministic rule-based categorization from merchant patterns.
//!
//! No backend needed: substring rules over the collapsed merchant cover
//! the bulk of everyday transactions.

use async_trait::async_trait;
use finsight_core::{Category, ClassifyError, Transaction};

use crate::engine::CategoryProvider;

/// Confidence for a direct merchant-pattern hit. Above the engine
/// threshold, so rule hits short-circuit the chain.
const PATTERN_CONFIDENCE: f64 = 0.95;

/// Confidence for weaker description keywords. Below the threshold: a
/// later provider may override.
const KEYWORD_CONFIDENCE: f64 = 0.6;

/// Generic description keywords that hint at a category without naming a
/// known merchant.
const DESCRIPTION_KEYWORDS: &[(&str, Category)] = &[
    ("REFUND", Category::Income),
    ("DEPOSIT", Category::Income),
    ("TRANSFER", Category::Transfers),
    ("SUBSCRIPTION", Category::Entertainment),
    ("FEE", Category::Fees),
    ("FUEL", Category::Transportation),
    ("GAS STATION", Category::Transportation),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleProvider;

impl RuleProvider {
    pub fn new() -> Self {
        Self
    }

    fn match_patterns(merchant: &str) -> Option<Category> {
        for category in Category::ALL {
            for pattern in category.merchant_patterns() {
                if merchant.contains(pattern) {
                    return Some(*category);
                }
            }
        }
        None
    }

    fn match_keywords(description: &str) -> Option<Category> {
        let upper = description.to_ascii_uppercase();
        DESCRIPTION_KEYWORDS
            .iter()
            .find(|(kw, _)| upper.contains(kw))
            .map(|(_, cat)| *cat)
    }
}

#[async_trait]
impl CategoryProvider for RuleProvider {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn categorize(
        &self,
        txn: &Transaction,
    ) -> Result<Option<(Category, f64)>, ClassifyError> {
        if let Some(category) = Self::match_patterns(&txn.merchant) {
            return Ok(Some((category, PATTERN_CONFIDENCE)));
        }
        if let Some(category) = Self::match_keywords(&txn.raw_description) {
            return Ok(Some((category, KEYWORD_CONFIDENCE)));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use finsight_core::{TransactionId, UploadId};

    fn txn(merchant: &str, description: &str) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            upload: UploadId::new(),
            posted_date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            amount_minor: -1200,
            merchant: merchant.to_string(),
            raw_description: description.to_string(),
            category: None,
            category_confidence: 0.0,
            anomalous: None,
            row_index: 0,
        }
    }

    #[tokio::test]
    async fn test_pattern_hit_is_high_confidence() {
        let provider = RuleProvider::new();
        let out = provider
            .categorize(&txn("STARBUCKS 44TH ST", "STARBUCKS 44TH ST"))
            .await
            .unwrap();
        assert_eq!(out, Some((Category::Food, PATTERN_CONFIDENCE)));
    }

    #[tokio::test]
    async fn test_keyword_hit_is_low_confidence() {
        let provider = RuleProvider::new();
        let out = provider
            .categorize(&txn("ACME CO", "ACME CO monthly subscription"))
            .await
            .unwrap();
        assert_eq!(out, Some((Category::Entertainment, KEYWORD_CONFIDENCE)));
    }

    #[tokio::test]
    async fn test_unknown_merchant_yields_none() {
        let provider = RuleProvider::new();
        let out = provider
            .categorize(&txn("ZZYZX HOLDINGS", "ZZYZX HOLDINGS"))
            .await
            .unwrap();
        assert_eq!(out, None);
    }
}
