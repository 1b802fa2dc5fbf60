//! Fold a categorized batch into a period summary.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::category::Category;
use crate::transaction::Transaction;

/// Per-category rollup. `total_minor` keeps its sign; `largest_minor` and
/// `average_minor` are absolute figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: Category,
    pub total_minor: i64,
    pub count: usize,
    pub average_minor: i64,
    pub largest_minor: i64,
}

/// Statement-period summary. Deterministic given the same set of
/// transactions, independent of their order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementSummary {
    pub transaction_count: usize,
    /// Sum of credits (positive).
    pub total_income_minor: i64,
    /// Sum of |debits| (positive).
    pub total_expenses_minor: i64,
    pub net_cash_flow_minor: i64,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    /// Sorted by absolute total descending, then label, for a stable order.
    pub categories: Vec<CategorySummary>,
    /// Top three categories by absolute spend.
    pub top_categories: Vec<Category>,
}

/// Group by category, sum signed amounts, count, and rank. Does not mutate
/// its input.
pub fn aggregate(transactions: &[Transaction]) -> StatementSummary {
    let mut by_category: BTreeMap<Category, (i64, usize, i64)> = BTreeMap::new();
    let mut total_income: i64 = 0;
    let mut total_expenses: i64 = 0;
    let mut period_start: Option<NaiveDate> = None;
    let mut period_end: Option<NaiveDate> = None;

    for txn in transactions {
        let category = txn.category.unwrap_or(Category::Uncategorized);
        let entry = by_category.entry(category).or_insert((0, 0, 0));
        entry.0 += txn.amount_minor;
        entry.1 += 1;
        entry.2 = entry.2.max(txn.abs_amount_minor());

        if txn.is_credit() {
            total_income += txn.amount_minor;
        } else {
            total_expenses += txn.abs_amount_minor();
        }

        period_start = Some(match period_start {
            Some(d) => d.min(txn.posted_date),
            None => txn.posted_date,
        });
        period_end = Some(match period_end {
            Some(d) => d.max(txn.posted_date),
            None => txn.posted_date,
        });
    }

    let mut categories: Vec<CategorySummary> = by_category
        .into_iter()
        .map(|(category, (total, count, largest))| CategorySummary {
            category,
            total_minor: total,
            count,
            average_minor: if count == 0 { 0 } else { total.abs() / count as i64 },
            largest_minor: largest,
        })
        .collect();

    categories.sort_by(|a, b| {
        b.total_minor
            .abs()
            .cmp(&a.total_minor.abs())
            .then_with(|| a.category.label().cmp(b.category.label()))
    });

    let top_categories = categories.iter().take(3).map(|c| c.category).collect();

    StatementSummary {
        transaction_count: transactions.len(),
        total_income_minor: total_income,
        total_expenses_minor: total_expenses,
        net_cash_flow_minor: total_income - total_expenses,
        period_start,
        period_end,
        categories,
        top_categories,
    }
}
