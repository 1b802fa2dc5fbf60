//! Spending categories and the merchant-pattern hints the classifier uses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Spending category assigned to a transaction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Category {
    #[serde(rename = "food")]
    Food,
    #[serde(rename = "transportation")]
    Transportation,
    #[serde(rename = "shopping")]
    Shopping,
    #[serde(rename = "bills-utilities")]
    BillsUtilities,
    #[serde(rename = "entertainment")]
    Entertainment,
    #[serde(rename = "healthcare")]
    Healthcare,
    #[serde(rename = "income")]
    Income,
    #[serde(rename = "transfers")]
    Transfers,
    #[serde(rename = "fees")]
    Fees,
    #[serde(rename = "uncategorized")]
    Uncategorized,
}

impl Category {
    pub const ALL: &'static [Category] = &[
        Category::Food,
        Category::Transportation,
        Category::Shopping,
        Category::BillsUtilities,
        Category::Entertainment,
        Category::Healthcare,
        Category::Income,
        Category::Transfers,
        Category::Fees,
        Category::Uncategorized,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Transportation => "transportation",
            Category::Shopping => "shopping",
            Category::BillsUtilities => "bills-utilities",
            Category::Entertainment => "entertainment",
            Category::Healthcare => "healthcare",
            Category::Income => "income",
            Category::Transfers => "transfers",
            Category::Fees => "fees",
            Category::Uncategorized => "uncategorized",
        }
    }

    /// Map a classifier label back to a category. Lenient on separators so
    /// backend spellings like "Bills & Utilities" still resolve.
    pub fn from_label(label: &str) -> Option<Category> {
        let key: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "food" | "fooddining" | "dining" | "groceries" => Some(Category::Food),
            "transportation" | "transport" | "transit" => Some(Category::Transportation),
            "shopping" | "retail" | "merchandise" => Some(Category::Shopping),
            "billsutilities" | "bills" | "utilities" => Some(Category::BillsUtilities),
            "entertainment" => Some(Category::Entertainment),
            "healthcare" | "health" | "medical" => Some(Category::Healthcare),
            "income" | "payroll" | "salary" => Some(Category::Income),
            "transfers" | "transfer" => Some(Category::Transfers),
            "fees" | "fee" | "charges" => Some(Category::Fees),
            "uncategorized" | "other" | "unknown" => Some(Category::Uncategorized),
            _ => None,
        }
    }

    /// Merchant substrings that deterministically place a transaction in
    /// this category. Matched against the collapsed (uppercased) merchant.
    pub fn merchant_patterns(&self) -> &'static [&'static str] {
        match self {
            Category::Food => &[
                "MCDONALD", "STARBUCKS", "CHIPOTLE", "DOORDASH", "UBER EATS", "GRUBHUB",
                "WHOLE FOODS", "TRADER JOE", "KROGER", "SAFEWAY", "H-E-B", "ALDI",
                "RESTAURANT", "CAFE", "PIZZA", "BAKERY", "GROCERY",
            ],
            Category::Transportation => &[
                "UBER", "LYFT", "SHELL", "CHEVRON", "EXXON", "MOBIL", "BP ",
                "METRO", "TRANSIT", "PARKING", "AMTRAK", "CLIPPER", "TOLL",
            ],
            Category::Shopping => &[
                "AMAZON", "WALMART", "TARGET", "COSTCO", "BEST BUY", "EBAY",
                "ETSY", "IKEA", "NORDSTROM", "MACY",
            ],
            Category::BillsUtilities => &[
                "COMCAST", "XFINITY", "VERIZON", "T-MOBILE", "AT&T", "SPECTRUM",
                "ELECTRIC", "WATER DEPT", "UTILITY", "INSURANCE", "RENT", "MORTGAGE",
            ],
            Category::Entertainment => &[
                "NETFLIX", "SPOTIFY", "HULU", "DISNEY", "YOUTUBE", "STEAM",
                "PLAYSTATION", "CINEMA", "THEATRE", "AMC ", "TICKETMASTER",
            ],
            Category::Healthcare => &[
                "PHARMACY", "CVS", "WALGREENS", "CLINIC", "HOSPITAL", "DENTAL",
                "OPTOMETR", "URGENT CARE",
            ],
            Category::Income => &[
                "PAYROLL", "DIRECT DEP", "SALARY", "STIPEND", "EMPLOYER", "IRS TREAS",
            ],
            Category::Transfers => &[
                "ZELLE", "VENMO", "PAYPAL", "WISE.COM", "REMITLY", "WIRE TRANSFER",
                "SAVINGS TRANSFER",
            ],
            Category::Fees => &[
                "OVERDRAFT", "SERVICE FEE", "MONTHLY FEE", "ATM FEE", "LATE FEE",
                "INTEREST CHARGE",
            ],
            Category::Uncategorized => &[],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_round_trip() {
        for cat in Category::ALL {
            assert_eq!(Category::from_label(cat.label()), Some(*cat));
        }
    }

    #[test]
    fn test_from_label_lenient_spellings() {
        assert_eq!(Category::from_label("Food & Dining"), Some(Category::Food));
        assert_eq!(
            Category::from_label("Bills & Utilities"),
            Some(Category::BillsUtilities)
        );
        assert_eq!(Category::from_label("made-up-label"), None);
    }

    #[test]
    fn test_uncategorized_has_no_patterns() {
        assert!(Category::Uncategorized.merchant_patterns().is_empty());
    }

    #[test]
    fn test_serde_labels_match() {
        let json = serde_json::to_string(&Category::BillsUtilities).unwrap();
        assert_eq!(json, "\"bills-utilities\"");
    }
}
