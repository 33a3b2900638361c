//! Data models for extracted receipts and expenses
//!
//! All values here are built fresh by a single pipeline call and owned by its
//! caller. Monetary amounts are exact decimals rounded to cents.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single purchased good extracted from a receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    /// Always >= 0
    pub amount: Decimal,
    /// One of the supplied budget categories, or the default bucket
    pub category: String,
}

/// A coupon, member saving or other reduction printed on a receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub description: String,
    /// Always <= 0
    pub amount: Decimal,
}

/// Items sharing one budget category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub category: String,
    /// Sum of member item amounts
    pub amount: Decimal,
    /// Member items in receipt order
    pub items: Vec<LineItem>,
}

/// Terminal output of the receipt pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptResult {
    /// Groups in first-seen category order
    pub grouped_items: Vec<CategoryGroup>,
    pub discounts: Vec<Discount>,
    pub total_discounts: Decimal,
    pub tax: Decimal,
    /// Total printed on the receipt, as reported by the model (0 if absent)
    pub receipt_total: Decimal,
    /// Group sums + discounts + tax
    pub calculated_total: Decimal,
    /// Whether `calculated_total` is within tolerance of `receipt_total`
    pub total_valid: bool,
    /// |calculated_total - receipt_total|
    pub total_diff: Decimal,
    /// Original model response, kept for diagnostics
    pub raw: String,
}

impl ReceiptResult {
    /// Number of line items across all groups
    pub fn item_count(&self) -> usize {
        self.grouped_items.iter().map(|g| g.items.len()).sum()
    }

    /// All line items flattened back into receipt order per group
    ///
    /// This is the shape a transaction store persists, one expense per item.
    pub fn line_items(&self) -> impl Iterator<Item = &LineItem> {
        self.grouped_items.iter().flat_map(|g| g.items.iter())
    }

    /// Look up a group by category name
    pub fn group(&self, category: &str) -> Option<&CategoryGroup> {
        self.grouped_items.iter().find(|g| g.category == category)
    }
}

/// An expense recovered from a free-text description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedExpense {
    pub amount: Decimal,
    pub vendor: String,
    pub category: String,
    pub notes: String,
}
