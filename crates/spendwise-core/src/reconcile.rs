//! Categorization and total reconciliation
//!
//! Turns a recovered receipt payload into grouped line items and cross-checks
//! items + discounts + tax against the total printed on the receipt. Nothing
//! here fails: malformed entries are coerced, and a total mismatch is reported
//! through `total_valid` rather than as an error.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use tracing::{debug, warn};

use crate::ai::parsing::ReceiptPayload;
use crate::categories::CategorySet;
use crate::models::{CategoryGroup, Discount, LineItem, ParsedExpense, ReceiptResult};

/// Description used when the model gives none
pub const UNKNOWN_DESCRIPTION: &str = "Unknown";

/// Relative tolerance between calculated and printed totals (1%)
fn tolerance() -> Decimal {
    Decimal::new(1, 2)
}

/// Largest magnitude accepted for a single amount
///
/// Anything above is treated as unreadable, which keeps every sum over a
/// receipt far from `Decimal::MAX`.
fn max_amount() -> Decimal {
    Decimal::new(1_000_000_000_000, 0)
}

/// Best-effort conversion of a JSON amount to cents
///
/// Numbers are taken as-is. Strings may carry `$`, thousands separators and
/// surrounding whitespace. Anything else, or a magnitude above one trillion,
/// is `None`.
pub fn coerce_decimal(value: &Value) -> Option<Decimal> {
    let parsed = match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '$' && *c != ',')
                .collect();
            parse_decimal(&cleaned)
        }
        _ => None,
    }?;
    if parsed.abs() > max_amount() {
        warn!(amount = %parsed, "Ignoring implausibly large amount");
        return None;
    }
    Some(parsed.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    if text.is_empty() {
        return None;
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Coerced amount, zero when missing or unparseable
fn amount_or_zero(value: Option<&Value>) -> Decimal {
    value.and_then(coerce_decimal).unwrap_or(Decimal::ZERO)
}

fn text_field(entry: &Value, key: &str) -> Option<String> {
    entry
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Build a line item from one `items[]` entry
pub fn line_item(entry: &Value, categories: &CategorySet) -> LineItem {
    let mut amount = amount_or_zero(entry.get("amount"));
    if amount.is_sign_negative() {
        debug!(%amount, "Clamping negative item amount to zero");
        amount = Decimal::ZERO;
    }

    LineItem {
        description: text_field(entry, "description")
            .unwrap_or_else(|| UNKNOWN_DESCRIPTION.to_string()),
        amount,
        category: categories.resolve(entry.get("category").and_then(Value::as_str)),
    }
}

/// Build a discount from one `discounts[]` entry, forced non-positive
pub fn discount(entry: &Value) -> Discount {
    let magnitude = amount_or_zero(entry.get("amount")).abs();
    Discount {
        description: text_field(entry, "description")
            .unwrap_or_else(|| UNKNOWN_DESCRIPTION.to_string()),
        amount: if magnitude.is_zero() {
            Decimal::ZERO
        } else {
            -magnitude
        },
    }
}

/// Group items by category in first-seen order
pub fn group_items(items: Vec<LineItem>) -> Vec<CategoryGroup> {
    let mut groups: Vec<CategoryGroup> = Vec::new();
    for item in items {
        match groups.iter_mut().find(|g| g.category == item.category) {
            Some(group) => {
                group.amount += item.amount;
                group.items.push(item);
            }
            None => groups.push(CategoryGroup {
                category: item.category.clone(),
                amount: item.amount,
                items: vec![item],
            }),
        }
    }
    groups
}

/// Whether a calculated total is within tolerance of the printed one
///
/// A zero (or absent) printed total cannot be checked and counts as valid.
/// The band is relative to the printed magnitude, so a negative printed
/// total (a refund slip) is checked the same way.
pub fn within_tolerance(calculated: Decimal, printed: Decimal) -> bool {
    if printed.is_zero() {
        return true;
    }
    match calculated.checked_sub(printed) {
        Some(diff) => diff.abs() < printed.abs() * tolerance(),
        None => false,
    }
}

/// Reconcile a receipt payload against the caller's categories
pub fn reconcile(payload: &ReceiptPayload, categories: &CategorySet) -> ReceiptResult {
    let items: Vec<LineItem> = payload
        .items
        .iter()
        .map(|entry| line_item(entry, categories))
        .collect();
    let grouped_items = group_items(items);

    let discounts: Vec<Discount> = payload.discounts.iter().map(discount).collect();
    let total_discounts: Decimal = discounts.iter().map(|d| d.amount).sum();

    let tax = amount_or_zero(payload.tax.as_ref());
    let receipt_total = amount_or_zero(payload.total.as_ref());

    let items_total: Decimal = grouped_items.iter().map(|g| g.amount).sum();
    let calculated_total = items_total + total_discounts + tax;
    let total_diff = (calculated_total - receipt_total).abs();
    let total_valid = within_tolerance(calculated_total, receipt_total);

    if total_valid {
        debug!(%calculated_total, %receipt_total, "Receipt total reconciled");
    } else {
        warn!(
            %calculated_total,
            %receipt_total,
            %total_diff,
            "Receipt total does not reconcile"
        );
    }

    ReceiptResult {
        grouped_items,
        discounts,
        total_discounts,
        tax,
        receipt_total,
        calculated_total,
        total_valid,
        total_diff,
        raw: payload.raw.clone(),
    }
}

/// Build expenses from the entries of a free-text categorization reply
pub fn expenses(entries: &[Value], categories: &CategorySet) -> Vec<ParsedExpense> {
    entries
        .iter()
        .map(|entry| ParsedExpense {
            amount: amount_or_zero(entry.get("amount")).max(Decimal::ZERO),
            vendor: text_field(entry, "vendor").unwrap_or_else(|| UNKNOWN_DESCRIPTION.to_string()),
            category: categories.resolve(entry.get("category").and_then(Value::as_str)),
            notes: text_field(entry, "notes").unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn categories() -> CategorySet {
        CategorySet::new(["Groceries", "Eating Out", "Health", "Toiletries"])
    }

    fn payload(value: Value) -> ReceiptPayload {
        let raw = value.to_string();
        let obj = value.as_object().unwrap();
        ReceiptPayload {
            items: obj["items"].as_array().cloned().unwrap_or_default(),
            discounts: obj
                .get("discounts")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            tax: obj.get("tax").cloned(),
            total: obj.get("total").cloned(),
            raw,
        }
    }

    fn milk_and_bread(total: Value) -> ReceiptPayload {
        payload(json!({
            "items": [
                {"description": "Milk", "amount": 3.50, "category": "Groceries"},
                {"description": "Bread", "amount": 2.50, "category": "Groceries"}
            ],
            "discounts": [{"description": "Coupon", "amount": -1.00}],
            "tax": 0.50,
            "total": total
        }))
    }

    #[test]
    fn test_coerce_decimal() {
        assert_eq!(coerce_decimal(&json!(3.5)), Some(dec("3.50")));
        assert_eq!(coerce_decimal(&json!(12)), Some(dec("12")));
        assert_eq!(coerce_decimal(&json!("$1,234.56")), Some(dec("1234.56")));
        assert_eq!(coerce_decimal(&json!(" 4.99 ")), Some(dec("4.99")));
        assert_eq!(coerce_decimal(&json!("-2.00")), Some(dec("-2.00")));
        assert_eq!(coerce_decimal(&json!(1.005)), Some(dec("1.01")));
        assert_eq!(coerce_decimal(&json!(1e2)), Some(dec("100")));
        assert_eq!(coerce_decimal(&json!("abc")), None);
        assert_eq!(coerce_decimal(&json!("")), None);
        assert_eq!(coerce_decimal(&json!(null)), None);
        assert_eq!(coerce_decimal(&json!(true)), None);
    }

    #[test]
    fn test_reconciles_within_tolerance() {
        let result = reconcile(&milk_and_bread(json!(5.50)), &categories());

        assert_eq!(result.grouped_items.len(), 1);
        let groceries = &result.grouped_items[0];
        assert_eq!(groceries.category, "Groceries");
        assert_eq!(groceries.amount, dec("6.00"));
        assert_eq!(groceries.items.len(), 2);
        assert_eq!(result.total_discounts, dec("-1.00"));
        assert_eq!(result.tax, dec("0.50"));
        assert_eq!(result.calculated_total, dec("5.50"));
        assert_eq!(result.receipt_total, dec("5.50"));
        assert!(result.total_valid);
        assert_eq!(result.total_diff, Decimal::ZERO);
    }

    #[test]
    fn test_mismatched_total_is_soft_signal() {
        let result = reconcile(&milk_and_bread(json!(10.00)), &categories());
        assert_eq!(result.calculated_total, dec("5.50"));
        assert_eq!(result.total_diff, dec("4.50"));
        assert!(!result.total_valid);
    }

    #[test]
    fn test_calculated_total_invariant() {
        let p = payload(json!({
            "items": [
                {"description": "Apples", "amount": "2.49", "category": "Groceries"},
                {"description": "Burger", "amount": 8.99, "category": "Eating Out"},
                {"description": "Plasters", "amount": 3.10, "category": "Health"},
                {"description": "Pears", "amount": 1.75, "category": "groceries"}
            ],
            "discounts": [{"description": "Member", "amount": 0.40}],
            "tax": "1.12",
            "total": 17.05
        }));
        let result = reconcile(&p, &categories());
        let groups: Decimal = result.grouped_items.iter().map(|g| g.amount).sum();
        assert_eq!(
            result.calculated_total,
            groups + result.total_discounts + result.tax
        );
        assert_eq!(result.calculated_total, dec("17.05"));
        assert!(result.total_valid);

        let order: Vec<_> = result.grouped_items.iter().map(|g| g.category.as_str()).collect();
        assert_eq!(order, vec!["Groceries", "Eating Out", "Health"]);
        assert_eq!(result.group("Groceries").unwrap().amount, dec("4.24"));
    }

    #[test]
    fn test_missing_category_goes_to_default() {
        let p = payload(json!({"items": [{"description": "Widget", "amount": 5}]}));
        let result = reconcile(&p, &categories());
        assert_eq!(result.grouped_items[0].category, "Miscellaneous");
    }

    #[test]
    fn test_unknown_category_is_never_invented() {
        let p = payload(json!({"items": [{"description": "TV", "amount": 300, "category": "Electronics"}]}));
        let result = reconcile(&p, &categories());
        assert_eq!(result.grouped_items[0].category, "Miscellaneous");
    }

    #[test]
    fn test_empty_items() {
        let p = payload(json!({
            "items": [],
            "discounts": [{"description": "Coupon", "amount": "-2.00"}],
            "tax": 0.30
        }));
        let result = reconcile(&p, &categories());
        assert!(result.grouped_items.is_empty());
        assert_eq!(result.calculated_total, dec("-1.70"));
        assert_eq!(result.receipt_total, Decimal::ZERO);
        assert!(result.total_valid);
        assert_eq!(result.total_diff, dec("1.70"));
    }

    #[test]
    fn test_malformed_items_are_coerced_not_rejected() {
        let p = payload(json!({
            "items": [
                {"amount": "n/a", "category": "Groceries"},
                {"description": "Refund", "amount": -4.00, "category": "Groceries"},
                {"description": "   ", "amount": null},
                "just a string"
            ]
        }));
        let result = reconcile(&p, &categories());
        assert_eq!(result.item_count(), 4);
        let items: Vec<_> = result.line_items().collect();
        assert_eq!(items[0].description, "Unknown");
        assert_eq!(items[0].amount, Decimal::ZERO);
        assert_eq!(items[1].amount, Decimal::ZERO);
        assert_eq!(items[2].description, "Unknown");
        assert_eq!(items[3].category, "Miscellaneous");
        assert!(items.iter().all(|i| i.amount >= Decimal::ZERO));
    }

    #[test]
    fn test_discounts_forced_non_positive() {
        let p = payload(json!({
            "items": [],
            "discounts": [
                {"description": "Positive coupon", "amount": 1.25},
                {"description": "Negative coupon", "amount": -0.75},
                {"amount": "junk"}
            ]
        }));
        let result = reconcile(&p, &categories());
        assert!(result.discounts.iter().all(|d| d.amount <= Decimal::ZERO));
        assert_eq!(result.total_discounts, dec("-2.00"));
        assert_eq!(result.discounts[2].description, "Unknown");
    }

    #[test]
    fn test_unparseable_tax_and_total_default_to_zero() {
        let p = payload(json!({
            "items": [{"description": "Milk", "amount": 2, "category": "Groceries"}],
            "tax": "see above",
            "total": {"value": 2}
        }));
        let result = reconcile(&p, &categories());
        assert_eq!(result.tax, Decimal::ZERO);
        assert_eq!(result.receipt_total, Decimal::ZERO);
        assert!(result.total_valid);
    }

    #[test]
    fn test_within_tolerance_boundary() {
        assert!(within_tolerance(dec("100.99"), dec("100.00")));
        assert!(!within_tolerance(dec("101.00"), dec("100.00")));
        assert!(within_tolerance(dec("99.01"), dec("100.00")));
        assert!(within_tolerance(dec("42.00"), Decimal::ZERO));
    }

    #[test]
    fn test_negative_printed_total_uses_magnitude() {
        assert!(within_tolerance(dec("-5.00"), dec("-5.00")));
        assert!(within_tolerance(dec("-5.04"), dec("-5.00")));
        assert!(!within_tolerance(dec("5.00"), dec("-5.00")));
        assert!(!within_tolerance(Decimal::MAX, Decimal::MIN));
    }

    #[test]
    fn test_implausible_amounts_are_ignored() {
        assert_eq!(coerce_decimal(&json!("79228162514264337593543950335")), None);
        assert_eq!(coerce_decimal(&json!("-1000000000000.01")), None);
        assert_eq!(coerce_decimal(&json!(1e30)), None);
        assert_eq!(
            coerce_decimal(&json!("999999999999.99")),
            Some(dec("999999999999.99"))
        );
    }

    #[test]
    fn test_huge_item_amounts_do_not_overflow() {
        let p = payload(json!({
            "items": [
                {"description": "A", "amount": "79228162514264337593543950335", "category": "Groceries"},
                {"description": "B", "amount": "79228162514264337593543950335", "category": "Groceries"},
                {"description": "Milk", "amount": 3.50, "category": "Groceries"}
            ],
            "total": 3.50
        }));
        let result = reconcile(&p, &categories());
        assert_eq!(result.item_count(), 3);
        assert_eq!(result.grouped_items[0].amount, dec("3.50"));
        assert_eq!(result.calculated_total, dec("3.50"));
        assert!(result.total_valid);
    }

    #[test]
    fn test_huge_negative_total_does_not_overflow() {
        let p = milk_and_bread(json!("-79228162514264337593543950335"));
        let result = reconcile(&p, &categories());
        assert_eq!(result.receipt_total, Decimal::ZERO);
        assert_eq!(result.calculated_total, dec("5.50"));
        assert_eq!(result.total_diff, dec("5.50"));
        assert!(result.total_valid);
    }

    #[test]
    fn test_raw_carried_through() {
        let p = milk_and_bread(json!(5.5));
        let result = reconcile(&p, &categories());
        assert_eq!(result.raw, p.raw);
    }

    #[test]
    fn test_expenses_from_entries() {
        let entries = vec![
            json!({"amount": "$12.40", "vendor": "Pizza Hut", "category": "eating out", "notes": "dinner"}),
            json!({"amount": -3, "category": "Gadgets"}),
        ];
        let parsed = expenses(&entries, &categories());
        assert_eq!(parsed[0].amount, dec("12.40"));
        assert_eq!(parsed[0].category, "Eating Out");
        assert_eq!(parsed[0].notes, "dinner");
        assert_eq!(parsed[1].amount, Decimal::ZERO);
        assert_eq!(parsed[1].vendor, "Unknown");
        assert_eq!(parsed[1].category, "Miscellaneous");
        assert_eq!(parsed[1].notes, "");
    }
}
