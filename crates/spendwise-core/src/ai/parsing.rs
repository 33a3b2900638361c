//! JSON recovery from model responses
//!
//! Vision and text models are asked for bare JSON but routinely wrap it in
//! prose or markdown code fences, or add a trailing remark. These helpers try
//! progressively looser strategies and hand back the first value that has the
//! expected shape. On failure the raw text is carried in the error verbatim.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};

/// Receipt object recovered from a vision response, before coercion
///
/// Field values are left as raw JSON so the reconciliation engine can apply
/// its own lenient numeric coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptPayload {
    pub items: Vec<Value>,
    pub discounts: Vec<Value>,
    pub tax: Option<Value>,
    pub total: Option<Value>,
    /// The response text the payload was recovered from
    pub raw: String,
}

/// Parse a receipt from a vision model response
///
/// Accepts `{"items": [...], "discounts": [...], "tax": .., "total": ..}` or a
/// bare array of items.
pub fn parse_receipt_response(response: &str) -> Result<ReceiptPayload> {
    let value = find_json(response, is_receipt_shaped).ok_or_else(|| Error::Parse {
        message: "Failed to parse receipt: no JSON object with an items list".into(),
        raw: response.to_string(),
    })?;

    let payload = match value {
        Value::Array(items) => ReceiptPayload {
            items,
            discounts: Vec::new(),
            tax: None,
            total: None,
            raw: response.to_string(),
        },
        Value::Object(mut map) => {
            let items = match map.remove("items") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            let discounts = match map.remove("discounts") {
                Some(Value::Array(discounts)) => discounts,
                Some(Value::Object(single)) => vec![Value::Object(single)],
                _ => Vec::new(),
            };
            ReceiptPayload {
                items,
                discounts,
                tax: map.remove("tax").filter(|v| !v.is_null()),
                total: map.remove("total").filter(|v| !v.is_null()),
                raw: response.to_string(),
            }
        }
        _ => {
            return Err(Error::Parse {
                message: "Failed to parse receipt: unexpected JSON shape".into(),
                raw: response.to_string(),
            })
        }
    };

    tracing::debug!(
        items = payload.items.len(),
        discounts = payload.discounts.len(),
        "Recovered receipt payload"
    );
    Ok(payload)
}

/// Parse a list of expense objects from a text model response
///
/// A single object is treated as a one-element list.
pub fn parse_expense_response(response: &str) -> Result<Vec<Value>> {
    let value = find_json(response, is_expense_shaped).ok_or_else(|| Error::Parse {
        message: "Failed to parse expenses: no JSON expense list in response".into(),
        raw: response.to_string(),
    })?;

    let expenses = match value {
        Value::Array(entries) => entries,
        single => vec![single],
    };

    if expenses.is_empty() {
        return Err(Error::Parse {
            message: "Failed to parse expenses: the model returned an empty list".into(),
            raw: response.to_string(),
        });
    }
    Ok(expenses)
}

/// Find the first JSON value in `text` accepted by `accept`
///
/// Strategies in order: whole text, first code fence body, then every
/// balanced `{...}` / `[...]` span from left to right. A span that parses but
/// is rejected is not searched inside: its nested values belong to it.
pub fn find_json(text: &str, accept: impl Fn(&Value) -> bool) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if accept(&value) {
            return Some(value);
        }
    }

    if let Some(body) = first_code_fence(text) {
        if let Ok(value) = serde_json::from_str::<Value>(body) {
            if accept(&value) {
                return Some(value);
            }
        }
    }

    let mut rejected_until = 0;
    for (start, ch) in text.char_indices() {
        if start < rejected_until || (ch != '{' && ch != '[') {
            continue;
        }
        let Some(end) = balanced_end(text, start) else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<Value>(&text[start..end]) {
            if accept(&value) {
                return Some(value);
            }
            rejected_until = end;
        }
    }

    None
}

/// Body of the first markdown code fence, with or without a language tag
fn first_code_fence(text: &str) -> Option<&str> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let re = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").expect("valid regex")
    });
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

/// Byte offset just past the bracket closing the one at `start`
///
/// Brackets inside string literals (including escaped quotes) are ignored.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(start + offset + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn is_receipt_shaped(value: &Value) -> bool {
    match value {
        Value::Object(map) => matches!(map.get("items"), Some(Value::Array(_))),
        Value::Array(entries) => entries.iter().all(Value::is_object),
        _ => false,
    }
}

fn is_expense_shaped(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.contains_key("amount"),
        Value::Array(entries) => entries.iter().all(Value::is_object),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAYLOAD: &str = r#"{"items": [{"description": "Milk", "amount": 3.50, "category": "Groceries"}, {"description": "Bread", "amount": "2.50", "category": "Groceries"}], "discounts": [{"description": "Coupon", "amount": -1.00}], "tax": 0.50, "total": 5.50}"#;

    #[test]
    fn test_parse_receipt_direct() {
        let payload = parse_receipt_response(PAYLOAD).unwrap();
        assert_eq!(payload.items.len(), 2);
        assert_eq!(payload.items[0]["description"], "Milk");
        assert_eq!(payload.items[1]["amount"], "2.50");
        assert_eq!(payload.discounts[0]["amount"], json!(-1.00));
        assert_eq!(payload.tax, Some(json!(0.50)));
        assert_eq!(payload.total, Some(json!(5.50)));
        assert_eq!(payload.raw, PAYLOAD);
    }

    #[test]
    fn test_parse_receipt_in_code_fence_matches_unwrapped() {
        let wrapped = format!(
            "Here is the receipt you asked for:\n\n```json\n{}\n```\n\nLet me know if you need anything else.",
            PAYLOAD
        );
        let fenced = parse_receipt_response(&wrapped).unwrap();
        let direct = parse_receipt_response(PAYLOAD).unwrap();
        assert_eq!(fenced.items, direct.items);
        assert_eq!(fenced.discounts, direct.discounts);
        assert_eq!(fenced.tax, direct.tax);
        assert_eq!(fenced.total, direct.total);
        assert_eq!(fenced.raw, wrapped);
    }

    #[test]
    fn test_parse_receipt_in_unlabelled_fence() {
        let wrapped = format!("```\n{}\n```", PAYLOAD);
        let payload = parse_receipt_response(&wrapped).unwrap();
        assert_eq!(payload.items.len(), 2);
    }

    #[test]
    fn test_parse_receipt_embedded_in_prose() {
        let wrapped = format!("Sure! {} I hope this helps.", PAYLOAD);
        let payload = parse_receipt_response(&wrapped).unwrap();
        assert_eq!(payload.items.len(), 2);
        assert_eq!(payload.total, Some(json!(5.50)));
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_scan() {
        let text = r#"Result: {"items": [{"description": "Socks {2 pack]", "amount": 4, "category": "Personal"}], "total": 4} done"#;
        let payload = parse_receipt_response(text).unwrap();
        assert_eq!(payload.items[0]["description"], "Socks {2 pack]");
    }

    #[test]
    fn test_escaped_quotes_inside_strings() {
        let text = r#"ok {"items": [{"description": "12\" pizza }", "amount": 9}]}"#;
        let payload = parse_receipt_response(text).unwrap();
        assert_eq!(payload.items[0]["description"], "12\" pizza }");
    }

    #[test]
    fn test_skips_unrelated_json_before_payload() {
        let text = format!(r#"Confidence: {{"score": 0.9}}. Receipt: {}"#, PAYLOAD);
        let payload = parse_receipt_response(&text).unwrap();
        assert_eq!(payload.items.len(), 2);
    }

    #[test]
    fn test_bare_array_accepted_as_items() {
        let text = r#"[{"description": "Soap", "amount": 2.99, "category": "Toiletries"}]"#;
        let payload = parse_receipt_response(text).unwrap();
        assert_eq!(payload.items.len(), 1);
        assert!(payload.discounts.is_empty());
        assert!(payload.tax.is_none());
        assert!(payload.total.is_none());
    }

    #[test]
    fn test_missing_items_keeps_raw_verbatim() {
        let text = r#"{"total": 12.00, "tax": 1.00}"#;
        let err = parse_receipt_response(text).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert_eq!(err.raw(), Some(text));
    }

    #[test]
    fn test_missing_items_with_nested_arrays_is_error() {
        let text = r#"{"discounts": [{"description": "Coupon", "amount": -1.00}], "total": 5.00}"#;
        let err = parse_receipt_response(text).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert_eq!(err.raw(), Some(text));

        let fenced = format!("```json\n{}\n```", text);
        let err = parse_receipt_response(&fenced).unwrap_err();
        assert_eq!(err.raw(), Some(fenced.as_str()));

        let in_prose = format!("Here is the receipt: {} Thanks!", text);
        assert!(parse_receipt_response(&in_prose).is_err());
    }

    #[test]
    fn test_bare_array_in_prose_still_accepted() {
        let text = r#"Items: [{"description": "Soap", "amount": 2.99}] done"#;
        let payload = parse_receipt_response(text).unwrap();
        assert_eq!(payload.items.len(), 1);
    }

    #[test]
    fn test_no_json_keeps_raw_verbatim() {
        let text = "  I'm sorry, I can't read this image clearly.  ";
        let err = parse_receipt_response(text).unwrap_err();
        assert_eq!(err.raw(), Some(text));
    }

    #[test]
    fn test_truncated_json_is_a_parse_error() {
        let text = r#"{"items": [{"description": "Milk", "amount": 3.5"#;
        let err = parse_receipt_response(text).unwrap_err();
        assert_eq!(err.raw(), Some(text));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_receipt_response("").is_err());
        assert!(parse_expense_response("   ").is_err());
    }

    #[test]
    fn test_null_tax_treated_as_absent() {
        let payload = parse_receipt_response(r#"{"items": [], "tax": null}"#).unwrap();
        assert!(payload.items.is_empty());
        assert!(payload.tax.is_none());
    }

    #[test]
    fn test_parse_expense_list() {
        let text = "```json\n[{\"amount\": 12.5, \"vendor\": \"Cafe\", \"category\": \"Eating Out\", \"notes\": \"lunch\"}, {\"amount\": 40, \"vendor\": \"Shell\", \"category\": \"Transport\", \"notes\": \"\"}]\n```";
        let expenses = parse_expense_response(text).unwrap();
        assert_eq!(expenses.len(), 2);
        assert_eq!(expenses[1]["vendor"], "Shell");
    }

    #[test]
    fn test_parse_single_expense_object() {
        let text = r#"Here you go: {"amount": "$4.75", "vendor": "Starbucks", "category": "Eating Out", "notes": "coffee"}"#;
        let expenses = parse_expense_response(text).unwrap();
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0]["amount"], "$4.75");
    }

    #[test]
    fn test_empty_expense_list_is_error() {
        let err = parse_expense_response("[]").unwrap_err();
        assert_eq!(err.raw(), Some("[]"));
    }

    #[test]
    fn test_balanced_end_mismatched() {
        assert_eq!(balanced_end("{]", 0), None);
        assert_eq!(balanced_end("[1, [2]] tail", 0), Some(8));
    }
}
