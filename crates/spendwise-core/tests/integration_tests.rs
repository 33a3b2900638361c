//! Integration tests for spendwise-core
//!
//! These tests exercise the full normalize → extract → parse → reconcile
//! workflow through the public API, with an in-process vision transport
//! standing in for watsonx.

use std::io::Cursor;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, ImageOutputFormat, Rgba, RgbaImage};
use rust_decimal::Decimal;
use spendwise_core::{
    CategorySet, Config, ErrorKind, FailureReport, NormalizeOptions, NormalizedImage,
    PromptId, PromptLibrary, ReceiptPipeline, Result, VisionClient, VisionTransport,
};

/// Transport that inspects what it was sent and answers with a fixed reply
struct InspectingTransport {
    reply: String,
    seen: Arc<Mutex<Vec<(u32, u32, String)>>>,
}

#[async_trait]
impl VisionTransport for InspectingTransport {
    fn name(&self) -> &str {
        "inspecting"
    }

    async fn send(&self, normalized: &NormalizedImage, instruction: &str) -> Result<String> {
        // The payload must be a real JPEG of the advertised size
        let decoded = image::load_from_memory(&normalized.jpeg).expect("normalized JPEG decodes");
        assert_eq!(decoded.dimensions(), (normalized.width, normalized.height));
        assert!(normalized.data_url().starts_with("data:image/jpeg;base64,"));

        self.seen.lock().unwrap().push((
            normalized.width,
            normalized.height,
            instruction.to_string(),
        ));
        Ok(self.reply.clone())
    }
}

fn receipt_photo(width: u32, height: u32) -> Vec<u8> {
    // RGBA source to make sure the alpha channel is flattened on the way through
    let img = RgbaImage::from_pixel(width, height, Rgba([250, 250, 245, 255]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .unwrap();
    bytes
}

fn pipeline(reply: &str, max_dimension: u32) -> (ReceiptPipeline, Arc<Mutex<Vec<(u32, u32, String)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let transport = InspectingTransport {
        reply: reply.to_string(),
        seen: seen.clone(),
    };
    let template = PromptLibrary::embedded_only()
        .get(PromptId::ParseReceipt)
        .unwrap()
        .clone();
    let options = NormalizeOptions {
        max_dimension,
        ..NormalizeOptions::default()
    };
    (
        ReceiptPipeline::new(VisionClient::new(vec![Box::new(transport)]), template, options),
        seen,
    )
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn budget() -> CategorySet {
    let config = Config::embedded().unwrap();
    CategorySet::new(config.default_categories)
}

#[tokio::test]
async fn test_costco_receipt_end_to_end() {
    let reply = r#"Here's what I found on the receipt:

```json
{
  "items": [
    {"description": "Kirkland Signature Paper Towels", "amount": 21.99, "category": "Cleaning Supplies, Toiletries"},
    {"description": "Rotisserie Chicken", "amount": 4.99, "category": "Groceries"},
    {"description": "Organic Bananas", "amount": "1.99", "category": "Grocery"},
    {"description": "Vitamin D3", "amount": 13.49, "category": "Health"},
    {"description": "Hot Dog Combo", "amount": 1.50, "category": "Eating Out"},
    {"description": "Phone Case", "amount": 19.99, "category": "Electronics"}
  ],
  "discounts": [{"description": "Instant Savings Paper Towels", "amount": 4.00}],
  "tax": 3.21,
  "total": 63.16
}
```

Let me know if you need anything else!"#;

    let (pipeline, seen) = pipeline(reply, 2048);
    let result = pipeline
        .parse(&receipt_photo(1500, 3000), &budget())
        .await
        .unwrap();

    // The portrait photo was bounded to 2048 on its long side
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, 1024);
    assert_eq!(seen[0].1, 2048);
    assert!(seen[0].2.contains("Cleaning Supplies, Toiletries"));

    let order: Vec<_> = result
        .grouped_items
        .iter()
        .map(|g| g.category.as_str())
        .collect();
    assert_eq!(
        order,
        vec![
            "Cleaning Supplies, Toiletries",
            "Groceries",
            "Health",
            "Eating Out",
            "Miscellaneous"
        ]
    );
    assert_eq!(result.group("Groceries").unwrap().amount, dec("6.98"));
    assert_eq!(result.group("Miscellaneous").unwrap().items[0].description, "Phone Case");
    assert_eq!(result.total_discounts, dec("-4.00"));
    assert_eq!(result.calculated_total, dec("63.16"));
    assert!(result.total_valid);
    assert_eq!(result.total_diff, Decimal::ZERO);

    let groups: Decimal = result.grouped_items.iter().map(|g| g.amount).sum();
    assert_eq!(
        result.calculated_total,
        groups + result.total_discounts + result.tax
    );
}

#[tokio::test]
async fn test_small_receipt_is_not_upscaled() {
    let (pipeline, seen) = pipeline(r#"{"items": []}"#, 2048);
    let result = pipeline
        .parse(&receipt_photo(300, 500), &budget())
        .await
        .unwrap();

    assert_eq!(seen.lock().unwrap()[0].0, 300);
    assert_eq!(seen.lock().unwrap()[0].1, 500);
    assert!(result.grouped_items.is_empty());
    assert_eq!(result.calculated_total, Decimal::ZERO);
    assert!(result.total_valid);
}

#[tokio::test]
async fn test_total_mismatch_is_reported_not_raised() {
    let reply = r#"{"items": [{"description": "Milk", "amount": 3.50, "category": "Groceries"}, {"description": "Bread", "amount": 2.50, "category": "Groceries"}], "discounts": [{"description": "Coupon", "amount": -1.00}], "tax": 0.50, "total": 10.00}"#;
    let (pipeline, _) = pipeline(reply, 1024);

    let result = pipeline
        .parse(&receipt_photo(100, 100), &budget())
        .await
        .unwrap();
    assert!(!result.total_valid);
    assert_eq!(result.total_diff, dec("4.50"));

    // The result stays serialisable for collaborators
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["total_valid"], false);
    assert_eq!(json["total_diff"], "4.50");
}

#[tokio::test]
async fn test_parse_failure_report_shape() {
    let reply = "The image appears to be a photo of a cat, not a receipt.";
    let (pipeline, _) = pipeline(reply, 1024);

    let err = pipeline
        .parse(&receipt_photo(100, 100), &budget())
        .await
        .unwrap_err();
    let report = FailureReport::from(err);
    assert_eq!(report.kind, ErrorKind::Parse);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["kind"], "parse");
    assert_eq!(json["raw"], reply);
    assert!(json["error"].as_str().unwrap().contains("Failed to parse receipt"));
}

#[tokio::test]
async fn test_heic_like_input_is_image_decode_failure() {
    // ftyp box header of an HEIC file; no decoder is compiled in for it
    let heic = b"\x00\x00\x00\x18ftypheic\x00\x00\x00\x00mif1heic";
    let (pipeline, seen) = pipeline(r#"{"items": []}"#, 1024);

    let err = pipeline.parse(heic, &budget()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ImageDecode);
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_missing_credentials_report() {
    let config = Config::embedded().unwrap();
    let err = config.watsonx_credentials().unwrap_err();
    let report = FailureReport::from(err);
    assert_eq!(report.kind, ErrorKind::Credentials);
    assert!(report.error.starts_with("Missing credentials"));
}
