//! Receipt extraction command

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use spendwise_core::prompts::PromptLibrary;
use spendwise_core::{CategorySet, Config, ReceiptPipeline, ReceiptResult};

use super::{money, report_failure, resolve_categories, truncate};

/// Run the receipt pipeline against watsonx
pub async fn run_receipt(
    config: &Config,
    prompts: &mut PromptLibrary,
    image: &[u8],
    categories: &CategorySet,
) -> spendwise_core::Result<ReceiptResult> {
    let credentials = config.watsonx_credentials()?;
    let pipeline = ReceiptPipeline::from_config(config, credentials, prompts)?;
    pipeline.parse(image, categories).await
}

/// Parse a receipt image and print grouped items and the reconciliation
pub async fn cmd_receipt(
    config: &Config,
    prompts: &mut PromptLibrary,
    file: &Path,
    categories: &[String],
    max_dimension: Option<u32>,
    json: bool,
) -> Result<()> {
    if !file.exists() {
        return Err(anyhow!("File not found: {}", file.display()));
    }
    let image = std::fs::read(file).context("Failed to read receipt image")?;
    tracing::debug!(file = %file.display(), bytes = image.len(), "Read receipt image");

    let mut config = config.clone();
    if let Some(max) = max_dimension {
        if max == 0 {
            return Err(anyhow!("--max-dimension must be positive"));
        }
        config.image.max_dimension = max;
    }
    let categories = resolve_categories(categories, &config);

    if !json {
        println!("Parsing receipt with {}...", config.watsonx.vision_model);
    }

    match run_receipt(&config, prompts, &image, &categories).await {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", render_receipt(&result)?);
            }
            Ok(())
        }
        Err(e) => Err(report_failure(e, json)),
    }
}

/// Human-readable receipt summary
pub fn render_receipt(result: &ReceiptResult) -> Result<String> {
    let mut out = String::new();

    writeln!(out, "\nReceipt ({} items)", result.item_count())?;
    writeln!(out, "{}", "─".repeat(60))?;

    if result.grouped_items.is_empty() {
        writeln!(out, "  No line items found")?;
    }

    for group in &result.grouped_items {
        writeln!(out, "  {:<44} {:>12}", group.category, money(group.amount))?;
        for item in &group.items {
            writeln!(
                out,
                "    {:<42} {:>12}",
                truncate(&item.description, 42),
                money(item.amount)
            )?;
        }
    }

    if !result.discounts.is_empty() {
        writeln!(out)?;
        writeln!(out, "  {:<44} {:>12}", "Discounts", money(result.total_discounts))?;
        for discount in &result.discounts {
            writeln!(
                out,
                "    {:<42} {:>12}",
                truncate(&discount.description, 42),
                money(discount.amount)
            )?;
        }
    }

    writeln!(out, "{}", "─".repeat(60))?;
    writeln!(out, "  {:<44} {:>12}", "Tax", money(result.tax))?;
    writeln!(out, "  {:<44} {:>12}", "Calculated total", money(result.calculated_total))?;
    writeln!(out, "  {:<44} {:>12}", "Receipt total", money(result.receipt_total))?;

    if result.receipt_total.is_zero() {
        writeln!(out, "\n  ℹ️  No total found on the receipt; nothing to reconcile")?;
    } else if result.total_valid {
        writeln!(out, "\n  ✓ Totals match")?;
    } else {
        writeln!(
            out,
            "\n  ⚠️  Totals differ by {}; check the items before saving",
            money(result.total_diff)
        )?;
    }

    Ok(out)
}
