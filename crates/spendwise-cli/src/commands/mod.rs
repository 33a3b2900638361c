//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `config` - Resolved configuration display
//! - `expenses` - Free-text expense extraction
//! - `normalize` - Image normalization only
//! - `prompts` - Prompt library management commands
//! - `receipts` - Receipt extraction and reconciliation
//! - `speech` - Voice note transcription

pub mod config;
pub mod expenses;
pub mod normalize;
pub mod prompts;
pub mod receipts;
pub mod speech;

// Re-export command functions for main.rs
pub use config::*;
pub use expenses::*;
pub use normalize::*;
pub use prompts::*;
pub use receipts::*;
pub use speech::*;

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use spendwise_core::{CategorySet, Config, Error, FailureReport};

/// Load configuration (file layer, then environment)
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path).context("Failed to load configuration")
}

/// Categories from the command line, else the configured defaults
pub fn resolve_categories(args: &[String], config: &Config) -> CategorySet {
    if args.is_empty() {
        CategorySet::new(config.default_categories.iter().cloned())
    } else {
        CategorySet::new(args.iter().cloned())
    }
}

/// Format an amount as dollars, sign first
pub fn money(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${:.2}", rounded.abs())
    } else {
        format!("${:.2}", rounded.abs())
    }
}

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a pipeline failure and turn it into the command's error
///
/// In JSON mode the structured report goes to stdout so scripts can read it.
pub fn report_failure(err: Error, json: bool) -> anyhow::Error {
    let report = FailureReport::from(err);
    tracing::debug!(kind = ?report.kind, has_raw = report.raw.is_some(), "Command failed");
    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to serialize failure report: {}", e),
        }
    } else if let Some(raw) = &report.raw {
        eprintln!("Model response (for manual entry):");
        eprintln!("{}", raw);
        eprintln!();
    }
    anyhow!(report.error)
}
