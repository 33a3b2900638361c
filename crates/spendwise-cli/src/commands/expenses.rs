//! Free-text expense command

use std::fmt::Write as _;

use anyhow::Result;
use spendwise_core::prompts::PromptLibrary;
use spendwise_core::{CategorySet, Config, ExpenseCategorizer, ParsedExpense};

use super::{money, report_failure, resolve_categories, truncate};

/// Run free-text categorization against watsonx
pub async fn run_expense(
    config: &Config,
    prompts: &mut PromptLibrary,
    text: &str,
    categories: &CategorySet,
) -> spendwise_core::Result<Vec<ParsedExpense>> {
    let credentials = config.watsonx_credentials()?;
    let categorizer = ExpenseCategorizer::from_config(config, credentials, prompts)?;
    categorizer.categorize(text, categories).await
}

/// Extract expenses from a description and print them
pub async fn cmd_expense(
    config: &Config,
    prompts: &mut PromptLibrary,
    text: &str,
    categories: &[String],
    json: bool,
) -> Result<()> {
    let categories = resolve_categories(categories, config);

    match run_expense(config, prompts, text, &categories).await {
        Ok(expenses) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&expenses)?);
            } else {
                print!("{}", render_expenses(&expenses)?);
            }
            Ok(())
        }
        Err(e) => Err(report_failure(e, json)),
    }
}

/// Table of extracted expenses
pub fn render_expenses(expenses: &[ParsedExpense]) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "\n{} expense(s) found", expenses.len())?;
    writeln!(
        out,
        "{:>10}  {:<20}  {:<24}  {}",
        "AMOUNT", "VENDOR", "CATEGORY", "NOTES"
    )?;
    writeln!(out, "{}", "-".repeat(80))?;
    for expense in expenses {
        writeln!(
            out,
            "{:>10}  {:<20}  {:<24}  {}",
            money(expense.amount),
            truncate(&expense.vendor, 20),
            truncate(&expense.category, 24),
            expense.notes
        )?;
    }
    Ok(out)
}
