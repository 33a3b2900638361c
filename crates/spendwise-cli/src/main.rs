//! Spendwise CLI - Receipt and expense extraction
//!
//! Usage:
//!   spendwise receipt photo.jpg              Parse and reconcile a receipt
//!   spendwise expense "coffee 4.50"          Categorize a typed expense
//!   spendwise transcribe note.wav            Transcribe a voice note
//!   spendwise normalize photo.heic -o x.jpg  Check what would be uploaded

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use spendwise_core::prompts::PromptLibrary;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Receipt {
            image,
            categories,
            json,
            max_dimension,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let mut prompts = PromptLibrary::new();
            commands::cmd_receipt(&config, &mut prompts, &image, &categories, max_dimension, json)
                .await
        }
        Commands::Expense {
            text,
            categories,
            json,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let mut prompts = PromptLibrary::new();
            commands::cmd_expense(&config, &mut prompts, &text, &categories, json).await
        }
        Commands::Transcribe {
            audio,
            content_type,
            categorize,
            categories,
            json,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let mut prompts = PromptLibrary::new();
            commands::cmd_transcribe(
                &config,
                &mut prompts,
                &audio,
                content_type.as_deref(),
                categorize.then_some(categories.as_slice()),
                json,
            )
            .await
        }
        Commands::Normalize {
            image,
            output,
            max_dimension,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_normalize(&config, &image, &output, max_dimension)
        }
        Commands::Config => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_config(&config)
        }
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { prompt_id }) => commands::cmd_prompts_show(&prompt_id),
            Some(PromptsAction::Path) => commands::cmd_prompts_path(),
        },
    }
}
