//! Argument definitions for the `spendwise` binary
//!
//! Parsing only; each subcommand is carried out in `commands`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Spendwise - Turn receipts and spoken or typed expenses into budget entries
#[derive(Parser)]
#[command(name = "spendwise")]
#[command(about = "Receipt and expense extraction for the Spendwise budget tracker", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to the data-dir override, then built-in defaults)
    ///
    /// Credentials come from WATSONX_API_KEY, WATSONX_PROJECT_ID and
    /// SPEECH_TO_TEXT_API_KEY, which win over a [credentials] table in the file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract, categorize and reconcile a photographed receipt
    Receipt {
        /// Receipt image (JPEG, PNG, WebP, ...)
        image: PathBuf,

        /// Budget category to choose from (repeatable; defaults to config)
        #[arg(short, long = "category", value_name = "NAME")]
        categories: Vec<String>,

        /// Print the result (or failure report) as JSON
        #[arg(long)]
        json: bool,

        /// Override the longest-side bound for the uploaded image
        #[arg(long)]
        max_dimension: Option<u32>,
    },

    /// Extract expenses from a free-text description
    Expense {
        /// Description, e.g. "lunch at chipotle 12.50 and 40 for gas"
        text: String,

        /// Budget category to choose from (repeatable; defaults to config)
        #[arg(short, long = "category", value_name = "NAME")]
        categories: Vec<String>,

        /// Print the expenses (or failure report) as JSON
        #[arg(long)]
        json: bool,
    },

    /// Transcribe a voice note, optionally extracting expenses from it
    Transcribe {
        /// Audio file (wav, mp3, webm, ogg, flac)
        audio: PathBuf,

        /// Audio MIME type (guessed from the extension if omitted)
        #[arg(long)]
        content_type: Option<String>,

        /// Run the transcript through expense extraction
        #[arg(long)]
        categorize: bool,

        /// Budget category to choose from when categorizing (repeatable)
        #[arg(short, long = "category", value_name = "NAME")]
        categories: Vec<String>,

        /// Print the output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Normalize a receipt image without sending it anywhere
    Normalize {
        /// Input image
        image: PathBuf,

        /// Where to write the normalized JPEG
        #[arg(short, long)]
        output: PathBuf,

        /// Override the longest-side bound
        #[arg(long)]
        max_dimension: Option<u32>,
    },

    /// Show the resolved configuration (secrets masked)
    Config,

    /// Manage prompt templates
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// Templates with version, model and source (default)
    List,

    /// Print one template as it will be sent
    Show {
        /// Prompt ID (parse_receipt, categorize_expense)
        prompt_id: String,
    },

    /// Print the override directory
    Path,
}
