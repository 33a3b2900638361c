//! Spendwise Core Library
//!
//! Receipt and expense extraction for the Spendwise budget tracker:
//! - Image normalization for photographed receipts
//! - watsonx.ai vision extraction with ordered transport fallback
//! - Tolerant JSON recovery from model responses
//! - Category resolution and total reconciliation
//! - Free-text expense categorization and speech transcription
//! - Layered configuration and a customizable prompt library

pub mod ai;
pub mod categories;
pub mod config;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod prompts;
pub mod reconcile;

/// Test utilities including mock watsonx server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::parsing::ReceiptPayload;
pub use ai::{MockTransport, SpeechTranscriber, VisionClient, VisionTransport, WatsonxClient};
pub use categories::{CategorySet, DEFAULT_CATEGORY};
pub use config::{Config, Credentials};
pub use error::{Error, ErrorKind, FailureReport, Result, TransportStage};
pub use models::{CategoryGroup, Discount, LineItem, ParsedExpense, ReceiptResult};
pub use normalizer::{normalize_image, NormalizeOptions, NormalizedImage};
pub use pipeline::{ExpenseCategorizer, ReceiptPipeline};
pub use prompts::{Prompt, PromptId, PromptInfo, PromptLibrary, PromptSource};
