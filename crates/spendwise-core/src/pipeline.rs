//! Receipt and free-text expense pipelines
//!
//! raw bytes -> normalized image -> model text -> payload -> reconciled result
//!
//! Each call is independent and holds no state between invocations. Failures
//! come back as `Error` at the stage that produced them; convert with
//! `FailureReport::from` for collaborators that want the structured form.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::ai::parsing::{parse_expense_response, parse_receipt_response};
use crate::ai::{VisionClient, WatsonxClient};
use crate::categories::CategorySet;
use crate::config::{Config, Credentials};
use crate::error::{Error, Result};
use crate::models::{ParsedExpense, ReceiptResult};
use crate::normalizer::{normalize_image, NormalizeOptions, NormalizedImage};
use crate::prompts::{Prompt, PromptId, PromptLibrary};
use crate::reconcile::{expenses, reconcile};

/// Photographed receipt to categorized, reconciled line items
pub struct ReceiptPipeline {
    vision: VisionClient,
    template: Prompt,
    options: NormalizeOptions,
}

impl ReceiptPipeline {
    pub fn new(vision: VisionClient, template: Prompt, options: NormalizeOptions) -> Self {
        Self {
            vision,
            template,
            options,
        }
    }

    /// watsonx-backed pipeline: inline prompt first, structured chat second
    pub fn from_config(
        config: &Config,
        credentials: Credentials,
        prompts: &mut PromptLibrary,
    ) -> Result<Self> {
        let client = Arc::new(WatsonxClient::from_config(config, credentials)?);
        let vision = VisionClient::watsonx(client, &config.watsonx.vision_model);
        let template = prompts.get(PromptId::ParseReceipt)?.clone();
        Ok(Self::new(vision, template, config.image))
    }

    /// The instruction sent with the image for a given category set
    pub fn instruction(&self, categories: &CategorySet) -> String {
        let list = categories.prompt_list();
        let mut vars = HashMap::new();
        vars.insert("categories", list.as_str());
        self.template.render_instruction(&vars)
    }

    /// Run the full pipeline on raw image bytes
    pub async fn parse(&self, image: &[u8], categories: &CategorySet) -> Result<ReceiptResult> {
        let normalized = normalize_image(image, &self.options)?;
        info!(
            hash = %normalized.content_hash,
            width = normalized.width,
            height = normalized.height,
            resized = normalized.was_resized(),
            "Receipt image normalized"
        );
        self.parse_normalized(&normalized, categories).await
    }

    /// Run extraction, parsing and reconciliation on an already normalized image
    pub async fn parse_normalized(
        &self,
        image: &NormalizedImage,
        categories: &CategorySet,
    ) -> Result<ReceiptResult> {
        let instruction = self.instruction(categories);
        let raw = self.vision.extract(image, &instruction).await?;
        debug!(hash = %image.content_hash, response = %raw, "Raw receipt response");

        let payload = parse_receipt_response(&raw)?;
        let result = reconcile(&payload, categories);

        info!(
            hash = %image.content_hash,
            items = result.item_count(),
            groups = result.grouped_items.len(),
            calculated_total = %result.calculated_total,
            receipt_total = %result.receipt_total,
            total_valid = result.total_valid,
            "Receipt parsed"
        );
        Ok(result)
    }
}

/// Free-text expense description to categorized expenses
pub struct ExpenseCategorizer {
    client: Arc<WatsonxClient>,
    model: String,
    template: Prompt,
}

impl ExpenseCategorizer {
    pub fn new(client: Arc<WatsonxClient>, model: &str, template: Prompt) -> Self {
        Self {
            client,
            model: model.to_string(),
            template,
        }
    }

    /// watsonx-backed categorizer using the configured text model
    pub fn from_config(
        config: &Config,
        credentials: Credentials,
        prompts: &mut PromptLibrary,
    ) -> Result<Self> {
        let client = Arc::new(WatsonxClient::from_config(config, credentials)?);
        let template = prompts.get(PromptId::CategorizeExpense)?.clone();
        Ok(Self::new(client, &config.watsonx.text_model, template))
    }

    /// Extract every expense mentioned in `text`
    pub async fn categorize(
        &self,
        text: &str,
        categories: &CategorySet,
    ) -> Result<Vec<ParsedExpense>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidData("Expense description is empty".into()));
        }

        let list = categories.prompt_list();
        let mut vars = HashMap::new();
        vars.insert("text", text);
        vars.insert("categories", list.as_str());
        let input = self.template.render_instruction(&vars);

        let raw = self.client.generate_text(&self.model, &input).await?;
        let entries = parse_expense_response(&raw)?;
        let parsed = expenses(&entries, categories);

        info!(count = parsed.len(), model = %self.model, "Expenses categorized");
        Ok(parsed)
    }
}
