//! Model access for receipts, free-text expenses and speech
//!
//! # Architecture
//!
//! - `VisionTransport` trait: one way of delivering an image and instruction
//!   to a multimodal model and getting text back
//! - `VisionClient`: an ordered list of transports; the first that answers wins
//! - `WatsonxClient`: HTTP client for the identity service and watsonx.ai
//! - `SpeechTranscriber`: Speech to Text client for voice-entered expenses
//! - `parsing`: JSON recovery from free-form model output
//!
//! # Usage
//!
//! ```rust,ignore
//! let client = Arc::new(WatsonxClient::from_config(&config, credentials)?);
//! let vision = VisionClient::watsonx(client, &config.watsonx.vision_model);
//! let raw = vision.extract(&image, &instruction).await?;
//! ```

mod mock;
pub mod parsing;
mod speech;
mod watsonx;

pub use mock::MockTransport;
pub use speech::SpeechTranscriber;
pub use watsonx::{ChatTransport, ContentPart, InlinePromptTransport, WatsonxClient};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::normalizer::NormalizedImage;

/// A delivery strategy for vision requests
///
/// Implementations return the model's raw text and do no interpretation.
#[async_trait]
pub trait VisionTransport: Send + Sync {
    /// Short strategy name for logs
    fn name(&self) -> &str;

    /// Send the image and instruction, returning the response text
    async fn send(&self, image: &NormalizedImage, instruction: &str) -> Result<String>;
}

/// Ordered fallback over vision transports
pub struct VisionClient {
    strategies: Vec<Box<dyn VisionTransport>>,
}

impl VisionClient {
    /// Create a client trying `strategies` in order
    pub fn new(strategies: Vec<Box<dyn VisionTransport>>) -> Self {
        Self { strategies }
    }

    /// Inline prompt first, then structured chat, both against `model`
    pub fn watsonx(client: Arc<WatsonxClient>, model: &str) -> Self {
        Self::new(vec![
            Box::new(InlinePromptTransport::new(client.clone(), model)),
            Box::new(ChatTransport::new(client, model)),
        ])
    }

    /// Strategy names in the order they are tried
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run strategies until one returns text
    ///
    /// If every strategy fails, the last failure is returned.
    pub async fn extract(&self, image: &NormalizedImage, instruction: &str) -> Result<String> {
        let mut last_error = None;

        for strategy in &self.strategies {
            debug!(strategy = strategy.name(), "Sending vision request");
            match strategy.send(image, instruction).await {
                Ok(text) => {
                    info!(
                        strategy = strategy.name(),
                        chars = text.len(),
                        "Vision response received"
                    );
                    return Ok(text);
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "Vision strategy failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::InvalidData("No vision strategies configured".into())))
    }
}
