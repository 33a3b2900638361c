//! watsonx.ai client
//!
//! Every call starts with an API key to bearer token exchange against the
//! identity service, then issues one inference request. Tokens are not
//! cached; each call stands alone.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Config, Credentials, GenerationSettings, WatsonxSettings};
use crate::error::{Error, Result, TransportStage};
use crate::normalizer::NormalizedImage;

use super::VisionTransport;

const IAM_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Upper bound on how much of an error body is kept in a transport error
const MAX_ERROR_BODY: usize = 500;

/// HTTP client for the identity service and watsonx.ai inference
pub struct WatsonxClient {
    http: Client,
    base_url: String,
    iam_url: String,
    api_version: String,
    generation: GenerationSettings,
    credentials: Credentials,
}

impl WatsonxClient {
    /// Create a client with an explicit request timeout
    pub fn new(
        settings: &WatsonxSettings,
        generation: &GenerationSettings,
        credentials: Credentials,
    ) -> Result<Self> {
        Ok(Self {
            http: build_http_client(settings.timeout)?,
            base_url: settings.url.trim_end_matches('/').to_string(),
            iam_url: settings.iam_url.clone(),
            api_version: settings.api_version.clone(),
            generation: generation.clone(),
            credentials,
        })
    }

    /// Create from resolved configuration and credentials
    pub fn from_config(config: &Config, credentials: Credentials) -> Result<Self> {
        Self::new(&config.watsonx, &config.generation, credentials)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange the API key for a bearer token
    pub async fn access_token(&self) -> Result<String> {
        exchange_token(&self.http, &self.iam_url, &self.credentials.api_key).await
    }

    /// Text generation; returns the first result's generated text
    pub async fn generate_text(&self, model: &str, input: &str) -> Result<String> {
        let token = self.access_token().await?;

        let request = TextGenerationRequest {
            model_id: model,
            input,
            project_id: &self.credentials.project_id,
            parameters: GenerationParameters {
                decoding_method: &self.generation.decoding_method,
                max_new_tokens: self.generation.max_new_tokens,
                temperature: self.generation.temperature,
            },
        };

        let response = self
            .http
            .post(format!("{}/ml/v1/text/generation", self.base_url))
            .query(&[("version", self.api_version.as_str())])
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(TransportStage::Inference, e))?;

        let body: TextGenerationResponse = check_status(response, TransportStage::Inference)
            .await?
            .json()
            .await
            .map_err(|e| Error::from_reqwest(TransportStage::Inference, e))?;

        let text = body
            .results
            .into_iter()
            .next()
            .map(|r| r.generated_text)
            .ok_or_else(|| {
                Error::transport(TransportStage::Inference, "response contained no results")
            })?;
        debug!(model, response = %text, "Text generation response");
        Ok(text)
    }

    /// Chat completion with a single user message
    pub async fn chat(&self, model: &str, content: Vec<ContentPart>) -> Result<String> {
        let token = self.access_token().await?;

        let request = ChatRequest {
            model_id: model,
            project_id: &self.credentials.project_id,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
            max_tokens: self.generation.max_new_tokens,
            temperature: self.generation.temperature,
        };

        let response = self
            .http
            .post(format!("{}/ml/v1/text/chat", self.base_url))
            .query(&[("version", self.api_version.as_str())])
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(TransportStage::Inference, e))?;

        let body: ChatResponse = check_status(response, TransportStage::Inference)
            .await?
            .json()
            .await
            .map_err(|e| Error::from_reqwest(TransportStage::Inference, e))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                Error::transport(TransportStage::Inference, "response contained no choices")
            })?;
        debug!(model, response = %text, "Chat response");
        Ok(text)
    }
}

/// Build the shared HTTP client with an explicit timeout
pub(crate) fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))
}

/// API key to bearer token exchange with the identity service
pub(crate) async fn exchange_token(http: &Client, iam_url: &str, api_key: &str) -> Result<String> {
    let response = http
        .post(iam_url)
        .form(&[("grant_type", IAM_GRANT_TYPE), ("apikey", api_key)])
        .send()
        .await
        .map_err(|e| Error::from_reqwest(TransportStage::TokenExchange, e))?;

    let token: TokenResponse = check_status(response, TransportStage::TokenExchange)
        .await?
        .json()
        .await
        .map_err(|e| Error::from_reqwest(TransportStage::TokenExchange, e))?;

    Ok(token.access_token)
}

/// Turn a non-success status into a transport error carrying status and body
pub(crate) async fn check_status(response: Response, stage: TransportStage) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let mut body = body.trim().to_string();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    Err(Error::transport(stage, format!("{}: {}", status, body)))
}

/// Image embedded in a text generation prompt as `<image>data-url</image>`
pub struct InlinePromptTransport {
    client: Arc<WatsonxClient>,
    model: String,
}

impl InlinePromptTransport {
    pub fn new(client: Arc<WatsonxClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl VisionTransport for InlinePromptTransport {
    fn name(&self) -> &str {
        "inline_prompt"
    }

    async fn send(&self, image: &NormalizedImage, instruction: &str) -> Result<String> {
        let input = format!("<image>{}</image>\n\n{}", image.data_url(), instruction);
        self.client.generate_text(&self.model, &input).await
    }
}

/// Image sent as an `image_url` content part of a chat message
pub struct ChatTransport {
    client: Arc<WatsonxClient>,
    model: String,
}

impl ChatTransport {
    pub fn new(client: Arc<WatsonxClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl VisionTransport for ChatTransport {
    fn name(&self) -> &str {
        "chat"
    }

    async fn send(&self, image: &NormalizedImage, instruction: &str) -> Result<String> {
        let content = vec![
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_url(),
                },
            },
            ContentPart::Text {
                text: instruction.to_string(),
            },
        ];
        self.client.chat(&self.model, content).await
    }
}

/// Identity service response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct GenerationParameters<'a> {
    decoding_method: &'a str,
    max_new_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct TextGenerationRequest<'a> {
    model_id: &'a str,
    input: &'a str,
    project_id: &'a str,
    parameters: GenerationParameters<'a>,
}

#[derive(Debug, Deserialize)]
struct TextGenerationResponse {
    #[serde(default)]
    results: Vec<GenerationResult>,
}

#[derive(Debug, Deserialize)]
struct GenerationResult {
    generated_text: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model_id: &'a str,
    project_id: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

/// One part of a multimodal chat message
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Image reference for vision chat requests
#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}
