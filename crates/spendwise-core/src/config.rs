//! Layered configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/spendwise/config/spendwise.toml)
//!    or an explicit path
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Credentials are then layered on top from the environment, which wins over
//! any `[credentials]` table in the file. The result is resolved once by the
//! caller and passed into the pipeline; nothing in the core reads the
//! environment on its own.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::normalizer::NormalizeOptions;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/spendwise.toml");

pub const ENV_API_KEY: &str = "WATSONX_API_KEY";
pub const ENV_PROJECT_ID: &str = "WATSONX_PROJECT_ID";
pub const ENV_SPEECH_API_KEY: &str = "SPEECH_TO_TEXT_API_KEY";
pub const ENV_SPEECH_URL: &str = "SPEECH_TO_TEXT_URL";

/// watsonx.ai endpoints and models
#[derive(Debug, Clone, PartialEq)]
pub struct WatsonxSettings {
    /// Inference base URL (regional)
    pub url: String,
    /// Identity token endpoint
    pub iam_url: String,
    /// `version` query parameter for the ml/v1 API
    pub api_version: String,
    /// Multimodal model for receipts
    pub vision_model: String,
    /// Text model for free-text expenses
    pub text_model: String,
    /// Per-request timeout; expiry is a transport failure
    pub timeout: Duration,
}

impl Default for WatsonxSettings {
    fn default() -> Self {
        Self {
            url: "https://us-south.ml.cloud.ibm.com".to_string(),
            iam_url: "https://iam.cloud.ibm.com/identity/token".to_string(),
            api_version: "2023-05-29".to_string(),
            vision_model: "meta-llama/llama-3-2-90b-vision-instruct".to_string(),
            text_model: "meta-llama/llama-3-3-70b-instruct".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Decoding parameters sent with every inference call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub decoding_method: String,
    pub max_new_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            decoding_method: "greedy".to_string(),
            max_new_tokens: 2000,
            temperature: 0.1,
        }
    }
}

/// Speech to Text service
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechSettings {
    pub url: String,
    pub model: String,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            url: "https://api.us-south.speech-to-text.watson.cloud.ibm.com".to_string(),
            model: "en-US_BroadbandModel".to_string(),
        }
    }
}

/// Resolved watsonx credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub project_id: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &mask(&self.api_key))
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Secrets as found, before validation
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub speech_api_key: Option<String>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("api_key", &self.api_key.as_deref().map(mask))
            .field("project_id", &self.project_id)
            .field("speech_api_key", &self.speech_api_key.as_deref().map(mask))
            .finish()
    }
}

/// Full application configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub watsonx: WatsonxSettings,
    pub generation: GenerationSettings,
    pub image: NormalizeOptions,
    pub speech: SpeechSettings,
    /// Categories used when the caller supplies none
    pub default_categories: Vec<String>,
    pub secrets: Secrets,
    /// File the settings came from, if not the embedded default
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load file layer then environment layer
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (content, source) = read_layer(path)?;
        let mut config = parse_config(&content)?;
        config.source = source;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse TOML content without consulting the environment
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }

    /// The embedded defaults with no credentials
    pub fn embedded() -> Result<Self> {
        parse_config(DEFAULT_CONFIG)
    }

    /// Overlay secrets and service URLs from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(ENV_API_KEY) {
            self.secrets.api_key = Some(key);
        }
        if let Some(project) = non_empty(ENV_PROJECT_ID) {
            self.secrets.project_id = Some(project);
        }
        if let Some(key) = non_empty(ENV_SPEECH_API_KEY) {
            self.secrets.speech_api_key = Some(key);
        }
        if let Some(url) = non_empty(ENV_SPEECH_URL) {
            self.speech.url = url;
        }
    }

    /// Validated watsonx credentials
    pub fn watsonx_credentials(&self) -> Result<Credentials> {
        let mut missing = Vec::new();
        if self.secrets.api_key.is_none() {
            missing.push(ENV_API_KEY);
        }
        if self.secrets.project_id.is_none() {
            missing.push(ENV_PROJECT_ID);
        }
        match (&self.secrets.api_key, &self.secrets.project_id) {
            (Some(key), Some(project)) => Ok(Credentials::new(key, project)),
            _ => Err(Error::Credentials(missing.join(", "))),
        }
    }

    /// Validated Speech to Text API key
    pub fn speech_api_key(&self) -> Result<String> {
        self.secrets
            .speech_api_key
            .clone()
            .ok_or_else(|| Error::Credentials(ENV_SPEECH_API_KEY.to_string()))
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("spendwise").join("config").join("spendwise.toml"))
}

/// Mask a secret for display, keeping the last four characters
pub fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

/// Read the override file if present, else the embedded default
fn read_layer(path: Option<&Path>) -> Result<(String, Option<PathBuf>)> {
    if let Some(path) = path {
        // An explicit path must exist
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        return Ok((content, Some(path.to_path_buf())));
    }

    if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let content = fs::read_to_string(&default_path)
                .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;
            return Ok((content, Some(default_path)));
        }
    }

    Ok((DEFAULT_CONFIG.to_string(), None))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    watsonx: Option<RawWatsonx>,
    generation: Option<RawGeneration>,
    image: Option<RawImage>,
    speech: Option<RawSpeech>,
    categories: Option<RawCategories>,
    credentials: Option<RawCredentials>,
}

#[derive(Debug, Deserialize)]
struct RawWatsonx {
    url: Option<String>,
    iam_url: Option<String>,
    api_version: Option<String>,
    vision_model: Option<String>,
    text_model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawGeneration {
    decoding_method: Option<String>,
    max_new_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct RawImage {
    max_dimension: Option<u32>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct RawSpeech {
    url: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCategories {
    default: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawCredentials {
    api_key: Option<String>,
    project_id: Option<String>,
    speech_api_key: Option<String>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<Config> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = Config::default();

    if let Some(w) = raw.watsonx {
        if let Some(url) = w.url {
            config.watsonx.url = url.trim_end_matches('/').to_string();
        }
        if let Some(iam_url) = w.iam_url {
            config.watsonx.iam_url = iam_url;
        }
        if let Some(version) = w.api_version {
            config.watsonx.api_version = version;
        }
        if let Some(model) = w.vision_model {
            config.watsonx.vision_model = model;
        }
        if let Some(model) = w.text_model {
            config.watsonx.text_model = model;
        }
        if let Some(secs) = w.timeout_secs {
            if secs == 0 {
                return Err(Error::Config("watsonx.timeout_secs must be positive".into()));
            }
            config.watsonx.timeout = Duration::from_secs(secs);
        }
    }

    if let Some(g) = raw.generation {
        if let Some(method) = g.decoding_method {
            config.generation.decoding_method = method;
        }
        if let Some(tokens) = g.max_new_tokens {
            config.generation.max_new_tokens = tokens;
        }
        if let Some(temperature) = g.temperature {
            config.generation.temperature = temperature;
        }
    }

    if let Some(i) = raw.image {
        if let Some(max) = i.max_dimension {
            if max == 0 {
                return Err(Error::Config("image.max_dimension must be positive".into()));
            }
            config.image.max_dimension = max;
        }
        if let Some(quality) = i.jpeg_quality {
            if !(1..=100).contains(&quality) {
                return Err(Error::Config(format!(
                    "image.jpeg_quality must be 1-100, got {}",
                    quality
                )));
            }
            config.image.jpeg_quality = quality;
        }
    }

    if let Some(s) = raw.speech {
        if let Some(url) = s.url {
            config.speech.url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = s.model {
            config.speech.model = model;
        }
    }

    if let Some(categories) = raw.categories.and_then(|c| c.default) {
        config.default_categories = categories;
    }

    if let Some(c) = raw.credentials {
        config.secrets = Secrets {
            api_key: c.api_key.filter(|v| !v.trim().is_empty()),
            project_id: c.project_id.filter(|v| !v.trim().is_empty()),
            speech_api_key: c.speech_api_key.filter(|v| !v.trim().is_empty()),
        };
    }

    Ok(config)
}
