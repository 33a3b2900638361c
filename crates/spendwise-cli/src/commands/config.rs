//! Configuration display command

use std::fmt::Write as _;

use anyhow::Result;
use spendwise_core::config::{default_config_path, mask, Config};

/// Print the resolved configuration
pub fn cmd_config(config: &Config) -> Result<()> {
    print!("{}", render_config(config)?);
    Ok(())
}

/// Resolved configuration with secrets masked
pub fn render_config(config: &Config) -> Result<String> {
    let mut out = String::new();

    let source = match &config.source {
        Some(path) => path.display().to_string(),
        None => "built-in defaults".to_string(),
    };
    writeln!(out, "Config source: {}", source)?;
    if config.source.is_none() {
        if let Some(path) = default_config_path() {
            writeln!(out, "Override path: {}", path.display())?;
        }
    }

    writeln!(out, "\n[watsonx]")?;
    writeln!(out, "  url           {}", config.watsonx.url)?;
    writeln!(out, "  iam_url       {}", config.watsonx.iam_url)?;
    writeln!(out, "  api_version   {}", config.watsonx.api_version)?;
    writeln!(out, "  vision_model  {}", config.watsonx.vision_model)?;
    writeln!(out, "  text_model    {}", config.watsonx.text_model)?;
    writeln!(out, "  timeout       {}s", config.watsonx.timeout.as_secs())?;

    writeln!(out, "\n[generation]")?;
    writeln!(out, "  decoding      {}", config.generation.decoding_method)?;
    writeln!(out, "  max tokens    {}", config.generation.max_new_tokens)?;
    writeln!(out, "  temperature   {}", config.generation.temperature)?;

    writeln!(out, "\n[image]")?;
    writeln!(out, "  max_dimension {}", config.image.max_dimension)?;
    writeln!(out, "  jpeg_quality  {}", config.image.jpeg_quality)?;

    writeln!(out, "\n[speech]")?;
    writeln!(out, "  url           {}", config.speech.url)?;
    writeln!(out, "  model         {}", config.speech.model)?;

    writeln!(out, "\n[credentials]")?;
    let secret = |value: &Option<String>| match value {
        Some(v) => mask(v),
        None => "(not set)".to_string(),
    };
    writeln!(out, "  api_key       {}", secret(&config.secrets.api_key))?;
    writeln!(
        out,
        "  project_id    {}",
        config.secrets.project_id.as_deref().unwrap_or("(not set)")
    )?;
    writeln!(out, "  speech key    {}", secret(&config.secrets.speech_api_key))?;

    writeln!(out, "\n[categories]")?;
    if config.default_categories.is_empty() {
        writeln!(out, "  (none; everything goes to Miscellaneous)")?;
    }
    for name in &config.default_categories {
        writeln!(out, "  - {}", name)?;
    }

    Ok(out)
}
