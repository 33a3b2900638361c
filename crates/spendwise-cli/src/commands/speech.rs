//! Voice note transcription command

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use spendwise_core::prompts::PromptLibrary;
use spendwise_core::{Config, SpeechTranscriber};

use super::{render_expenses, report_failure, resolve_categories, run_expense};

/// MIME type for an audio file, from its extension
pub fn guess_content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mp3",
        "webm" => "audio/webm",
        "ogg" | "oga" => "audio/ogg",
        "flac" => "audio/flac",
        "m4a" | "mp4" => "audio/mp4",
        _ => return None,
    };
    Some(mime)
}

/// Transcribe an audio file; with `categorize`, extract expenses from it too
pub async fn cmd_transcribe(
    config: &Config,
    prompts: &mut PromptLibrary,
    file: &Path,
    content_type: Option<&str>,
    categorize: Option<&[String]>,
    json: bool,
) -> Result<()> {
    if !file.exists() {
        return Err(anyhow!("File not found: {}", file.display()));
    }
    let content_type = match content_type.or_else(|| guess_content_type(file)) {
        Some(ct) => ct,
        None => {
            return Err(anyhow!(
                "Cannot tell the audio format of {}; pass --content-type",
                file.display()
            ))
        }
    };
    let audio = std::fs::read(file).context("Failed to read audio file")?;
    tracing::debug!(file = %file.display(), bytes = audio.len(), content_type, "Read audio file");

    let transcript = match transcribe(config, &audio, content_type).await {
        Ok(text) => text,
        Err(e) => return Err(report_failure(e, json)),
    };

    let Some(categories) = categorize else {
        if json {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({ "transcript": transcript }))?
            );
        } else {
            println!("{}", transcript);
        }
        return Ok(());
    };

    let categories = resolve_categories(categories, config);
    match run_expense(config, prompts, &transcript, &categories).await {
        Ok(expenses) => {
            if json {
                let out = serde_json::json!({ "transcript": transcript, "expenses": expenses });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Heard: \"{}\"", transcript);
                print!("{}", render_expenses(&expenses)?);
            }
            Ok(())
        }
        Err(e) => Err(report_failure(e, json)),
    }
}

async fn transcribe(
    config: &Config,
    audio: &[u8],
    content_type: &str,
) -> spendwise_core::Result<String> {
    let transcriber = SpeechTranscriber::from_config(config)?;
    transcriber.transcribe(audio, content_type).await
}
