//! Image normalization command

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use spendwise_core::{normalize_image, Config};

/// Normalize an image and write the JPEG that would be uploaded
pub fn cmd_normalize(
    config: &Config,
    input: &Path,
    output: &Path,
    max_dimension: Option<u32>,
) -> Result<()> {
    if !input.exists() {
        return Err(anyhow!("File not found: {}", input.display()));
    }
    let bytes = std::fs::read(input).context("Failed to read image")?;

    let mut options = config.image;
    if let Some(max) = max_dimension {
        options.max_dimension = max;
    }

    let normalized = normalize_image(&bytes, &options)?;
    std::fs::write(output, &normalized.jpeg)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "{} ({}x{}) -> {} ({}x{}, {} bytes)",
        input.display(),
        normalized.original_width,
        normalized.original_height,
        output.display(),
        normalized.width,
        normalized.height,
        normalized.jpeg.len()
    );
    if normalized.was_resized() {
        println!("  Downsampled to fit {} px", options.max_dimension);
    }
    println!("  SHA-256: {}", normalized.content_hash);

    Ok(())
}
