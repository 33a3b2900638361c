//! Prompt template commands

use anyhow::{anyhow, Result};
use spendwise_core::prompts::{default_prompts_dir, PromptId, PromptLibrary, PromptSource};

fn source_label(source: &PromptSource) -> &'static str {
    match source {
        PromptSource::Embedded => "built-in",
        PromptSource::Override(_) => "override",
    }
}

/// List templates with their version and where they were loaded from
pub fn cmd_prompts_list() -> Result<()> {
    let mut library = PromptLibrary::new();
    let prompts = library.list()?;

    println!("{:<22} {:>7}  {:<8}  {}", "ID", "VERSION", "MODEL", "SOURCE");
    println!("{}", "-".repeat(52));
    for info in prompts {
        println!(
            "{:<22} {:>7}  {:<8}  {}",
            info.id,
            info.version,
            info.modality,
            source_label(&info.source)
        );
    }

    if let Some(dir) = library.override_dir() {
        println!();
        println!("Overrides are read from {}", dir.display());
        println!("Copy `spendwise prompts show <id>` output into <id>.md there, with");
        println!("id, version and modality frontmatter, to change a template.");
    }

    Ok(())
}

/// Print one template as it will be used
pub fn cmd_prompts_show(prompt_id: &str) -> Result<()> {
    let id = PromptId::from_id(prompt_id).ok_or_else(|| {
        let known: Vec<&str> = PromptId::all().iter().map(|id| id.as_str()).collect();
        anyhow!("Unknown prompt ID: {} (available: {})", prompt_id, known.join(", "))
    })?;

    let mut library = PromptLibrary::new();
    let prompt = library.get(id)?;

    println!("Prompt:   {} v{}", prompt.header.id, prompt.header.version);
    println!("Model:    {}", prompt.header.modality);
    match &prompt.source {
        PromptSource::Embedded => println!("Source:   built-in"),
        PromptSource::Override(path) => println!("Source:   {}", path.display()),
    }
    println!();
    println!("{}", prompt.body());

    Ok(())
}

/// Print the override directory
pub fn cmd_prompts_path() -> Result<()> {
    let path = default_prompts_dir()
        .ok_or_else(|| anyhow!("No data directory is available on this system"))?;
    println!("{}", path.display());
    if !path.exists() {
        eprintln!("(does not exist yet)");
    }
    Ok(())
}
