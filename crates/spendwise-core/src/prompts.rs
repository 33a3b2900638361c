//! Instruction templates for the watsonx calls
//!
//! Each template is a markdown file with YAML frontmatter (`id`, `version`,
//! `modality`) followed by an optional `# System` section and a `# User`
//! section. `{{name}}` placeholders in either section are filled at call time.
//!
//! A file named `<id>.md` in the override directory
//! (`~/.local/share/spendwise/prompts/overrides/` by default) replaces the
//! template compiled into the binary.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

const RECEIPT_TEMPLATE: &str = include_str!("../../../prompts/parse_receipt.md");
const EXPENSE_TEMPLATE: &str = include_str!("../../../prompts/categorize_expense.md");

/// The templates the pipeline knows how to fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Receipt image to items, discounts, tax and total
    ParseReceipt,
    /// Free-text description to a list of expenses
    CategorizeExpense,
}

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseReceipt => "parse_receipt",
            Self::CategorizeExpense => "categorize_expense",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::all().iter().copied().find(|p| p.as_str() == id)
    }

    pub fn all() -> &'static [PromptId] {
        &[Self::ParseReceipt, Self::CategorizeExpense]
    }

    fn embedded(&self) -> &'static str {
        match self {
            Self::ParseReceipt => RECEIPT_TEMPLATE,
            Self::CategorizeExpense => EXPENSE_TEMPLATE,
        }
    }

    fn file_name(&self) -> String {
        format!("{}.md", self.as_str())
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which model family a template is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Vision,
    Text,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vision => f.write_str("vision"),
            Self::Text => f.write_str("text"),
        }
    }
}

/// Frontmatter of a template file
#[derive(Debug, Clone, Deserialize)]
pub struct PromptHeader {
    pub id: String,
    pub version: u32,
    pub modality: Modality,
}

/// Where a loaded template came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    Embedded,
    Override(PathBuf),
}

/// A parsed template
#[derive(Debug, Clone)]
pub struct Prompt {
    pub header: PromptHeader,
    /// Text of the `# System` section, if the file has one
    pub system: Option<String>,
    /// Text of the `# User` section (the whole body when there are no headings)
    pub user: String,
    pub source: PromptSource,
}

impl Prompt {
    /// Parse a template file
    pub fn parse(text: &str, source: PromptSource) -> Result<Self> {
        let (frontmatter, body) = split_frontmatter(text)?;
        let header: PromptHeader = serde_yaml::from_str(frontmatter)
            .map_err(|e| Error::InvalidData(format!("Invalid prompt frontmatter: {}", e)))?;
        let (system, user) = split_sections(body);
        if user.is_empty() {
            return Err(Error::InvalidData(format!(
                "Prompt '{}' has no user section",
                header.id
            )));
        }
        Ok(Self {
            header,
            system,
            user,
            source,
        })
    }

    pub fn is_override(&self) -> bool {
        matches!(self.source, PromptSource::Override(_))
    }

    /// Template body as it would appear in a file, without frontmatter
    pub fn body(&self) -> String {
        match &self.system {
            Some(system) => format!("# System\n{}\n\n# User\n{}", system, self.user),
            None => self.user.clone(),
        }
    }

    /// Single instruction string for one model call
    ///
    /// Both endpoints take one text input, so a system section is placed
    /// ahead of the filled user section.
    pub fn render_instruction(&self, vars: &HashMap<&str, &str>) -> String {
        let user = fill(&self.user, vars);
        match &self.system {
            Some(system) if !system.is_empty() => format!("{}\n\n{}", fill(system, vars), user),
            _ => user,
        }
    }
}

/// Loads templates once per id, preferring override files
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    loaded: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Library using the default override directory
    pub fn new() -> Self {
        Self {
            override_dir: default_prompts_dir(),
            loaded: HashMap::new(),
        }
    }

    pub fn with_override_dir(path: PathBuf) -> Self {
        Self {
            override_dir: Some(path),
            loaded: HashMap::new(),
        }
    }

    /// Library that ignores override files
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            loaded: HashMap::new(),
        }
    }

    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        match self.loaded.entry(id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let prompt = load_prompt(self.override_dir.as_deref(), id)?;
                Ok(entry.insert(prompt))
            }
        }
    }

    /// Every known template with its version and source
    pub fn list(&mut self) -> Result<Vec<PromptInfo>> {
        PromptId::all()
            .iter()
            .map(|&id| {
                let prompt = self.get(id)?;
                Ok(PromptInfo {
                    id,
                    version: prompt.header.version,
                    modality: prompt.header.modality,
                    source: prompt.source.clone(),
                })
            })
            .collect()
    }

    pub fn override_dir(&self) -> Option<&Path> {
        self.override_dir.as_deref()
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary row for listing templates
#[derive(Debug, Clone)]
pub struct PromptInfo {
    pub id: PromptId,
    pub version: u32,
    pub modality: Modality,
    pub source: PromptSource,
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("spendwise").join("prompts").join("overrides"))
}

fn load_prompt(override_dir: Option<&Path>, id: PromptId) -> Result<Prompt> {
    let path = override_dir.map(|dir| dir.join(id.file_name()));
    let Some(path) = path.filter(|p| p.exists()) else {
        return Prompt::parse(id.embedded(), PromptSource::Embedded);
    };

    let text = fs::read_to_string(&path).map_err(|e| {
        Error::InvalidData(format!("Failed to read prompt {}: {}", path.display(), e))
    })?;
    let prompt = Prompt::parse(&text, PromptSource::Override(path.clone()))?;
    if prompt.header.id != id.as_str() {
        return Err(Error::InvalidData(format!(
            "Prompt override {} declares id '{}', expected '{}'",
            path.display(),
            prompt.header.id,
            id
        )));
    }
    Ok(prompt)
}

/// Split `---` delimited frontmatter from the body
fn split_frontmatter(text: &str) -> Result<(&str, &str)> {
    let text = text.trim_start();
    let rest = text
        .strip_prefix("---")
        .ok_or_else(|| Error::InvalidData("Prompt must start with YAML frontmatter (---)".into()))?;
    let end = rest
        .find("\n---")
        .ok_or_else(|| Error::InvalidData("Prompt frontmatter is not closed".into()))?;
    let body = &rest[end + 4..];
    Ok((rest[..end].trim(), body.trim()))
}

/// Split a body into its `# System` and `# User` sections
fn split_sections(body: &str) -> (Option<String>, String) {
    let mut system: Option<Vec<&str>> = None;
    let mut user: Vec<&str> = Vec::new();
    let mut in_system = false;
    let mut saw_heading = false;

    for line in body.lines() {
        match line.trim_end() {
            "# System" => {
                in_system = true;
                saw_heading = true;
                system.get_or_insert_with(Vec::new);
            }
            "# User" => {
                in_system = false;
                saw_heading = true;
            }
            _ if in_system => {
                if let Some(lines) = system.as_mut() {
                    lines.push(line);
                }
            }
            _ => user.push(line),
        }
    }

    // A body with only a system heading is all system text; treat it as user
    if saw_heading && user.iter().all(|l| l.trim().is_empty()) {
        if let Some(lines) = system.take() {
            return (None, lines.join("\n").trim().to_string());
        }
    }

    (
        system.map(|lines| lines.join("\n").trim().to_string()),
        user.join("\n").trim().to_string(),
    )
}

/// Replace `{{name}}` placeholders; unknown names are left as written
fn fill(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
