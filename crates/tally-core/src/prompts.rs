//! Prompts sent to the LLM
//!
//! Each prompt is a markdown file with YAML frontmatter. The copy compiled
//! into the binary is used unless a file of the same name exists in the
//! override directory (`~/.local/share/tally/prompts/`). Overrides are read
//! on every `get`, so edits apply without a restart.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

const FRONTMATTER_FENCE: &str = "---";

/// The prompts Tally knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Statement pages -> JSON array of transactions
    ExtractTransactions,
    /// Stored transactions + reference documents -> updates and summary
    EnrichTransactions,
    /// Transactions without merchant -> `{id: merchant}` map
    SuggestMerchants,
}

impl PromptId {
    pub const ALL: [PromptId; 3] = [
        Self::ExtractTransactions,
        Self::EnrichTransactions,
        Self::SuggestMerchants,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtractTransactions => "extract_transactions",
            Self::EnrichTransactions => "enrich_transactions",
            Self::SuggestMerchants => "suggest_merchants",
        }
    }

    fn file_name(&self) -> String {
        format!("{}.md", self.as_str())
    }

    fn embedded(&self) -> &'static str {
        match self {
            Self::ExtractTransactions => include_str!("../../../prompts/extract_transactions.md"),
            Self::EnrichTransactions => include_str!("../../../prompts/enrich_transactions.md"),
            Self::SuggestMerchants => include_str!("../../../prompts/suggest_merchants.md"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    pub version: u32,
    #[serde(default)]
    pub description: String,
}

/// A prompt ready for rendering
#[derive(Debug, Clone)]
pub struct Prompt {
    pub metadata: PromptMetadata,
    pub template: String,
    /// Loaded from the override directory rather than the binary
    pub overridden: bool,
}

impl Prompt {
    /// Substitute `{{name}}` placeholders; unknown placeholders are left as is
    pub fn render(&self, vars: &HashMap<&str, &str>) -> String {
        vars.iter().fold(self.template.clone(), |text, (name, value)| {
            text.replace(&format!("{{{{{}}}}}", name), value)
        })
    }

    fn parse(source: &str, overridden: bool) -> Result<Self> {
        let rest = source
            .trim()
            .strip_prefix(FRONTMATTER_FENCE)
            .ok_or_else(|| Error::InvalidData("Prompt is missing its frontmatter".into()))?;
        let (frontmatter, body) = rest
            .split_once(FRONTMATTER_FENCE)
            .ok_or_else(|| Error::InvalidData("Prompt frontmatter is not closed".into()))?;

        let metadata = serde_yaml::from_str(frontmatter)
            .map_err(|e| Error::InvalidData(format!("Invalid prompt frontmatter: {}", e)))?;

        Ok(Self {
            metadata,
            template: body.trim().to_string(),
            overridden,
        })
    }
}

/// Resolves prompts against an optional override directory
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
}

impl PromptLibrary {
    /// Library using the per-user override directory
    pub fn new() -> Self {
        Self {
            override_dir: default_override_dir(),
        }
    }

    pub fn with_override_dir(path: impl Into<PathBuf>) -> Self {
        Self {
            override_dir: Some(path.into()),
        }
    }

    /// Library that ignores overrides
    pub fn embedded_only() -> Self {
        Self { override_dir: None }
    }

    pub fn get(&self, id: PromptId) -> Result<Prompt> {
        match self.override_path(id) {
            Some(path) => {
                let source = fs::read_to_string(&path).map_err(|e| {
                    Error::InvalidData(format!(
                        "Failed to read prompt override {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Prompt::parse(&source, true)
            }
            None => Prompt::parse(id.embedded(), false),
        }
    }

    /// Prompts currently replaced by a file in the override directory
    pub fn overridden(&self) -> Vec<PromptId> {
        PromptId::ALL
            .into_iter()
            .filter(|id| self.override_path(*id).is_some())
            .collect()
    }

    pub fn override_dir(&self) -> Option<&Path> {
        self.override_dir.as_deref()
    }

    fn override_path(&self, id: PromptId) -> Option<PathBuf> {
        self.override_dir
            .as_ref()
            .map(|dir| dir.join(id.file_name()))
            .filter(|path| path.is_file())
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

fn default_override_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("prompts"))
}
