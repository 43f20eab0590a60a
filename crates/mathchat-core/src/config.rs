//! Session configuration: backend endpoint, model catalog, system prompt.
//!
//! Configuration is an explicit value handed to `ChatSession` at
//! construction. Loads from a TOML file with sensible defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default backend endpoint (local Ollama-compatible server).
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an expert assistant for computer algebra systems and the \
     mathematics behind them. Prefer precise, compact answers; use \
     $...$ for inline math and $$...$$ for display math.";

/// Where a model runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Local,
    Cloud,
}

/// One entry in the model catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub name: String,
    pub kind: ModelKind,
    #[serde(default)]
    pub description: String,
}

impl ModelEntry {
    fn new(id: &str, name: &str, kind: ModelKind, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            description: description.to_string(),
        }
    }
}

/// Chat client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the model backend.
    pub endpoint: String,
    /// Model id selected when the session starts.
    pub default_model: String,
    /// System prompt prepended to every request context.
    pub system_prompt: String,
    /// Available models.
    pub models: Vec<ModelEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            default_model: "deepseek-r1:8b".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            models: vec![
                ModelEntry::new(
                    "deepseek-r1:8b",
                    "DeepSeek Local",
                    ModelKind::Local,
                    "Local reasoning model",
                ),
                ModelEntry::new(
                    "deepseek-v3.1:671b-cloud",
                    "DeepSeek 3.1",
                    ModelKind::Cloud,
                    "Hybrid thinking model",
                ),
                ModelEntry::new(
                    "gpt-oss:120b-cloud",
                    "GPT OSS",
                    ModelKind::Cloud,
                    "Large open-source model",
                ),
                ModelEntry::new(
                    "kimi-k2-thinking:cloud",
                    "Kimi Thinking",
                    ModelKind::Cloud,
                    "Moonshot thinking model",
                ),
            ],
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// A missing file yields the built-in defaults; an unreadable or
    /// invalid file is an error.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or the
    /// endpoint URL is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.endpoint)
            .with_context(|| format!("Invalid endpoint URL: {}", self.endpoint))?;
        Ok(())
    }

    /// Looks up a catalog entry by id.
    pub fn model(&self, id: &str) -> Option<&ModelEntry> {
        self.models.iter().find(|model| model.id == id)
    }
}
