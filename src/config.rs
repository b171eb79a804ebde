//! Configuration loading and defaults.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";

// === Types ===

/// Resolved configuration, including defaults and environment overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub chat_model: Option<String>,
    pub image_model: Option<String>,
}

// === Config Loading ===

impl Config {
    /// Load configuration from an optional TOML file and merge with
    /// environment overrides.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = path.or_else(default_config_path);
        let mut config = match path {
            Some(ref path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            _ => Config::default(),
        };

        apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Validate that configured fields are usable.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref key) = self.api_key
            && key.trim().is_empty()
        {
            anyhow::bail!("api_key cannot be empty string");
        }
        Ok(())
    }

    /// Read the API key from config/environment.
    pub fn api_key(&self) -> Result<String> {
        if let Some(configured) = self.api_key.clone()
            && !configured.trim().is_empty()
        {
            return Ok(configured);
        }

        anyhow::bail!(
            "Gemini API key not found. Set it using one of these methods:\n\
             1. Set GEMINI_API_KEY environment variable (recommended)\n\
             2. Add 'api_key = \"your-key\"' to ~/.config/aihub/config.toml"
        )
    }

    /// Base URL with the trailing slash trimmed.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    }

    #[must_use]
    pub fn chat_model(&self) -> String {
        self.chat_model
            .clone()
            .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string())
    }

    #[must_use]
    pub fn image_model(&self) -> String {
        self.image_model
            .clone()
            .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string())
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("aihub").join("config.toml"))
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(value) = std::env::var("GEMINI_API_KEY")
        && !value.trim().is_empty()
    {
        config.api_key = Some(value);
    }
    if let Ok(value) = std::env::var("AIHUB_BASE_URL") {
        config.base_url = Some(value);
    }
    if let Ok(value) = std::env::var("AIHUB_CHAT_MODEL") {
        config.chat_model = Some(value);
    }
    if let Ok(value) = std::env::var("AIHUB_IMAGE_MODEL") {
        config.image_model = Some(value);
    }
}
