use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::gateway::GenerationParams;
use crate::provider::Provider;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:8787";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub ollama_url: Option<String>,
    pub relay_url: Option<String>,
    #[serde(default)]
    pub forward_history: bool,
    pub generation: Option<GenerationParams>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn save_model(model: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.model = Some(model.to_string());
        config.save()
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("gemchat").join("config.json"))
    }

    pub fn provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(Provider::from_str)
            .unwrap_or(Provider::Gemini)
    }

    pub fn model_for(&self, provider: Provider) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string())
    }

    /// Environment wins over the config file so keys can stay out of it
    /// entirely.
    pub fn gemini_key(&self) -> Option<String> {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.gemini_api_key.clone())
    }

    pub fn ollama_url(&self) -> String {
        self.ollama_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
    }

    pub fn relay_url(&self) -> String {
        self.relay_url
            .clone()
            .unwrap_or_else(|| DEFAULT_RELAY_URL.to_string())
    }

    pub fn generation(&self) -> GenerationParams {
        self.generation.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.provider(), Provider::Gemini);
        assert!(!config.forward_history);
        assert_eq!(config.generation(), GenerationParams::default());
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::new();
        config.provider = Some("ollama".to_string());
        config.model = Some("llama3.2:latest".to_string());
        config.forward_history = true;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.provider(), Provider::Ollama);
        assert_eq!(loaded.model_for(Provider::Ollama), "llama3.2:latest");
        assert!(loaded.forward_history);
    }

    #[test]
    fn model_falls_back_per_provider() {
        let config = Config::new();
        assert_eq!(config.model_for(Provider::Gemini), "gemini-2.0-flash-exp");
        assert_eq!(config.model_for(Provider::Ollama), "llama3.2:latest");
    }
}
