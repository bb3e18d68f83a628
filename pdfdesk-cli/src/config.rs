use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pdfdesk_core::session::DEFAULT_ZOOM;
use pdfdesk_services::{SummarizeConfig, TranslateConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CONFIG_FILE: &str = "config.toml";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Bookmark sidecar; defaults to `bookmarks.json` in the data directory.
    pub bookmarks_path: Option<PathBuf>,
    pub default_zoom: f32,
    pub translation: TranslateConfig,
    pub summarization: SummarizeConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bookmarks_path: None,
            default_zoom: DEFAULT_ZOOM,
            translation: TranslateConfig::default(),
            summarization: SummarizeConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw =
                fs::read_to_string(path).with_context(|| format!("failed to read {:?}", path))?;
            toml::from_str(&raw).with_context(|| format!("invalid config file {:?}", path))?
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            AppConfig::default()
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.summarization.api_key = Some(key);
            }
        }
    }

    pub fn bookmarks_path(&self, data_dir: &Path) -> PathBuf {
        self.bookmarks_path
            .clone()
            .unwrap_or_else(|| data_dir.join("bookmarks.json"))
    }
}
