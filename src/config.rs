use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    pub news_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,

    /// Shared secret required by the scheduled sweep entry point.
    pub sweep_secret: Option<String>,

    /// Country served by the provider's direct headline endpoint.
    #[serde(default = "default_home_country")]
    pub home_country: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("factfeed");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("articles.db").to_string_lossy().to_string()
}

fn default_home_country() -> String {
    "us".to_string()
}

fn default_page_size() -> u32 {
    20
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            news_api_key: None,
            anthropic_api_key: None,
            sweep_secret: None,
            home_country: default_home_country(),
            page_size: default_page_size(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        // Environment variables take over when the file has no keys.
        if config.news_api_key.is_none() {
            config.news_api_key = std::env::var("NEWS_API_KEY").ok();
        }
        if config.anthropic_api_key.is_none() {
            config.anthropic_api_key = std::env::var("ANTHROPIC_API_KEY").ok();
        }
        if config.sweep_secret.is_none() {
            config.sweep_secret = std::env::var("SWEEP_SECRET").ok();
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("factfeed")
            .join("config.toml")
    }
}
