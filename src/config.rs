//! Configuration management

use anyhow::Result;
use std::path::PathBuf;

/// Runtime configuration, loaded once at startup and passed into the
/// router at construction. There is no hidden global reload; the persisted
/// state documents under `data_dir` are re-read by their stores as needed.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token
    pub telegram_token: String,

    /// The single operator account. Messages sent by this account are
    /// classified as outgoing; it holds unconditional owner rights.
    pub owner_id: i64,

    /// Directory holding the persisted state documents
    pub data_dir: PathBuf,

    /// Outgoing translation source language (fixed)
    pub source_lang: String,

    /// Outgoing translation target language (fixed)
    pub target_lang: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let telegram_token = std::env::var("TELOXIDE_TOKEN")
            .or_else(|_| std::env::var("TELEGRAM_BOT_TOKEN"))
            .map_err(|_| anyhow::anyhow!("TELOXIDE_TOKEN must be set"))?;

        let owner_id = std::env::var("OWNER_ID")
            .map_err(|_| anyhow::anyhow!("OWNER_ID must be set"))?
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("OWNER_ID must be a numeric Telegram id"))?;

        let data_dir = std::env::var("PANELBOT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let source_lang =
            std::env::var("PANELBOT_SOURCE_LANG").unwrap_or_else(|_| "id".to_string());
        let target_lang =
            std::env::var("PANELBOT_TARGET_LANG").unwrap_or_else(|_| "en".to_string());

        Ok(Self {
            telegram_token,
            owner_id,
            data_dir,
            source_lang,
            target_lang,
        })
    }

    pub fn access_file(&self) -> PathBuf {
        self.data_dir.join("access.json")
    }

    pub fn translations_file(&self) -> PathBuf {
        self.data_dir.join("translations.json")
    }

    pub fn panel_file(&self) -> PathBuf {
        self.data_dir.join("panel.json")
    }
}
