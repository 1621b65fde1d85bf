//! Translation Config Store
//!
//! Global/per-chat translation toggles plus the map of tracked source
//! identities. Every mutation rewrites the whole document synchronously so
//! the on-disk state never lags a handler's view of it.

use crate::error::{BotError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Forwarding rule for one tracked identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRule {
    #[serde(rename = "forwardTo")]
    pub forward_to: String,
    pub lang: String,
    #[serde(rename = "addedBy")]
    pub added_by: String,
    #[serde(rename = "addedAt")]
    pub added_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default)]
    pub global: bool,
    #[serde(default)]
    pub chats: HashMap<String, bool>,
    #[serde(default)]
    pub targets: HashMap<String, TargetRule>,
}

pub struct TranslationStore {
    path: PathBuf,
    state: Mutex<TranslationConfig>,
}

impl TranslationStore {
    /// Load the document, upgrading the legacy shape (a bare chat -> bool
    /// map) in place. Unreadable files start from an empty config.
    pub fn load(path: PathBuf) -> Self {
        let state = match std::fs::read_to_string(&path) {
            Ok(raw) => parse_config(&raw).unwrap_or_else(|e| {
                tracing::warn!("translation document unreadable, starting empty: {}", e);
                TranslationConfig::default()
            }),
            Err(_) => TranslationConfig::default(),
        };
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// A chat is translation-enabled iff the global flag is set or the
    /// chat has a true override.
    pub fn is_enabled_for(&self, chat_id: i64) -> bool {
        let state = self.state.lock().unwrap();
        state.global || state.chats.get(&chat_id.to_string()).copied().unwrap_or(false)
    }

    pub fn set_global(&self, enabled: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.global = enabled;
        self.persist(&state)
    }

    /// `Some(true)` enables the chat, `None` removes the override.
    pub fn set_chat_override(&self, chat_id: i64, enabled: Option<bool>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match enabled {
            Some(v) => {
                state.chats.insert(chat_id.to_string(), v);
            }
            None => {
                state.chats.remove(&chat_id.to_string());
            }
        }
        self.persist(&state)
    }

    pub fn add_target(
        &self,
        identity: &str,
        forward_to: &str,
        lang: &str,
        added_by: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.targets.insert(
            identity.to_string(),
            TargetRule {
                forward_to: forward_to.to_string(),
                lang: lang.to_string(),
                added_by: added_by.to_string(),
                added_at: Utc::now().to_rfc3339(),
            },
        );
        self.persist(&state)
    }

    /// Remove by exact key, then by suffix, then by substring. Returns the
    /// key that was actually removed, or `None` when nothing matched.
    pub fn remove_target(&self, ident: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        let ident = ident.trim();

        let key = if state.targets.contains_key(ident) {
            Some(ident.to_string())
        } else {
            state
                .targets
                .keys()
                .find(|k| k.ends_with(ident) || k.contains(ident))
                .cloned()
        };

        match key {
            Some(k) => {
                state.targets.remove(&k);
                self.persist(&state)?;
                Ok(Some(k))
            }
            None => Ok(None),
        }
    }

    pub fn tracked(&self, identity: i64) -> Option<TargetRule> {
        self.state
            .lock()
            .unwrap()
            .targets
            .get(&identity.to_string())
            .cloned()
    }

    /// One extra flush, used at shutdown.
    pub fn flush(&self) -> Result<()> {
        let state = self.state.lock().unwrap();
        self.persist(&state)
    }

    fn persist(&self, state: &TranslationConfig) -> Result<()> {
        let raw = serde_json::to_string_pretty(state)
            .map_err(|e| BotError::Persistence(e.to_string()))?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

fn parse_config(raw: &str) -> std::result::Result<TranslationConfig, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if let Some(obj) = value.as_object() {
        let is_legacy = !obj.contains_key("global")
            && !obj.contains_key("chats")
            && !obj.contains_key("targets");
        if is_legacy {
            // Old format: a bare { "<chatId>": bool } map.
            let chats: HashMap<String, bool> = serde_json::from_value(value)?;
            return Ok(TranslationConfig {
                global: false,
                chats,
                targets: HashMap::new(),
            });
        }
    }
    serde_json::from_value(value)
}
