//! Access Store
//!
//! Persisted sets of reseller ids, panel-owner ids and reseller group
//! chats. Reads go back to disk on every query so external edits to the
//! document take effect immediately; the file is small and queries are
//! rare, so the extra IO is a non-issue.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// On-disk shape: `{"akses": [...], "owner": [...], "groups": [...]}`.
/// Field names match the legacy document so existing files keep working.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessRecord {
    #[serde(default)]
    pub akses: Vec<i64>,
    #[serde(default)]
    pub owner: Vec<i64>,
    #[serde(default)]
    pub groups: Vec<i64>,
}

pub struct AccessStore {
    path: PathBuf,
    operator_id: i64,
}

impl AccessStore {
    pub fn new(path: PathBuf, operator_id: i64) -> Self {
        Self { path, operator_id }
    }

    /// A missing or corrupt document is an empty record, never an error.
    pub fn load(&self) -> AccessRecord {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("access document unreadable, treating as empty: {}", e);
                AccessRecord::default()
            }),
            Err(_) => AccessRecord::default(),
        }
    }

    /// Reseller-level rights: super-operator, owner set, or reseller set.
    pub fn is_reseller(&self, id: i64) -> bool {
        if id == self.operator_id {
            return true;
        }
        let rec = self.load();
        rec.akses.contains(&id) || rec.owner.contains(&id)
    }

    /// Owner-level rights: super-operator or the owner set.
    pub fn is_owner(&self, id: i64) -> bool {
        id == self.operator_id || self.load().owner.contains(&id)
    }

    /// Whether the chat is a registered reseller group.
    pub fn is_group_reseller(&self, chat_id: i64) -> bool {
        self.load().groups.contains(&chat_id)
    }
}
