//! Panelbot
//!
//! Single-operator Telegram automation agent with two independent jobs:
//!
//! - **Panel administration**: provisions, lists and deletes hosted server
//!   instances on a Pterodactyl-compatible panel, gated by a persisted
//!   access list (resellers, owners, reseller groups).
//! - **Translation relay**: rewrites the operator's outgoing messages
//!   in-place into another language, and forwards messages from tracked
//!   contacts, translated, to the operator.
//!
//! # Architecture
//!
//! ```text
//! Telegram ──► Gateway ──► Router ──► Command Handlers
//!                            │            ├── PanelClient (Pterodactyl API)
//!                            │            └── Gateway (replies/edits)
//!                            ├── AccessStore      (access.json)
//!                            ├── SessionStore     (in-memory /addpanel dialog)
//!                            ├── TranslationStore (translations.json)
//!                            └── Masking + Translator pipeline
//! ```

pub mod access;
pub mod commands;
pub mod config;
pub mod error;
pub mod gateway;
pub mod masking;
pub mod panel;
pub mod router;
pub mod session;
pub mod translation;
pub mod translator;
pub mod util;

pub use access::{AccessRecord, AccessStore};
pub use commands::{Command, ToggleScope};
pub use config::Config;
pub use error::BotError;
pub use gateway::{Gateway, InboundEvent, SendOptions, TelegramGateway};
pub use panel::{PanelClient, PanelStore, PanelTarget, Provisioner, ServerSize, SIZES};
pub use router::Router;
pub use session::{PanelDraft, SessionOutcome, SessionStore};
pub use translation::{TargetRule, TranslationStore};
pub use translator::{GoogleTranslator, Translator};
