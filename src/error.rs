//! Error taxonomy
//!
//! Every command handler converts these into a chat-visible reply; only
//! genuinely unexpected errors reach the top-level event wrapper, which logs
//! them and forwards a report to the operator.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    /// Panel URL / application key missing. Reported as "not configured",
    /// never as a remote failure.
    #[error("panel target is not configured")]
    NotConfigured,

    /// Caller lacks the required grant.
    #[error("no access")]
    Unauthorized,

    /// Malformed command arguments; the payload is the usage text.
    #[error("{0}")]
    Validation(String),

    /// A username/mention/id could not be resolved to a numeric identity.
    #[error("could not resolve `{0}`")]
    Resolution(String),

    /// Provisioning Service or Translator call failed. Logged in full;
    /// users see a short generic message.
    #[error("remote service call failed: {0}")]
    Remote(String),

    /// The Messaging Gateway could not reach a recipient.
    #[error("recipient unreachable: {0}")]
    Delivery(String),

    /// A state file could not be read or written.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<reqwest::Error> for BotError {
    fn from(e: reqwest::Error) -> Self {
        BotError::Remote(e.to_string())
    }
}

impl From<std::io::Error> for BotError {
    fn from(e: std::io::Error) -> Self {
        BotError::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
