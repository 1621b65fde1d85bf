//! Messaging Gateway
//!
//! The router talks to Telegram only through the `Gateway` trait, so the
//! dispatch state machine can be exercised against a mock in tests. One
//! `InboundEvent` value is built per update at this boundary; nothing
//! downstream touches raw update types.

use crate::error::{BotError, Result};
use crate::router::Router;
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::{
    dispatching::UpdateFilterExt,
    dptree,
    error_handlers::LoggingErrorHandler,
    prelude::*,
    types::{MessageId, ParseMode, Recipient, ReplyParameters, Update},
};

/// One inbound protocol event, tagged by direction.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub chat_id: i64,
    pub sender_id: i64,
    pub message_id: i32,
    pub text: String,
    /// Sent by the operator account itself.
    pub outgoing: bool,
}

impl InboundEvent {
    /// Telegram private chats have positive ids; groups and channels are
    /// negative.
    pub fn is_private(&self) -> bool {
        self.chat_id > 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    pub reply_to: Option<i32>,
    pub html: bool,
}

impl SendOptions {
    pub fn html() -> Self {
        Self {
            reply_to: None,
            html: true,
        }
    }

    pub fn reply_to(message_id: i32) -> Self {
        Self {
            reply_to: Some(message_id),
            html: false,
        }
    }
}

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str, opts: SendOptions) -> Result<()>;
    async fn edit(&self, chat_id: i64, message_id: i32, text: &str) -> Result<()>;
    async fn delete(&self, chat_id: i64, message_id: i32) -> Result<()>;
    /// Resolve a username/@mention to a numeric identity string. Numeric
    /// input passes through at the caller, not here.
    async fn resolve(&self, identifier: &str) -> Result<Option<String>>;
}

/// Production gateway over the Telegram Bot API.
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Gateway for TelegramGateway {
    async fn send(&self, chat_id: i64, text: &str, opts: SendOptions) -> Result<()> {
        let mut req = self.bot.send_message(ChatId(chat_id), text);
        if opts.html {
            req = req.parse_mode(ParseMode::Html);
        }
        if let Some(reply_to) = opts.reply_to {
            req = req.reply_parameters(ReplyParameters::new(MessageId(reply_to)));
        }
        req.await.map_err(|e| BotError::Delivery(e.to_string()))?;
        Ok(())
    }

    async fn edit(&self, chat_id: i64, message_id: i32, text: &str) -> Result<()> {
        self.bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text)
            .await
            .map_err(|e| BotError::Delivery(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, chat_id: i64, message_id: i32) -> Result<()> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await
            .map_err(|e| BotError::Delivery(e.to_string()))?;
        Ok(())
    }

    async fn resolve(&self, identifier: &str) -> Result<Option<String>> {
        let handle = identifier.trim();
        let username = if handle.starts_with('@') {
            handle.to_string()
        } else {
            format!("@{}", handle)
        };
        match self
            .bot
            .get_chat(Recipient::ChannelUsername(username))
            .await
        {
            Ok(chat) => Ok(Some(chat.id.0.to_string())),
            Err(e) => {
                tracing::debug!("resolve {} failed: {}", identifier, e);
                Ok(None)
            }
        }
    }
}

/// Run the dispatcher, feeding every text message through the router. The
/// router's own wrapper guarantees a handler failure never stops the loop.
pub async fn run_dispatcher(bot: Bot, router: Arc<Router>, operator_id: i64) {
    let handler = dptree::entry().branch(Update::filter_message().endpoint(
        move |_bot: Bot, msg: Message, router: Arc<Router>| async move {
            if let Some(text) = msg.text() {
                let sender_id = msg.from.as_ref().map(|u| u.id.0 as i64).unwrap_or(0);
                let event = InboundEvent {
                    chat_id: msg.chat.id.0,
                    sender_id,
                    message_id: msg.id.0,
                    text: text.to_string(),
                    outgoing: sender_id == operator_id,
                };
                router.handle_event(event).await;
            }
            respond(())
        },
    ));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router])
        .default_handler(|upd| async move {
            tracing::debug!("unhandled update: {:?}", upd);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "Error in message handler",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
