//! Panelbot - Entry Point

use anyhow::Result;
use panelbot::access::AccessStore;
use panelbot::config::Config;
use panelbot::gateway::{self, TelegramGateway};
use panelbot::panel::PanelStore;
use panelbot::router::Router;
use panelbot::translation::TranslationStore;
use panelbot::translator::GoogleTranslator;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    tokio::fs::create_dir_all(&config.data_dir).await?;

    tracing::info!("===========================================");
    tracing::info!("  Panelbot v{} - starting...", env!("CARGO_PKG_VERSION"));
    tracing::info!("===========================================");
    tracing::info!("Operator: {}", config.owner_id);
    tracing::info!("Data directory: {:?}", config.data_dir);
    tracing::info!(
        "Outgoing translation: {} -> {}",
        config.source_lang,
        config.target_lang
    );

    let bot = Bot::new(config.telegram_token.clone());

    // Verify the token before wiring anything else up.
    match bot.get_me().await {
        Ok(me) => {
            tracing::info!(
                "Authenticated as @{} (id {})",
                me.username.as_deref().unwrap_or("unknown"),
                me.id
            );
        }
        Err(e) => {
            anyhow::bail!("Telegram authentication failed: {}", e);
        }
    }
    if let Err(e) = bot.delete_webhook().await {
        tracing::warn!("failed to delete webhook: {} (continuing)", e);
    }

    let http = reqwest::Client::new();
    let router = Arc::new(Router::new(
        Arc::new(TelegramGateway::new(bot.clone())),
        Arc::new(GoogleTranslator::new(http)),
        AccessStore::new(config.access_file(), config.owner_id),
        TranslationStore::load(config.translations_file()),
        PanelStore::new(config.panel_file()),
        config.owner_id,
        config.source_lang.clone(),
        config.target_lang.clone(),
    ));

    // Online banner to the operator; a surprise one means the process
    // restarted.
    if let Err(e) = bot
        .send_message(
            ChatId(config.owner_id),
            "Panelbot online. Panel and translation ready.",
        )
        .await
    {
        tracing::warn!("failed to send startup notification: {}", e);
    }

    tracing::info!("Dispatcher starting with long polling...");
    gateway::run_dispatcher(bot, Arc::clone(&router), config.owner_id).await;

    // The dispatcher returned (ctrl-c or fatal). Flush once before exit.
    if let Err(e) = router.translation_store().flush() {
        tracing::error!("final translation config flush failed: {}", e);
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
