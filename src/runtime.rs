//! Process wiring: shared state construction and the run loop.

use std::sync::Arc;

use tracing::{error, info};

use crate::channels::discord;
use crate::config::Config;
use crate::openai::OpenAiClient;
use crate::registry::ConversationRegistry;

/// Shared state handed to every handler.
pub struct AppState {
    pub config: Config,
    pub registry: ConversationRegistry,
    pub openai: OpenAiClient,
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let openai = OpenAiClient::new(&config.openai_api_key, &config.openai_base_url)?;
    let token = config.discord_bot_token.clone();
    let state = Arc::new(AppState {
        config,
        registry: ConversationRegistry::new(),
        openai,
    });

    let bot_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = discord::start_discord_bot(bot_state, token).await {
            error!("Discord bot stopped: {e}");
        }
    });

    info!("Runtime active; waiting for Ctrl-C");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
