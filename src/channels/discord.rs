//! Discord gateway integration. Slash commands and button presses route
//! to their handler modules; plain channel messages continue an active
//! conversation for the author, and everything else is ignored.

use std::sync::Arc;

use serenity::all::{
    Command, Context, CreateMessage, EventHandler, GatewayIntents, GuildId, Interaction, Message,
    Ready,
};
use serenity::async_trait;
use serenity::Client;
use tracing::{error, info, warn};

use crate::buttons;
use crate::commands;
use crate::error::ParleyError;
use crate::registry::{ContentPart, TurnContent};
use crate::runtime::AppState;

struct Handler {
    state: Arc<AppState>,
}

/// Build the turn content for a plain channel message: the text plus any
/// image attachments. Returns `None` when there is nothing to send.
fn inbound_content(text: &str, image_urls: &[String]) -> Option<TurnContent> {
    let text = text.trim();
    match (text.is_empty(), image_urls.len()) {
        (true, 0) => None,
        (false, 0) => Some(TurnContent::Text(text.to_string())),
        (true, 1) => Some(TurnContent::Image(image_urls[0].clone())),
        _ => {
            let mut parts = Vec::new();
            if !text.is_empty() {
                parts.push(ContentPart::Text(text.to_string()));
            }
            parts.extend(image_urls.iter().cloned().map(ContentPart::Image));
            Some(TurnContent::Mixed(parts))
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Connected to Discord as {}", ready.user.name);
        let definitions = commands::definitions();
        if self.state.config.guild_ids.is_empty() {
            if let Err(e) = Command::set_global_commands(&ctx.http, definitions).await {
                error!("Failed to register global commands: {e}");
            }
            return;
        }
        for guild in &self.state.config.guild_ids {
            if let Err(e) = GuildId::new(*guild)
                .set_commands(&ctx.http, definitions.clone())
                .await
            {
                error!("Failed to register commands in guild {guild}: {e}");
            }
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let user_id = msg.author.id.get();
        let channel_id = msg.channel_id.get();
        let Some(conversation) = self
            .state
            .registry
            .find_by_user_and_channel(user_id, channel_id)
        else {
            return;
        };
        // Paused conversations drop inbound messages, they are not queued.
        if !conversation.accepts_inbound_from(user_id) {
            return;
        }

        let image_urls: Vec<String> = msg
            .attachments
            .iter()
            .filter(|a| {
                a.content_type
                    .as_deref()
                    .map(|t| t.starts_with("image/"))
                    .unwrap_or(false)
            })
            .map(|a| a.url.clone())
            .collect();
        let Some(content) = inbound_content(&msg.content, &image_urls) else {
            return;
        };

        let embeds = commands::run_conversation_turn(
            &self.state,
            &ctx.http,
            conversation.id,
            user_id,
            content,
        )
        .await;
        let reply = CreateMessage::new()
            .embeds(embeds)
            .components(buttons::controls(conversation.id))
            .reference_message(&msg);
        if let Err(e) = msg.channel_id.send_message(&ctx.http, reply).await {
            error!("Failed to send conversation reply: {e}");
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(cmd) => commands::dispatch(&self.state, &ctx, &cmd).await,
            Interaction::Component(component) => {
                buttons::dispatch(&self.state, &ctx, &component).await
            }
            other => warn!("Unhandled interaction kind: {:?}", other.kind()),
        }
    }
}

pub async fn start_discord_bot(state: Arc<AppState>, token: String) -> Result<(), ParleyError> {
    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;
    let mut client = Client::builder(&token, intents)
        .event_handler(Handler { state })
        .await?;
    client.start().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_content_text_only() {
        assert_eq!(
            inbound_content("hello", &[]),
            Some(TurnContent::Text("hello".into()))
        );
    }

    #[test]
    fn test_inbound_content_blank_dropped() {
        assert_eq!(inbound_content("   ", &[]), None);
    }

    #[test]
    fn test_inbound_content_single_image() {
        let urls = vec!["https://cdn.test/a.png".to_string()];
        assert_eq!(
            inbound_content("", &urls),
            Some(TurnContent::Image("https://cdn.test/a.png".into()))
        );
    }

    #[test]
    fn test_inbound_content_text_and_images() {
        let urls = vec![
            "https://cdn.test/a.png".to_string(),
            "https://cdn.test/b.png".to_string(),
        ];
        let content = inbound_content("see these", &urls).unwrap();
        match content {
            TurnContent::Mixed(parts) => {
                assert_eq!(parts.len(), 3);
                assert_eq!(parts[0], ContentPart::Text("see these".into()));
            }
            other => panic!("expected mixed content, got {other:?}"),
        }
    }
}
