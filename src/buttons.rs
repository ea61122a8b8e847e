//! Message components attached to conversation replies: regenerate,
//! pause/resume, stop. Custom ids carry the conversation id so a press
//! can be routed without any per-message state. Ownership checks live in
//! the registry; this module only translates outcomes into responses.

use std::sync::Arc;

use serenity::all::{
    ButtonStyle, ComponentInteraction, Context, CreateActionRow, CreateButton,
    CreateInteractionResponse, CreateInteractionResponseFollowup,
    CreateInteractionResponseMessage, CreateMessage,
};
use tracing::{error, info};

use crate::commands::{self, error_embed};
use crate::error::ParleyError;
use crate::runtime::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Regenerate,
    TogglePause,
    Stop,
}

impl ControlAction {
    fn as_str(self) -> &'static str {
        match self {
            ControlAction::Regenerate => "regenerate",
            ControlAction::TogglePause => "pause",
            ControlAction::Stop => "stop",
        }
    }
}

fn custom_id(conversation_id: u64, action: ControlAction) -> String {
    format!("convo:{conversation_id}:{}", action.as_str())
}

/// Parse a component custom id of the form `convo:{id}:{action}`.
/// Anything else is a component we did not create.
pub fn parse_control(custom_id: &str) -> Option<(u64, ControlAction)> {
    let mut parts = custom_id.split(':');
    if parts.next()? != "convo" {
        return None;
    }
    let id: u64 = parts.next()?.parse().ok()?;
    let action = match parts.next()? {
        "regenerate" => ControlAction::Regenerate,
        "pause" => ControlAction::TogglePause,
        "stop" => ControlAction::Stop,
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((id, action))
}

fn control_row(conversation_id: u64, disabled: bool) -> CreateActionRow {
    CreateActionRow::Buttons(vec![
        CreateButton::new(custom_id(conversation_id, ControlAction::Regenerate))
            .emoji('\u{1F504}')
            .style(ButtonStyle::Success)
            .disabled(disabled),
        CreateButton::new(custom_id(conversation_id, ControlAction::TogglePause))
            .emoji('\u{23EF}')
            .style(ButtonStyle::Secondary)
            .disabled(disabled),
        CreateButton::new(custom_id(conversation_id, ControlAction::Stop))
            .emoji('\u{23F9}')
            .style(ButtonStyle::Danger)
            .disabled(disabled),
    ])
}

/// The control row attached to every conversation reply.
pub fn controls(conversation_id: u64) -> Vec<CreateActionRow> {
    vec![control_row(conversation_id, false)]
}

/// Greyed-out variant shown once the conversation has ended.
pub fn disabled_controls(conversation_id: u64) -> Vec<CreateActionRow> {
    vec![control_row(conversation_id, true)]
}

pub async fn dispatch(state: &Arc<AppState>, ctx: &Context, interaction: &ComponentInteraction) {
    let Some((conversation_id, action)) = parse_control(&interaction.data.custom_id) else {
        return;
    };
    let result = match action {
        ControlAction::Regenerate => handle_regenerate(state, ctx, interaction, conversation_id).await,
        ControlAction::TogglePause => handle_toggle_pause(state, ctx, interaction, conversation_id).await,
        ControlAction::Stop => handle_stop(state, ctx, interaction, conversation_id).await,
    };
    if let Err(e) = result {
        error!("Control {action:?} on conversation {conversation_id} failed: {e}");
    }
}

async fn handle_regenerate(
    state: &Arc<AppState>,
    ctx: &Context,
    interaction: &ComponentInteraction,
    conversation_id: u64,
) -> Result<(), ParleyError> {
    let actor_id = interaction.user.id.get();
    let (user_turn, _) = match state.registry.regenerate_last_turn(conversation_id, actor_id) {
        Ok(pair) => pair,
        Err(e) => return ephemeral_error(ctx, interaction, &e.to_string()).await,
    };
    interaction
        .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
        .await?;

    let embeds =
        commands::run_conversation_turn(state, &ctx.http, conversation_id, actor_id, user_turn.content)
            .await;
    interaction
        .channel_id
        .send_message(
            &ctx.http,
            CreateMessage::new()
                .embeds(embeds)
                .components(controls(conversation_id)),
        )
        .await?;
    Ok(())
}

async fn handle_toggle_pause(
    state: &Arc<AppState>,
    ctx: &Context,
    interaction: &ComponentInteraction,
    conversation_id: u64,
) -> Result<(), ParleyError> {
    let actor_id = interaction.user.id.get();
    let Some(conversation) = state.registry.find(conversation_id) else {
        return ephemeral_error(ctx, interaction, "No active conversation found.").await;
    };
    let updated = match state
        .registry
        .set_paused(conversation_id, actor_id, !conversation.paused)
    {
        Ok(c) => c,
        Err(e) => return ephemeral_error(ctx, interaction, &e.to_string()).await,
    };
    let notice = if updated.paused {
        "Conversation paused."
    } else {
        "Conversation resumed."
    };
    info!("Conversation {conversation_id}: {notice}");
    interaction
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(notice)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn handle_stop(
    state: &Arc<AppState>,
    ctx: &Context,
    interaction: &ComponentInteraction,
    conversation_id: u64,
) -> Result<(), ParleyError> {
    let actor_id = interaction.user.id.get();
    if let Err(e) = state.registry.end_conversation(conversation_id, actor_id) {
        return ephemeral_error(ctx, interaction, &e.to_string()).await;
    }
    info!("Conversation {conversation_id} ended by {actor_id}");

    // Grey out the controls on the message the press came from.
    interaction
        .create_response(
            &ctx.http,
            CreateInteractionResponse::UpdateMessage(
                CreateInteractionResponseMessage::new()
                    .components(disabled_controls(conversation_id)),
            ),
        )
        .await?;
    interaction
        .create_followup(
            &ctx.http,
            CreateInteractionResponseFollowup::new()
                .content("Conversation ended.")
                .ephemeral(true),
        )
        .await?;
    Ok(())
}

async fn ephemeral_error(
    ctx: &Context,
    interaction: &ComponentInteraction,
    message: &str,
) -> Result<(), ParleyError> {
    interaction
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(error_embed(message))
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_roundtrip() {
        for action in [
            ControlAction::Regenerate,
            ControlAction::TogglePause,
            ControlAction::Stop,
        ] {
            let id = custom_id(42, action);
            assert_eq!(parse_control(&id), Some((42, action)));
        }
    }

    #[test]
    fn test_parse_control_rejects_foreign_ids() {
        assert_eq!(parse_control(""), None);
        assert_eq!(parse_control("convo:"), None);
        assert_eq!(parse_control("convo:7"), None);
        assert_eq!(parse_control("convo:7:launch"), None);
        assert_eq!(parse_control("convo:seven:stop"), None);
        assert_eq!(parse_control("other:7:stop"), None);
        assert_eq!(parse_control("convo:7:stop:extra"), None);
    }
}
