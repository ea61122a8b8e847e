//! Slash-command definitions and handlers. Every handler defers first,
//! validates locally, makes at most one provider call, and reports the
//! outcome once. Provider failures become a red Error embed carrying the
//! provider's message text; nothing here retries.

use std::sync::Arc;

use serenity::all::{
    Attachment, Colour, CommandInteraction, CommandOptionType, Context, CreateAttachment,
    CreateCommand, CreateCommandOption, CreateEmbed, CreateInteractionResponseFollowup,
    ResolvedOption, ResolvedValue,
};
use serenity::http::Http;
use tracing::{error, info, warn};

use crate::buttons;
use crate::chunker::{self, truncate};
use crate::error::ParleyError;
use crate::models::{self, ReasoningEffort};
use crate::openai::{
    ImageRequest, ResponseRequest, SpeechRequest, TranscribeAction, VideoRequest,
};
use crate::registry::{
    ContentPart, Conversation, GenParams, NewConversation, TurnContent, TurnRole,
};
use crate::runtime::AppState;
use crate::typing;

const MAX_TTS_INPUT_CHARS: usize = 4096;
const MAX_AUDIO_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;
const PROMPT_ECHO_CAP: usize = 1000;

/// Slash commands registered in each configured guild.
pub fn definitions() -> Vec<CreateCommand> {
    let mut model_option = CreateCommandOption::new(
        CommandOptionType::String,
        "model",
        "Model to use (default: gpt-4.1)",
    );
    for (name, value) in models::CHAT_MODELS {
        model_option = model_option.add_string_choice(*name, *value);
    }

    let converse = CreateCommand::new("converse")
        .description("Starts a conversation with a model.")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "prompt", "Prompt")
                .required(true),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "persona",
            "Role the model should emulate (default: You are a helpful assistant.)",
        ))
        .add_option(model_option)
        .add_option(CreateCommandOption::new(
            CommandOptionType::Attachment,
            "attachment",
            "Image attachment to append to the prompt",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::Number,
            "frequency_penalty",
            "(Advanced) Controls how much the model should repeat itself",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::Number,
            "presence_penalty",
            "(Advanced) Controls how much the model should talk about the prompt",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::Integer,
            "seed",
            "(Advanced) Seed for deterministic outputs",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::Number,
            "temperature",
            "(Advanced) Randomness. Set this or top_p, but not both",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::Number,
            "top_p",
            "(Advanced) Nucleus sampling. Set this or temperature, but not both",
        ))
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "reasoning_effort",
                "(Advanced) Effort level for reasoning models",
            )
            .add_string_choice("Low", "low")
            .add_string_choice("Medium", "medium")
            .add_string_choice("High", "high"),
        );

    let mut image_model = CreateCommandOption::new(
        CommandOptionType::String,
        "model",
        "Image model (default: gpt-image-1)",
    );
    for (name, value) in models::IMAGE_MODELS {
        image_model = image_model.add_string_choice(*name, *value);
    }
    let generate_image = CreateCommand::new("generate_image")
        .description("Generates images from a prompt.")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "prompt", "Prompt")
                .required(true),
        )
        .add_option(image_model)
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "n",
                "Number of images to generate (default: 1)",
            )
            .min_int_value(1)
            .max_int_value(10),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "quality",
                "Image quality (default: medium for GPT Image, standard for DALL-E)",
            )
            .add_string_choice("Low (GPT Image only)", "low")
            .add_string_choice("Medium (GPT Image only)", "medium")
            .add_string_choice("High (GPT Image only)", "high")
            .add_string_choice("Auto (GPT Image only)", "auto")
            .add_string_choice("Standard (DALL-E only)", "standard")
            .add_string_choice("HD (DALL-E only)", "hd"),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "size",
                "Image size (default: 1024x1024)",
            )
            .add_string_choice("256x256", "256x256")
            .add_string_choice("512x512", "512x512")
            .add_string_choice("1024x1024", "1024x1024")
            .add_string_choice("1024x1792 (portrait)", "1024x1792")
            .add_string_choice("1792x1024 (landscape)", "1792x1024"),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "style",
                "Image style, DALL-E 3 only (default: natural)",
            )
            .add_string_choice("Vivid", "vivid")
            .add_string_choice("Natural", "natural"),
        );

    let mut tts_model = CreateCommandOption::new(
        CommandOptionType::String,
        "model",
        "TTS model (default: GPT-4o Mini TTS)",
    );
    for (name, value) in models::TTS_MODELS {
        tts_model = tts_model.add_string_choice(*name, *value);
    }
    let mut tts_voice = CreateCommandOption::new(
        CommandOptionType::String,
        "voice",
        "Voice for the generated speech (default: Alloy)",
    );
    for voice in models::TTS_VOICES {
        tts_voice = tts_voice.add_string_choice(capitalize(voice), *voice);
    }
    for voice in models::RICH_TTS_VOICES {
        tts_voice = tts_voice
            .add_string_choice(format!("{} (GPT-4o Mini TTS only)", capitalize(voice)), *voice);
    }
    let mut tts_format = CreateCommandOption::new(
        CommandOptionType::String,
        "response_format",
        "Audio file format (default: mp3)",
    );
    for format in models::AUDIO_FORMATS {
        tts_format = tts_format.add_string_choice(format.to_uppercase(), *format);
    }
    let text_to_speech = CreateCommand::new("text_to_speech")
        .description("Generates lifelike audio from the input text.")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "input",
                "Text to convert to speech (max length 4096 characters)",
            )
            .required(true),
        )
        .add_option(tts_model)
        .add_option(tts_voice)
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "instructions",
            "Extra voice style instructions (GPT-4o Mini TTS only)",
        ))
        .add_option(tts_format)
        .add_option(CreateCommandOption::new(
            CommandOptionType::Number,
            "speed",
            "Speed of the generated audio, 0.25 to 4.0 (default: 1.0)",
        ));

    let mut stt_model = CreateCommandOption::new(
        CommandOptionType::String,
        "model",
        "Model for speech-to-text (default: GPT-4o Transcribe)",
    );
    for (name, value) in models::STT_MODELS {
        stt_model = stt_model.add_string_choice(*name, *value);
    }
    let speech_to_text = CreateCommand::new("speech_to_text")
        .description("Generates text from the input audio.")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Attachment,
                "attachment",
                "Audio file, max 25 MB (mp3, mp4, mpeg, mpga, m4a, wav, webm)",
            )
            .required(true),
        )
        .add_option(stt_model)
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "action",
                "Action to perform (default: Transcription)",
            )
            .add_string_choice("Transcription", "transcription")
            .add_string_choice("Translation (into English)", "translation"),
        );

    let mut video_model = CreateCommandOption::new(
        CommandOptionType::String,
        "model",
        "Video model (default: Sora 2)",
    );
    for (name, value) in models::VIDEO_MODELS {
        video_model = video_model.add_string_choice(*name, *value);
    }
    let generate_video = CreateCommand::new("generate_video")
        .description("Generates a short video from a prompt.")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "prompt", "Prompt")
                .required(true),
        )
        .add_option(video_model)
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "seconds",
                "Clip length in seconds (default: 8)",
            )
            .add_int_choice("4", 4)
            .add_int_choice("8", 8)
            .add_int_choice("12", 12),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "size",
                "Video resolution (default: 1280x720)",
            )
            .add_string_choice("1280x720 (landscape)", "1280x720")
            .add_string_choice("720x1280 (portrait)", "720x1280"),
        );

    vec![
        converse,
        generate_image,
        text_to_speech,
        speech_to_text,
        generate_video,
    ]
}

pub async fn dispatch(state: &Arc<AppState>, ctx: &Context, cmd: &CommandInteraction) {
    let result = match cmd.data.name.as_str() {
        "converse" => handle_converse(state, ctx, cmd).await,
        "generate_image" => handle_generate_image(state, ctx, cmd).await,
        "text_to_speech" => handle_text_to_speech(state, ctx, cmd).await,
        "speech_to_text" => handle_speech_to_text(state, ctx, cmd).await,
        "generate_video" => handle_generate_video(state, ctx, cmd).await,
        other => {
            warn!("Unknown command: {other}");
            Ok(())
        }
    };
    if let Err(e) = result {
        error!("Command /{} failed: {e}", cmd.data.name);
    }
}

async fn handle_converse(
    state: &Arc<AppState>,
    ctx: &Context,
    cmd: &CommandInteraction,
) -> Result<(), ParleyError> {
    cmd.defer(&ctx.http).await?;
    let options = cmd.data.options();

    let prompt = str_option(&options, "prompt").unwrap_or_default().to_string();
    let persona = str_option(&options, "persona")
        .unwrap_or(&state.config.default_persona)
        .to_string();
    let model = str_option(&options, "model")
        .unwrap_or(&state.config.default_model)
        .to_string();
    let attachment = attachment_option(&options, "attachment");

    if let Some(att) = attachment {
        let is_image = att
            .content_type
            .as_deref()
            .map(|t| t.starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            return send_error(ctx, cmd, "Only image attachments are supported.").await;
        }
    }

    let params = GenParams {
        temperature: f64_option(&options, "temperature"),
        top_p: f64_option(&options, "top_p"),
        frequency_penalty: f64_option(&options, "frequency_penalty"),
        presence_penalty: f64_option(&options, "presence_penalty"),
        seed: i64_option(&options, "seed"),
        reasoning_effort: str_option(&options, "reasoning_effort")
            .and_then(ReasoningEffort::parse),
    };

    let first_prompt = match attachment {
        Some(att) => TurnContent::Mixed(vec![
            ContentPart::Text(prompt.clone()),
            ContentPart::Image(att.url.clone()),
        ]),
        None => TurnContent::Text(prompt.clone()),
    };

    let owner_id = cmd.user.id.get();
    let conversation = match state.registry.start_conversation(NewConversation {
        owner_id,
        channel_id: cmd.channel_id.get(),
        model,
        persona,
        params,
        first_prompt,
    }) {
        Ok(c) => c,
        Err(e) => return send_error(ctx, cmd, &e.to_string()).await,
    };
    info!(
        "Conversation {} started by {owner_id} in channel {}",
        conversation.id, conversation.channel_id
    );

    // The conversation is registered and findable from here on, so hold
    // its lock through the opening exchange; an early channel message
    // must not interleave its turns ahead of the first response.
    let lock = state.registry.turn_lock(conversation.id);
    let _serialized = lock.lock().await;

    let _typing = typing::keep_typing(ctx.http.clone(), cmd.channel_id);
    let output = state
        .openai
        .respond(&ResponseRequest {
            model: &conversation.model,
            turns: &conversation.turns,
            params: &conversation.params,
            previous_response_id: None,
        })
        .await;

    let output = match output {
        Ok(o) => o,
        Err(e) => {
            // First call failed: unregister so the user can retry /converse.
            let _ = state.registry.end_conversation(conversation.id, owner_id);
            return send_error(ctx, cmd, &e.to_string()).await;
        }
    };

    state.registry.append_turn(
        conversation.id,
        owner_id,
        TurnRole::Assistant,
        TurnContent::Text(output.text.clone()),
    )?;
    state
        .registry
        .chain_response(conversation.id, owner_id, output.id)?;

    let summary = conversation_summary(&prompt, &conversation);
    let mut embeds = vec![CreateEmbed::new()
        .title("Conversation Started")
        .description(&summary)
        .colour(Colour::DARK_GREEN)];
    let mut used = "Conversation Started".chars().count() + summary.chars().count();
    if let Some(att) = attachment {
        embeds.push(
            CreateEmbed::new()
                .title("Attachment")
                .description(&att.url)
                .colour(Colour::DARK_GREEN),
        );
        used += "Attachment".chars().count() + att.url.chars().count();
    }
    embeds.extend(response_embeds(&output.text, used));

    cmd.create_followup(
        &ctx.http,
        CreateInteractionResponseFollowup::new()
            .embeds(embeds)
            .components(buttons::controls(conversation.id)),
    )
    .await?;
    Ok(())
}

/// Process one inbound turn for an existing conversation: append the user
/// turn, call the provider, append the assistant turn, and return the
/// reply embeds. The user turn is appended before the network call and
/// stays in history if the call fails, so regeneration can retry it.
pub async fn run_conversation_turn(
    state: &Arc<AppState>,
    http: &Arc<Http>,
    conversation_id: u64,
    actor_id: u64,
    content: TurnContent,
) -> Vec<CreateEmbed> {
    let lock = state.registry.turn_lock(conversation_id);
    let _serialized = lock.lock().await;

    let conversation = match state.registry.append_turn(
        conversation_id,
        actor_id,
        TurnRole::User,
        content,
    ) {
        Ok(c) => c,
        Err(e) => return vec![error_embed(&e.to_string())],
    };

    // Send everything the provider has not acknowledged: the new turn,
    // plus any turn kept in history after a failed call. On the first
    // call nothing is acknowledged and the whole history goes out.
    let turns = &conversation.turns[conversation.turns_acknowledged()..];

    let _typing = typing::keep_typing(
        http.clone(),
        serenity::all::ChannelId::new(conversation.channel_id),
    );
    let output = state
        .openai
        .respond(&ResponseRequest {
            model: &conversation.model,
            turns,
            params: &conversation.params,
            previous_response_id: conversation.last_response_id.as_deref(),
        })
        .await;

    match output {
        Ok(output) => {
            let appended = state.registry.append_turn(
                conversation_id,
                actor_id,
                TurnRole::Assistant,
                TurnContent::Text(output.text.clone()),
            );
            if let Err(e) = appended {
                return vec![error_embed(&e.to_string())];
            }
            let _ = state
                .registry
                .chain_response(conversation_id, actor_id, output.id);
            response_embeds(&output.text, 0)
        }
        Err(e) => vec![error_embed(&e.to_string())],
    }
}

async fn handle_generate_image(
    state: &Arc<AppState>,
    ctx: &Context,
    cmd: &CommandInteraction,
) -> Result<(), ParleyError> {
    cmd.defer(&ctx.http).await?;
    let options = cmd.data.options();

    let prompt = str_option(&options, "prompt").unwrap_or_default().to_string();
    let model = str_option(&options, "model").unwrap_or("gpt-image-1");
    let n = i64_option(&options, "n").unwrap_or(1).clamp(1, 10) as u8;
    let quality = str_option(&options, "quality").unwrap_or("medium");
    let size = str_option(&options, "size").unwrap_or("1024x1024");
    let style = str_option(&options, "style").unwrap_or("natural");

    let quality = models::normalize_image_quality(model, quality);
    if let Err(message) = models::validate_image_request(model, n, quality, size) {
        return send_error(ctx, cmd, &message).await;
    }
    let style = models::image_style_applies(model).then_some(style);

    let _typing = typing::keep_typing(ctx.http.clone(), cmd.channel_id);
    let images = match state
        .openai
        .generate_image(&ImageRequest {
            prompt: &prompt,
            model,
            n,
            quality,
            size,
            style,
        })
        .await
    {
        Ok(images) => images,
        Err(e) => return send_error(ctx, cmd, &e.to_string()).await,
    };

    let mut files = Vec::new();
    for (idx, image) in images.iter().enumerate() {
        let bytes = if let Some(b64) = &image.b64_json {
            use base64::Engine as _;
            match base64::engine::general_purpose::STANDARD.decode(b64) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping undecodable image payload: {e}");
                    continue;
                }
            }
        } else if let Some(url) = &image.url {
            match state.openai.download(url).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping image download failure: {e}");
                    continue;
                }
            }
        } else {
            continue;
        };
        files.push(CreateAttachment::bytes(bytes, format!("image{idx}.png")));
    }
    if files.is_empty() {
        return send_error(ctx, cmd, "No images were generated.").await;
    }

    let embed = CreateEmbed::new()
        .title("Image Generation")
        .description(format!("**Prompt:**\n{}", truncate(&prompt, PROMPT_ECHO_CAP)))
        .colour(Colour::BLUE);
    cmd.create_followup(
        &ctx.http,
        CreateInteractionResponseFollowup::new()
            .embed(embed)
            .add_files(files),
    )
    .await?;
    Ok(())
}

async fn handle_text_to_speech(
    state: &Arc<AppState>,
    ctx: &Context,
    cmd: &CommandInteraction,
) -> Result<(), ParleyError> {
    cmd.defer(&ctx.http).await?;
    let options = cmd.data.options();

    let input = str_option(&options, "input").unwrap_or_default().to_string();
    let model = str_option(&options, "model").unwrap_or(models::RICH_TTS_MODEL);
    let voice = str_option(&options, "voice").unwrap_or("alloy");
    let instructions = str_option(&options, "instructions");
    let response_format = str_option(&options, "response_format").unwrap_or("mp3");
    let speed = f64_option(&options, "speed").unwrap_or(1.0);

    if input.chars().count() > MAX_TTS_INPUT_CHARS {
        return send_error(ctx, cmd, "The input text exceeds the 4096-character limit.").await;
    }
    if let Err(message) = models::validate_tts_voice(model, voice) {
        return send_error(ctx, cmd, &message).await;
    }
    // Style instructions are only honored by the rich TTS model.
    let instructions = (model == models::RICH_TTS_MODEL)
        .then_some(instructions)
        .flatten();

    let _typing = typing::keep_typing(ctx.http.clone(), cmd.channel_id);
    let audio = match state
        .openai
        .create_speech(&SpeechRequest {
            input: &input,
            model,
            voice,
            instructions,
            response_format,
            speed,
        })
        .await
    {
        Ok(bytes) => bytes,
        Err(e) => return send_error(ctx, cmd, &e.to_string()).await,
    };

    let mut description = format!(
        "**Text:** {}\n**Model:** {model}\n**Voice:** {voice}\n",
        truncate(&input, PROMPT_ECHO_CAP)
    );
    if let Some(instructions) = instructions {
        description.push_str(&format!("**Instructions:** {instructions}\n"));
    }
    description.push_str(&format!(
        "**Response Format:** {response_format}\n**Speed:** {speed}\n"
    ));

    cmd.create_followup(
        &ctx.http,
        CreateInteractionResponseFollowup::new()
            .embed(
                CreateEmbed::new()
                    .title("Text-to-Speech")
                    .description(description)
                    .colour(Colour::BLUE),
            )
            .add_file(CreateAttachment::bytes(
                audio,
                format!("{voice}_speech.{response_format}"),
            )),
    )
    .await?;
    Ok(())
}

async fn handle_speech_to_text(
    state: &Arc<AppState>,
    ctx: &Context,
    cmd: &CommandInteraction,
) -> Result<(), ParleyError> {
    cmd.defer(&ctx.http).await?;
    let options = cmd.data.options();

    let Some(attachment) = attachment_option(&options, "attachment") else {
        return send_error(ctx, cmd, "An audio attachment is required.").await;
    };
    let model = str_option(&options, "model").unwrap_or("gpt-4o-transcribe");
    let action = match str_option(&options, "action") {
        Some("translation") => TranscribeAction::Translation,
        _ => TranscribeAction::Transcription,
    };

    if attachment.size as u64 > MAX_AUDIO_UPLOAD_BYTES {
        return send_error(ctx, cmd, "The attachment exceeds the 25 MB upload limit.").await;
    }

    let _typing = typing::keep_typing(ctx.http.clone(), cmd.channel_id);
    let bytes = match state.openai.download(&attachment.url).await {
        Ok(bytes) => bytes,
        Err(e) => return send_error(ctx, cmd, &e.to_string()).await,
    };
    let text = match state
        .openai
        .transcribe(action, model, &attachment.filename, bytes)
        .await
    {
        Ok(text) => text,
        Err(e) => return send_error(ctx, cmd, &e.to_string()).await,
    };

    let action_label = match action {
        TranscribeAction::Transcription => "transcription",
        TranscribeAction::Translation => "translation",
    };
    let header = format!("**Model:** {model}\n**Action:** {action_label}\n");
    let mut embeds = vec![CreateEmbed::new()
        .title("Speech-to-Text")
        .description(&header)
        .colour(Colour::BLUE)];
    let used = "Speech-to-Text".chars().count() + header.chars().count();
    embeds.extend(response_embeds(&text, used));

    cmd.create_followup(
        &ctx.http,
        CreateInteractionResponseFollowup::new().embeds(embeds),
    )
    .await?;
    Ok(())
}

async fn handle_generate_video(
    state: &Arc<AppState>,
    ctx: &Context,
    cmd: &CommandInteraction,
) -> Result<(), ParleyError> {
    cmd.defer(&ctx.http).await?;
    let options = cmd.data.options();

    let prompt = str_option(&options, "prompt").unwrap_or_default().to_string();
    let model = str_option(&options, "model").unwrap_or("sora-2");
    let seconds = i64_option(&options, "seconds").unwrap_or(8).clamp(1, 60) as u8;
    let size = str_option(&options, "size").unwrap_or("1280x720");

    let _typing = typing::keep_typing(ctx.http.clone(), cmd.channel_id);
    let video = match state
        .openai
        .generate_video(
            &VideoRequest {
                prompt: &prompt,
                model,
                seconds,
                size,
            },
            std::time::Duration::from_secs(state.config.video_poll_interval_secs),
            state.config.video_max_polls,
        )
        .await
    {
        Ok(bytes) => bytes,
        Err(e) => return send_error(ctx, cmd, &e.to_string()).await,
    };

    let embed = CreateEmbed::new()
        .title("Video Generation")
        .description(format!(
            "**Prompt:** {}\n**Model:** {model}\n**Length:** {seconds}s\n**Size:** {size}\n",
            truncate(&prompt, PROMPT_ECHO_CAP)
        ))
        .colour(Colour::BLUE);
    cmd.create_followup(
        &ctx.http,
        CreateInteractionResponseFollowup::new()
            .embed(embed)
            .add_file(CreateAttachment::bytes(video, "video.mp4")),
    )
    .await?;
    Ok(())
}

/// Turn generated text into titled embeds via the chunker.
pub fn response_embeds(text: &str, existing_used_chars: usize) -> Vec<CreateEmbed> {
    chunker::chunk_response(text, existing_used_chars)
        .into_iter()
        .map(|segment| {
            CreateEmbed::new()
                .title(segment.title)
                .description(segment.body)
                .colour(Colour::BLUE)
        })
        .collect()
}

pub fn error_embed(message: &str) -> CreateEmbed {
    CreateEmbed::new()
        .title("Error")
        .description(message)
        .colour(Colour::RED)
}

async fn send_error(
    ctx: &Context,
    cmd: &CommandInteraction,
    message: &str,
) -> Result<(), ParleyError> {
    cmd.create_followup(
        &ctx.http,
        CreateInteractionResponseFollowup::new().embed(error_embed(message)),
    )
    .await?;
    Ok(())
}

/// The green "Conversation Started" summary. Optional parameters only
/// appear when set.
fn conversation_summary(prompt: &str, conversation: &Conversation) -> String {
    let mut s = format!(
        "**Prompt:** {}\n**Model:** {}\n**Persona:** {}\n",
        truncate(prompt, PROMPT_ECHO_CAP),
        conversation.model,
        truncate(&conversation.persona, PROMPT_ECHO_CAP)
    );
    let params = &conversation.params;
    if let Some(v) = params.frequency_penalty {
        s.push_str(&format!("**Frequency Penalty:** {v}\n"));
    }
    if let Some(v) = params.presence_penalty {
        s.push_str(&format!("**Presence Penalty:** {v}\n"));
    }
    if let Some(v) = params.seed {
        s.push_str(&format!("**Seed:** {v}\n"));
    }
    if let Some(v) = params.temperature {
        s.push_str(&format!("**Temperature:** {v}\n"));
    }
    if let Some(v) = params.top_p {
        s.push_str(&format!("**Nucleus Sampling:** {v}\n"));
    }
    if let Some(effort) = params.reasoning_effort {
        s.push_str(&format!("**Reasoning Effort:** {}\n", effort.as_str()));
    }
    s
}

fn str_option<'a>(options: &'a [ResolvedOption<'a>], name: &str) -> Option<&'a str> {
    options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        ResolvedValue::String(s) => Some(*s),
        _ => None,
    })
}

fn f64_option(options: &[ResolvedOption<'_>], name: &str) -> Option<f64> {
    options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        ResolvedValue::Number(n) => Some(*n),
        _ => None,
    })
}

fn i64_option(options: &[ResolvedOption<'_>], name: &str) -> Option<i64> {
    options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        ResolvedValue::Integer(n) => Some(*n),
        _ => None,
    })
}

fn attachment_option<'a>(
    options: &'a [ResolvedOption<'a>],
    name: &str,
) -> Option<&'a Attachment> {
    options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        ResolvedValue::Attachment(att) => Some(*att),
        _ => None,
    })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::Config;
    use crate::openai::OpenAiClient;
    use crate::registry::{ConversationRegistry, NewConversation};

    fn conversation_with_params(params: GenParams) -> Conversation {
        let registry = ConversationRegistry::new();
        registry
            .start_conversation(NewConversation {
                owner_id: 1,
                channel_id: 2,
                model: "gpt-4.1".into(),
                persona: "You are a helpful assistant.".into(),
                params,
                first_prompt: TurnContent::Text("hi".into()),
            })
            .unwrap()
    }

    // Provider endpoint nothing listens on, so calls fail immediately.
    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            config: Config {
                discord_bot_token: "token".into(),
                openai_api_key: "test-key".into(),
                openai_base_url: "http://127.0.0.1:1".into(),
                guild_ids: Vec::new(),
                default_model: "gpt-4.1".into(),
                default_persona: "You are a helpful assistant.".into(),
                log_level: "info".into(),
                video_poll_interval_secs: 1,
                video_max_polls: 1,
            },
            registry: ConversationRegistry::new(),
            openai: OpenAiClient::new("test-key", "http://127.0.0.1:1").unwrap(),
        })
    }

    #[tokio::test]
    async fn test_turn_processing_serialized_and_prompt_kept_on_failure() {
        let state = test_state();
        let convo = state
            .registry
            .start_conversation(NewConversation {
                owner_id: 1,
                channel_id: 2,
                model: "gpt-4.1".into(),
                persona: "You are a helpful assistant.".into(),
                params: GenParams::default(),
                first_prompt: TurnContent::Text("hi".into()),
            })
            .unwrap();
        let http = Arc::new(Http::new(""));

        // While someone holds the conversation's lock (as the opening
        // exchange does), an inbound turn must wait, not interleave.
        let lock = state.registry.turn_lock(convo.id);
        let held = lock.lock().await;

        let (task_state, task_http, id) = (state.clone(), http.clone(), convo.id);
        let task = tokio::spawn(async move {
            run_conversation_turn(
                &task_state,
                &task_http,
                id,
                1,
                TurnContent::Text("follow-up".into()),
            )
            .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        assert_eq!(state.registry.find(id).unwrap().turns.len(), 2);
        drop(held);

        // Once unblocked the provider call fails fast; the reply is a
        // single error embed and the user turn stays in history.
        let embeds = task.await.unwrap();
        assert_eq!(embeds.len(), 1);
        let after = state.registry.find(id).unwrap();
        assert_eq!(after.turns.len(), 3);
        assert_eq!(after.turns[2].role, TurnRole::User);
        assert_eq!(after.turns_acknowledged(), 0);
    }

    #[test]
    fn test_summary_omits_unset_params() {
        let conversation = conversation_with_params(GenParams::default());
        let summary = conversation_summary("hi", &conversation);
        assert!(summary.contains("**Prompt:** hi"));
        assert!(summary.contains("**Model:** gpt-4.1"));
        assert!(!summary.contains("Temperature"));
        assert!(!summary.contains("Seed"));
        assert!(!summary.contains("Nucleus Sampling"));
    }

    #[test]
    fn test_summary_includes_set_params() {
        let conversation = conversation_with_params(GenParams {
            temperature: Some(0.7),
            seed: Some(42),
            ..GenParams::default()
        });
        let summary = conversation_summary("hi", &conversation);
        assert!(summary.contains("**Temperature:** 0.7"));
        assert!(summary.contains("**Seed:** 42"));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("alloy"), "Alloy");
        assert_eq!(capitalize(""), "");
    }
}
