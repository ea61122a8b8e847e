//! Model catalog: which models exist per endpoint and which constraints
//! apply to each. All model-specific guard clauses live here so command
//! handlers stay thin.

/// Models that reject a separate system turn and run with a fixed sampling
/// temperature. Matched exactly, not by prefix: "gpt-5" style models accept
/// system turns and sampling parameters.
pub const REASONING_MODELS: &[&str] = &["o1", "o1-mini", "o1-pro", "o3", "o3-mini", "o4-mini"];

/// (display name, API id) pairs offered by the /converse model option.
pub const CHAT_MODELS: &[(&str, &str)] = &[
    ("GPT-4.1", "gpt-4.1"),
    ("GPT-4.1 Mini", "gpt-4.1-mini"),
    ("GPT-4.1 Nano", "gpt-4.1-nano"),
    ("o4 Mini", "o4-mini"),
    ("o3", "o3"),
    ("o3 Mini", "o3-mini"),
    ("o1", "o1"),
    ("o1 Mini", "o1-mini"),
    ("GPT-4o", "gpt-4o"),
    ("GPT-4o Mini", "gpt-4o-mini"),
];

pub const IMAGE_MODELS: &[(&str, &str)] = &[
    ("DALL-E 2", "dall-e-2"),
    ("DALL-E 3", "dall-e-3"),
    ("GPT Image", "gpt-image-1"),
];

pub const TTS_MODELS: &[(&str, &str)] = &[
    ("TTS-1", "tts-1"),
    ("TTS-1 HD", "tts-1-hd"),
    ("GPT-4o Mini TTS", "gpt-4o-mini-tts"),
];

/// Voices accepted by every TTS model.
pub const TTS_VOICES: &[&str] = &["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

/// Voices only the rich TTS model (gpt-4o-mini-tts) supports.
pub const RICH_TTS_VOICES: &[&str] = &["ash", "ballad", "coral", "sage", "verse"];

pub const RICH_TTS_MODEL: &str = "gpt-4o-mini-tts";

pub const STT_MODELS: &[(&str, &str)] = &[
    ("Whisper", "whisper-1"),
    ("GPT-4o Transcribe", "gpt-4o-transcribe"),
    ("GPT-4o Mini Transcribe", "gpt-4o-mini-transcribe"),
];

pub const AUDIO_FORMATS: &[&str] = &["mp3", "wav", "opus", "aac", "flac", "pcm"];

pub const VIDEO_MODELS: &[(&str, &str)] = &[("Sora 2", "sora-2"), ("Sora 2 Pro", "sora-2-pro")];

pub fn is_reasoning_model(model: &str) -> bool {
    REASONING_MODELS.contains(&model)
}

/// Effort level passed as `reasoning.effort` for reasoning models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(ReasoningEffort::Low),
            "medium" => Some(ReasoningEffort::Medium),
            "high" => Some(ReasoningEffort::High),
            _ => None,
        }
    }
}

/// Validate an image generation request against per-model constraints.
/// Returns a user-facing message on violation.
pub fn validate_image_request(
    model: &str,
    n: u8,
    quality: &str,
    size: &str,
) -> Result<(), String> {
    if (model == "dall-e-2" && n > 10) || (model == "dall-e-3" && n > 1) {
        return Err(
            "The maximum number of images for DALL-E 2 is 10 and for DALL-E 3 is 1.".into(),
        );
    }
    if model == "dall-e-2" && (size == "1024x1792" || size == "1792x1024") {
        return Err(
            "The DALL-E 2 model only supports `256x256`, `512x512`, or `1024x1024` image size."
                .into(),
        );
    }
    if model == "dall-e-3" && (size == "256x256" || size == "512x512") {
        return Err(
            "The DALL-E 3 model only supports `1024x1024`, `1792x1024`, or `1024x1792` image size."
                .into(),
        );
    }
    if model == "dall-e-2" && quality == "hd" {
        return Err("The `hd` quality option is only supported for DALL-E 3.".into());
    }
    if (model == "dall-e-2" || model == "dall-e-3")
        && matches!(quality, "low" | "medium" | "high" | "auto")
    {
        return Err("DALL-E models only support 'standard' and 'hd' quality options.".into());
    }
    if model == "gpt-image-1" && matches!(quality, "standard" | "hd") {
        return Err(
            "GPT Image only supports 'low', 'medium', 'high', and 'auto' quality options.".into(),
        );
    }
    Ok(())
}

/// The option default is "medium" (a GPT Image quality); map it to the
/// DALL-E default when a DALL-E model is selected.
pub fn normalize_image_quality<'a>(model: &str, quality: &'a str) -> &'a str {
    if quality == "medium" && (model == "dall-e-2" || model == "dall-e-3") {
        return "standard";
    }
    quality
}

/// DALL-E 2 ignores style; GPT Image does not accept it at all.
pub fn image_style_applies(model: &str) -> bool {
    model == "dall-e-3"
}

/// Rich voices are only valid on the rich TTS model.
pub fn validate_tts_voice(model: &str, voice: &str) -> Result<(), String> {
    if RICH_TTS_VOICES.contains(&voice) && model != RICH_TTS_MODEL {
        return Err(format!(
            "The `{voice}` voice is only supported by GPT-4o Mini TTS."
        ));
    }
    Ok(())
}
