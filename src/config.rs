use crate::error::ParleyError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_discord_bot_token() -> String {
    String::new()
}
fn default_openai_api_key() -> String {
    String::new()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_guild_ids() -> Vec<u64> {
    Vec::new()
}
fn default_model() -> String {
    "gpt-4.1".into()
}
fn default_persona() -> String {
    "You are a helpful assistant.".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_video_poll_interval_secs() -> u64 {
    5
}
fn default_video_max_polls() -> usize {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_discord_bot_token")]
    pub discord_bot_token: String,

    #[serde(default = "default_openai_api_key")]
    pub openai_api_key: String,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Guilds where slash commands are registered on startup. Empty means
    /// commands are registered globally instead (slower to propagate).
    #[serde(default = "default_guild_ids")]
    pub guild_ids: Vec<u64>,

    /// Model used when /converse is invoked without an explicit choice.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Persona used when /converse is invoked without one.
    #[serde(default = "default_persona")]
    pub default_persona: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_video_poll_interval_secs")]
    pub video_poll_interval_secs: u64,

    #[serde(default = "default_video_max_polls")]
    pub video_max_polls: usize,
}

impl Config {
    /// Locate the config file: `PARLEY_CONFIG` if set, otherwise
    /// `parley.config.yaml` in the working directory.
    pub fn resolve_config_path() -> Result<Option<PathBuf>, ParleyError> {
        if let Ok(explicit) = std::env::var("PARLEY_CONFIG") {
            let path = PathBuf::from(&explicit);
            if !path.exists() {
                return Err(ParleyError::Config(format!(
                    "PARLEY_CONFIG points to {explicit}, but that file does not exist"
                )));
            }
            return Ok(Some(path));
        }
        let local = PathBuf::from("parley.config.yaml");
        if local.exists() {
            return Ok(Some(local));
        }
        Ok(None)
    }

    pub fn load() -> Result<Self, ParleyError> {
        if let Some(path) = Self::resolve_config_path()? {
            let path_str = path.display().to_string();
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| ParleyError::Config(format!("Failed to read {path_str}: {e}")))?;
            let mut config: Config = serde_yaml::from_str(&raw)
                .map_err(|e| ParleyError::Config(format!("Failed to parse {path_str}: {e}")))?;
            config.post_deserialize()?;
            return Ok(config);
        }
        Err(ParleyError::Config(
            "No config found. Set PARLEY_CONFIG or create parley.config.yaml".into(),
        ))
    }

    pub(crate) fn post_deserialize(&mut self) -> Result<(), ParleyError> {
        if self.discord_bot_token.trim().is_empty() {
            return Err(ParleyError::Config("discord_bot_token is required".into()));
        }
        if self.openai_api_key.trim().is_empty() {
            return Err(ParleyError::Config("openai_api_key is required".into()));
        }
        self.openai_base_url = self.openai_base_url.trim_end_matches('/').to_string();
        if self.openai_base_url.is_empty() {
            self.openai_base_url = default_openai_base_url();
        }
        Ok(())
    }
}
