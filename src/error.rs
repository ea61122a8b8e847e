use thiserror::Error;

use crate::registry::RegistryError;

/// Crate-level error for configuration and collaborator failures.
/// Registry errors keep their own enum in `registry`; they fold in here
/// when a handler has nothing more specific to do with them.
#[derive(Debug, Error)]
pub enum ParleyError {
    #[error("Config error: {0}")]
    Config(String),

    /// Failure reported by the OpenAI API. The message is the provider's
    /// own error text and is shown to the user verbatim.
    #[error("{0}")]
    OpenAi(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Discord error: {0}")]
    Discord(#[from] serenity::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Registry(#[from] RegistryError),
}
