pub mod buttons;
pub mod channels;
pub mod chunker;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod openai;
pub mod registry;
pub mod runtime;
pub mod typing;
