//! Application Configuration Module
//!
//! Loads settings from the environment (and a `.env` file, when present)
//! into a single struct the binary hands to the session and client.

use live_voice_types::audio::Voice;
use live_voice_types::session::DEFAULT_MODEL;
use std::env;
use tracing::Level;

/// System instruction used when `GEMINI_SYSTEM_INSTRUCTION` is unset.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are the SF Ecosystem Voice Assistant. Help the user understand their merit, economy, and the protocol rules defined in the PRD.";

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub model: String,
    pub voice: Voice,
    pub system_instruction: String,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `GEMINI_API_KEY`: Required. Key for the live endpoint.
    // *   `GEMINI_LIVE_MODEL`: (Optional) Live model name.
    // *   `GEMINI_VOICE`: (Optional) Prebuilt voice name. Defaults to "Zephyr".
    // *   `GEMINI_SYSTEM_INSTRUCTION`: (Optional) Overrides the assistant persona.
    // *   `INPUT_DEVICE` / `OUTPUT_DEVICE`: (Optional) cpal device names.
    // *   `RUST_LOG`: (Optional) TRACE, DEBUG, INFO, WARN or ERROR. Defaults to INFO.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let gemini_api_key = lookup("GEMINI_API_KEY")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let model = lookup("GEMINI_LIVE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let voice = lookup("GEMINI_VOICE")
            .map(|v| v.parse::<Voice>().unwrap_or_else(|never| match never {}))
            .unwrap_or_default();
        let system_instruction = lookup("GEMINI_SYSTEM_INSTRUCTION")
            .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            gemini_api_key,
            model,
            voice,
            system_instruction,
            input_device: lookup("INPUT_DEVICE"),
            output_device: lookup("OUTPUT_DEVICE"),
            log_level,
        })
    }
}
