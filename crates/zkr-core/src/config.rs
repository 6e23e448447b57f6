use std::{env, time::Duration};

use crate::{errors::Error, Result};

/// Discord's message length limit, in characters.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
/// Discord's attachment size limit, in bytes.
pub const DISCORD_ATTACHMENT_LIMIT: u64 = 25 * 1024 * 1024;
/// Default maximum number of channels in one link component.
pub const DEFAULT_LINK_LIMIT: usize = 5;

/// Typed configuration for the relay bot.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub discord_token: String,
    pub database_url: String,
    pub cipher_secret_key: Option<String>,

    // Linking
    pub link_limit: usize,

    // Discord limits
    pub message_chars_limit: usize,
    pub attachment_size_limit: u64,

    // Translation
    pub translate_max_retries: usize,
    pub translate_retry_base: Duration,
    pub openai_model: String,

    // Relay
    pub relay_channel_min_interval: Duration,
    pub relay_global_min_interval: Duration,
    pub webhook_name: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Existing variables win over `.env`.
        let _ = dotenvy::dotenv();

        let discord_token = env_str("DISCORD_TOKEN").and_then(non_empty).ok_or_else(|| {
            Error::Config("DISCORD_TOKEN environment variable is required".to_string())
        })?;

        let database_url = env_str("DATABASE_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| "sqlite://zekuru.db?mode=rwc".to_string());

        let cipher_secret_key = env_str("CIPHER_SECRET_KEY").and_then(non_empty);
        if let Some(key) = &cipher_secret_key {
            validate_cipher_key(key)?;
        }

        let defaults = Self::for_tests();

        Ok(Self {
            discord_token,
            database_url,
            cipher_secret_key,
            link_limit: env_usize("CHANNEL_LINK_LIMIT")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.link_limit),
            message_chars_limit: env_usize("MESSAGE_CHARS_LIMIT")
                .unwrap_or(defaults.message_chars_limit),
            attachment_size_limit: env_u64("ATTACHMENT_SIZE_LIMIT")
                .unwrap_or(defaults.attachment_size_limit),
            translate_max_retries: env_usize("TRANSLATE_MAX_RETRIES")
                .unwrap_or(defaults.translate_max_retries),
            translate_retry_base: env_u64("TRANSLATE_RETRY_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.translate_retry_base),
            openai_model: env_str("OPENAI_MODEL")
                .and_then(non_empty)
                .unwrap_or(defaults.openai_model),
            relay_channel_min_interval: env_u64("RELAY_CHANNEL_MIN_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.relay_channel_min_interval),
            relay_global_min_interval: env_u64("RELAY_GLOBAL_MIN_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.relay_global_min_interval),
            webhook_name: env_str("WEBHOOK_NAME")
                .and_then(non_empty)
                .unwrap_or(defaults.webhook_name),
        })
    }

    /// Defaults without touching the environment.
    pub fn for_tests() -> Self {
        Self {
            discord_token: String::new(),
            database_url: "sqlite::memory:".to_string(),
            cipher_secret_key: None,
            link_limit: DEFAULT_LINK_LIMIT,
            message_chars_limit: DISCORD_MESSAGE_LIMIT,
            attachment_size_limit: DISCORD_ATTACHMENT_LIMIT,
            translate_max_retries: 3,
            translate_retry_base: Duration::from_millis(500),
            openai_model: "gpt-4o-mini".to_string(),
            relay_channel_min_interval: Duration::from_millis(250),
            relay_global_min_interval: Duration::from_millis(20),
            webhook_name: "Zekuru Relay".to_string(),
        }
    }
}

fn validate_cipher_key(key: &str) -> Result<()> {
    let bytes = hex::decode(key.trim())
        .map_err(|e| Error::Config(format!("CIPHER_SECRET_KEY is not valid hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(Error::Config(format!(
            "CIPHER_SECRET_KEY must encode 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(())
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn non_empty(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_discord_limits() {
        let cfg = Config::for_tests();
        assert_eq!(cfg.message_chars_limit, 2000);
        assert_eq!(cfg.attachment_size_limit, 26_214_400);
        assert_eq!(cfg.link_limit, 5);
    }

    #[test]
    fn cipher_key_must_be_32_bytes_of_hex() {
        assert!(validate_cipher_key(&"ab".repeat(32)).is_ok());
        assert!(validate_cipher_key(&"ab".repeat(16)).is_err());
        assert!(validate_cipher_key("not-hex").is_err());
    }

    #[test]
    fn non_empty_trims() {
        assert_eq!(non_empty("  x ".to_string()), Some("x".to_string()));
        assert_eq!(non_empty("   ".to_string()), None);
    }
}
