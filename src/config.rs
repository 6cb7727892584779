use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

const DEFAULT_DB_PATH: &str = "data/structured_chat.db";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_PROMPT_LENGTH: usize = 8000;
const DEFAULT_PORT: u16 = 8001;

/// Runtime settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub ollama_base_url: String,
    pub model: String,
    /// `None` waits on the generator indefinitely.
    pub generator_timeout: Option<Duration>,
    pub max_prompt_length: usize,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let timeout_secs: u64 = parse_or(&lookup, "GENERATOR_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        Ok(Self {
            db_path: lookup("CHAT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            ollama_base_url: lookup("OLLAMA_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            model: lookup("CHAT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            generator_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            max_prompt_length: parse_or(&lookup, "MAX_PROMPT_LENGTH", DEFAULT_MAX_PROMPT_LENGTH)?,
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}
