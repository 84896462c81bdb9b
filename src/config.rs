use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_STORAGE_KEY: &str = "mealLogs";
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Clone, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub gemini: GeminiConfig,
    pub ai_timeout: Duration,
    pub data_dir: PathBuf,
    pub storage_key: String,
    pub max_image_bytes: usize,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let gemini = GeminiConfig {
            api_key: std::env::var("GEMINI_API_KEY").context("GEMINI_API_KEY must be set")?,
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.into()),
            base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.into()),
        };
        Ok(Self {
            gemini,
            ai_timeout: Duration::from_secs(parse_env("AI_TIMEOUT_SECS", 60)),
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            storage_key: std::env::var("STORAGE_KEY")
                .unwrap_or_else(|_| DEFAULT_STORAGE_KEY.into()),
            max_image_bytes: parse_env("MAX_IMAGE_BYTES", DEFAULT_MAX_IMAGE_BYTES),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_env("APP_PORT", 8080),
        })
    }

    /// Config used by tests and `AppState::fake`; never talks to a real provider.
    pub fn for_tests() -> Self {
        Self {
            gemini: GeminiConfig {
                api_key: "test".into(),
                model: DEFAULT_GEMINI_MODEL.into(),
                base_url: "http://127.0.0.1:9".into(),
            },
            ai_timeout: Duration::from_secs(5),
            data_dir: PathBuf::from("./data"),
            storage_key: DEFAULT_STORAGE_KEY.into(),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            host: "127.0.0.1".into(),
            port: 0,
        }
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
