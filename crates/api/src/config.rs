//! Server configuration loaded from environment variables.

use std::time::Duration;

use atelier_core::presets;
use atelier_core::validate::Policy;

/// Process configuration. All fields have defaults suitable for local
/// development except the NovelAI token, which has no sensible default and
/// is validated at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Directory holding the whitelist snapshot (default: `./data`).
    pub data_dir: String,
    /// Daily quota granted to newly whitelisted users (default: `10`).
    pub default_daily_limit: u32,
    /// NovelAI bearer token (required).
    pub nai_token: String,
    /// Optional HTTP proxy for backend calls.
    pub nai_proxy: Option<String>,
    /// Model used when a command omits `模型`.
    pub default_model: String,
    /// Model allow-list; empty `MODELS` env keeps the full built-in catalog.
    pub models: Vec<String>,
    /// Quality phrases for quality-word injection.
    pub quality_words: Vec<String>,
    /// Configured negative preset; empty means "use the built-in preset".
    pub negative_preset: Option<String>,
    /// Force quality-word injection for every request.
    pub always_add_quality: bool,
    /// Dispatch throttle window, seconds (defaults: `3` and `5`).
    pub min_dispatch_delay: Duration,
    pub max_dispatch_delay: Duration,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                   |
    /// |--------------------------|---------------------------|
    /// | `HOST`                   | `0.0.0.0`                 |
    /// | `PORT`                   | `8080`                    |
    /// | `CORS_ORIGINS`           | `http://localhost:5173`   |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                      |
    /// | `DATA_DIR`               | `./data`                  |
    /// | `DEFAULT_DAILY_LIMIT`    | `10`                      |
    /// | `NAI_TOKEN`              | — (required)              |
    /// | `NAI_PROXY`              | unset                     |
    /// | `DEFAULT_MODEL`          | built-in default model    |
    /// | `MODELS`                 | full built-in catalog     |
    /// | `QUALITY_WORDS`          | `best quality,masterpiece`|
    /// | `NEGATIVE_PRESET`        | unset (built-in preset)   |
    /// | `ALWAYS_ADD_QUALITY`     | `false`                   |
    /// | `MIN_DISPATCH_DELAY_SECS`| `3`                       |
    /// | `MAX_DISPATCH_DELAY_SECS`| `5`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins = csv_env("CORS_ORIGINS", "http://localhost:5173");

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into());

        let default_daily_limit: u32 = std::env::var("DEFAULT_DAILY_LIMIT")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("DEFAULT_DAILY_LIMIT must be a valid u32");

        let nai_token = std::env::var("NAI_TOKEN").unwrap_or_default();
        let nai_proxy = std::env::var("NAI_PROXY").ok().filter(|p| !p.is_empty());

        let default_model =
            std::env::var("DEFAULT_MODEL").unwrap_or_else(|_| presets::DEFAULT_MODEL.into());

        let models = match std::env::var("MODELS") {
            Ok(v) if !v.trim().is_empty() => {
                v.split(',').map(|s| s.trim().to_string()).collect()
            }
            _ => presets::MODELS.iter().map(|m| m.to_string()).collect(),
        };

        let quality_words = csv_env("QUALITY_WORDS", "best quality,masterpiece");

        let negative_preset = std::env::var("NEGATIVE_PRESET")
            .ok()
            .filter(|p| !p.is_empty());

        let always_add_quality = std::env::var("ALWAYS_ADD_QUALITY")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let min_dispatch_delay = Duration::from_secs(
            std::env::var("MIN_DISPATCH_DELAY_SECS")
                .unwrap_or_else(|_| "3".into())
                .parse()
                .expect("MIN_DISPATCH_DELAY_SECS must be a valid u64"),
        );
        let max_dispatch_delay = Duration::from_secs(
            std::env::var("MAX_DISPATCH_DELAY_SECS")
                .unwrap_or_else(|_| "5".into())
                .parse()
                .expect("MAX_DISPATCH_DELAY_SECS must be a valid u64"),
        );

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            data_dir,
            default_daily_limit,
            nai_token,
            nai_proxy,
            default_model,
            models,
            quality_words,
            negative_preset,
            always_add_quality,
            min_dispatch_delay,
            max_dispatch_delay,
        }
    }

    /// The validation [`Policy`] this configuration implies.
    pub fn policy(&self) -> Policy {
        Policy {
            models: self.models.clone(),
            default_model: self.default_model.clone(),
            quality_words: self.quality_words.clone(),
            negative_preset: self.negative_preset.clone(),
            always_add_quality: self.always_add_quality,
        }
    }
}

/// Comma-separated env var with a default, trimmed and empties dropped.
fn csv_env(name: &str, default: &str) -> Vec<String> {
    std::env::var(name)
        .unwrap_or_else(|_| default.into())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
