// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};
use tracing::{info, warn};

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";
pub const ENV_AI_CONFIG_PATH: &str = "AI_CONFIG_PATH";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_api_key() -> String {
    "ENV".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "openai" | "mock" (case-insensitive)
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            model: default_model(),
            api_key: default_api_key(),
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: AiConfig = serde_json::from_str(&data)?;

        cfg.provider = cfg.provider.trim().to_lowercase();
        if cfg.model.trim().is_empty() {
            cfg.model = default_model();
        }

        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                "openai" if cfg.enabled => env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing OPENAI_API_KEY env var"))?,
                "openai" | "mock" => String::new(),
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        Ok(cfg)
    }

    /// `$AI_CONFIG_PATH`, else `config/ai.json`. Any failure falls back to a
    /// disabled config so the service still boots.
    pub fn load_default() -> Self {
        let path = env::var(ENV_AI_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_AI_CONFIG_PATH.to_string());
        if !Path::new(&path).exists() {
            info!(%path, "no AI config found; generation disabled");
            return Self::default();
        }
        match Self::load_from_file(&path) {
            Ok(cfg) => {
                // Safe diagnostics: only provider + enabled + key length
                info!(
                    "AI cfg loaded: provider={}, model={}, enabled={}, key_len={}",
                    cfg.provider,
                    cfg.model,
                    cfg.enabled,
                    cfg.api_key.len()
                );
                cfg
            }
            Err(e) => {
                warn!(%path, error = %e, "AI config invalid; generation disabled");
                Self::default()
            }
        }
    }
}
