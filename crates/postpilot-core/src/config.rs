use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level config (postpilot.toml + POSTPILOT_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostpilotConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    /// AI provider slot. When absent the daemon falls back to the
    /// OPENAI_API_KEY env var, then to a null provider.
    pub ai: Option<AiConfig>,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

impl Default for PostpilotConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            ai: None,
            image: ImageConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub api_key: String,
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
}

/// Public image-prompt service (no API key required).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_image_base_url")]
    pub base_url: String,
    #[serde(default = "default_image_side")]
    pub width: u32,
    #[serde(default = "default_image_side")]
    pub height: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base_url: default_image_base_url(),
            width: default_image_side(),
            height: default_image_side(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between poll-loop ticks.
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
    /// How many drafts an auto-refill pass generates.
    #[serde(default = "default_refill_count")]
    pub refill_count: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
            refill_count: default_refill_count(),
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.postpilot/postpilot.db", home)
}
fn default_ai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_image_base_url() -> String {
    "https://image.pollinations.ai".to_string()
}
fn default_image_side() -> u32 {
    1024
}
fn default_poll_secs() -> u64 {
    60
}
fn default_refill_count() -> usize {
    5
}

impl PostpilotConfig {
    /// Load config from a TOML file with POSTPILOT_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.postpilot/postpilot.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: PostpilotConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("POSTPILOT_").split("_"))
            .extract()
            .map_err(|e| crate::error::PostpilotError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.postpilot/postpilot.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = PostpilotConfig::default();
        assert!(cfg.ai.is_none());
        assert_eq!(cfg.daemon.poll_secs, 60);
        assert_eq!(cfg.daemon.refill_count, 5);
        assert!(cfg.image.base_url.contains("pollinations"));
    }

    #[test]
    fn env_overrides_toml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "postpilot.toml",
                r#"
                [database]
                path = "/tmp/from-toml.db"
                "#,
            )?;
            jail.set_env("POSTPILOT_DATABASE_PATH", "/tmp/from-env.db");
            let cfg = PostpilotConfig::load(Some("postpilot.toml")).unwrap();
            assert_eq!(cfg.database.path, "/tmp/from-env.db");
            Ok(())
        });
    }
}
