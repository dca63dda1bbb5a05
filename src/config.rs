use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Lavalink
    pub lavalink_url: String,
    pub lavalink_password: String,
    pub lavalink_max_failures: u32,

    // Paths
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID no definido")?
                .parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Lavalink
            lavalink_url: std::env::var("LAVALINK_URL")
                .unwrap_or_else(|_| "http://localhost:2333".to_string()),
            lavalink_password: std::env::var("LAVALINK_PASSWORD")
                .unwrap_or_else(|_| "youshallnotpass".to_string()),
            lavalink_max_failures: std::env::var("LAVALINK_MAX_FAILURES")
                .unwrap_or_else(|_| "10".to_string()) // 10 sondeos de 5s
                .parse()?,

            // Paths
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "/app/data".to_string())
                .into(),
        };

        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Discord token must not be empty
    /// - Lavalink URL must parse (`http(s)://host:port` or bare `host:port`)
    /// - At least one failed health poll before giving up on the node
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if self.lavalink_url.trim().is_empty() {
            anyhow::bail!("LAVALINK_URL must not be empty");
        }

        let candidate = if self.lavalink_url.contains("://") {
            self.lavalink_url.clone()
        } else {
            format!("http://{}", self.lavalink_url)
        };
        url::Url::parse(&candidate)
            .with_context(|| format!("LAVALINK_URL inválida: {}", self.lavalink_url))?;

        if self.lavalink_max_failures == 0 {
            anyhow::bail!("LAVALINK_MAX_FAILURES must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token and the Lavalink password.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Lavalink: {} (max {} sondeos fallidos)\n  \
            Data: {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.lavalink_url,
            self.lavalink_max_failures,
            self.data_dir.display()
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Lavalink defaults
            lavalink_url: "http://localhost:2333".to_string(),
            lavalink_password: "youshallnotpass".to_string(),
            lavalink_max_failures: 10,

            // Path defaults
            data_dir: "/app/data".into(),
        }
    }
}
