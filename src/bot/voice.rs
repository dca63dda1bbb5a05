use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde_json::json;
use serenity::all::{Cache, ChannelId, GuildId, Http, UserId};
use songbird::{error::JoinError, Songbird};
use std::sync::Arc;
use tracing::{debug, info};

use crate::radio::VoiceGateway;

const DISCORD_API: &str = "https://discord.com/api/v10";

/// Operaciones de voz contra Discord.
///
/// Songbird solo se usa para enviar los cambios de estado de voz por el
/// gateway; el audio lo transmite el nodo Lavalink.
pub struct DiscordVoice {
    songbird: Arc<Songbird>,
    http: Arc<Http>,
    cache: Arc<Cache>,
    rest: reqwest::Client,
    token: String,
}

impl DiscordVoice {
    pub fn new(songbird: Arc<Songbird>, http: Arc<Http>, cache: Arc<Cache>, token: &str) -> Self {
        Self {
            songbird,
            http,
            cache,
            rest: reqwest::Client::new(),
            token: token.trim_start_matches("Bot ").to_string(),
        }
    }

    /// Cuenta usuarios no-bot del canal según la caché. Los miembros sin
    /// datos en caché cuentan como humanos.
    fn count_humans(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<usize> {
        let guild = self
            .cache
            .guild(guild_id)
            .with_context(|| format!("guild {} no está en caché", guild_id))?;

        let humans = guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(channel_id))
            .filter(|state| {
                let is_bot = state
                    .member
                    .as_ref()
                    .map(|member| member.user.bot)
                    .or_else(|| guild.members.get(&state.user_id).map(|m| m.user.bot));
                !is_bot.unwrap_or(false)
            })
            .count();

        Ok(humans)
    }
}

#[async_trait]
impl VoiceGateway for DiscordVoice {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        self.songbird
            .join_gateway(guild_id, channel_id)
            .await
            .with_context(|| format!("no se pudo entrar al canal {}", channel_id))?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn leave(&self, guild_id: GuildId) -> Result<()> {
        match self.songbird.remove(guild_id).await {
            Ok(()) => {
                info!("👋 Desconectado del canal de voz en guild {}", guild_id);
                Ok(())
            }
            Err(JoinError::NoCall) => {
                debug!("Sin llamada activa en guild {}", guild_id);
                Ok(())
            }
            Err(e) => Err(e).context("error al salir del canal de voz"),
        }
    }

    async fn is_human(&self, guild_id: GuildId, user_id: UserId) -> Result<bool> {
        let cached = self
            .cache
            .member(guild_id, user_id)
            .map(|member| member.user.bot);

        let is_bot = match cached {
            Some(is_bot) => is_bot,
            None => {
                self.http
                    .get_member(guild_id, user_id)
                    .await
                    .with_context(|| format!("miembro {} no encontrado", user_id))?
                    .user
                    .bot
            }
        };

        Ok(!is_bot)
    }

    async fn humans_in_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<usize> {
        self.count_humans(guild_id, channel_id)
    }

    async fn set_channel_status(&self, channel_id: ChannelId, status: &str) -> Result<()> {
        let url = format!("{}/channels/{}/voice-status", DISCORD_API, channel_id);

        let response = self
            .rest
            .put(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .json(&json!({ "status": status }))
            .send()
            .await?;

        if !response.status().is_success() {
            let code = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("voice-status {} respondió {}: {}", channel_id, code, body);
        }

        debug!("Estado del canal {} actualizado: '{}'", channel_id, status);
        Ok(())
    }
}
