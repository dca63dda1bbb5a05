//! # Bot Module
//!
//! Discord front-end for the 24/7 radio.
//!
//! - Slash command registration and handling (`/radio`)
//! - Gateway voice events routed to the radio ([`crate::radio::VoiceSignalRelay`])
//! - [`voice::DiscordVoice`], the Discord side of the radio's voice operations
//!
//! ## Architecture
//!
//! [`RadioBot`] implements Serenity's [`EventHandler`]. The radio service is
//! built after the client (it needs the client's cache and HTTP handle) and is
//! stored in the client's data map; until then every radio operation is
//! skipped.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceServerUpdateEvent, VoiceState},
    async_trait,
    prelude::TypeMapKey,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod voice;

use crate::{
    config::Config,
    radio::{PresenceAction, PresenceChange, RadioService},
    storage::JsonStorage,
};

impl TypeMapKey for RadioService {
    type Value = Arc<RadioService>;
}

/// Discord event handler for the radio bot.
pub struct RadioBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    /// Persistent per-guild settings (radio voice channel)
    pub storage: Arc<tokio::sync::Mutex<JsonStorage>>,
}

impl RadioBot {
    pub fn new(config: Config, storage: Arc<tokio::sync::Mutex<JsonStorage>>) -> Self {
        Self {
            config: Arc::new(config),
            storage,
        }
    }

    /// Radio service, if it has been initialized
    pub async fn radio(&self, ctx: &Context) -> Option<Arc<RadioService>> {
        ctx.data.read().await.get::<RadioService>().cloned()
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands (when `GUILD_ID` is set) propagate almost immediately;
    /// global commands can take up to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for RadioBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Own voice state goes to the audio node; everyone else's may pause or
    /// resume the radio.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        let Some(radio) = self.radio(&ctx).await else {
            debug!("Radio no inicializada, ignorando estado de voz");
            return;
        };

        let relay = radio.relay();

        if new.user_id == relay.bot_user_id() {
            relay
                .on_own_voice_state(guild_id, new.channel_id, &new.session_id)
                .await;
            return;
        }

        let change = PresenceChange {
            guild_id,
            user_id: new.user_id,
            old_channel: old.and_then(|state| state.channel_id),
            new_channel: new.channel_id,
        };

        match relay.on_presence_change(change).await {
            PresenceAction::Ignored => {}
            action => debug!("Radio en guild {}: {:?}", guild_id, action),
        }
    }

    async fn voice_server_update(&self, ctx: Context, event: VoiceServerUpdateEvent) {
        let Some(guild_id) = event.guild_id else {
            return;
        };

        if let Some(radio) = self.radio(&ctx).await {
            radio
                .relay()
                .on_voice_server(guild_id, &event.token, event.endpoint.as_deref())
                .await;
        }
    }
}
