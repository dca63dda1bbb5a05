use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::time;
use tracing::{debug, error, info, warn};

use super::{
    connection::ConnectionManager,
    registry::{SessionRegistry, SessionState},
    skip::SkipVoteCoordinator,
    Catalog, ChannelDirectory, RadioTimings, VoiceGateway,
};
use crate::{
    audio::node::{AudioNode, NodeError, NodeEvent},
    error::{RadioError, RadioResult},
};

/// Código de cierre normal del socket de voz
const NORMAL_CLOSE: u16 = 1000;

const LOADING_STATUS: &str = "Loading...";

/// Elige y reproduce pistas y reacciona a los eventos del nodo
pub struct TrackScheduler {
    registry: Arc<SessionRegistry>,
    votes: Arc<SkipVoteCoordinator>,
    connection: Arc<ConnectionManager>,
    node: Arc<dyn AudioNode>,
    catalog: Arc<dyn Catalog>,
    directory: Arc<dyn ChannelDirectory>,
    voice: Arc<dyn VoiceGateway>,
    timings: RadioTimings,
}

impl TrackScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<SessionRegistry>,
        votes: Arc<SkipVoteCoordinator>,
        connection: Arc<ConnectionManager>,
        node: Arc<dyn AudioNode>,
        catalog: Arc<dyn Catalog>,
        directory: Arc<dyn ChannelDirectory>,
        voice: Arc<dyn VoiceGateway>,
        timings: RadioTimings,
    ) -> Self {
        Self {
            registry,
            votes,
            connection,
            node,
            catalog,
            directory,
            voice,
            timings,
        }
    }

    /// Arranca la radio 24/7 en el canal configurado de la guild
    pub async fn start_session(&self, guild_id: GuildId) -> RadioResult<()> {
        if self.registry.is_active(guild_id) {
            return Err(RadioError::AlreadyActive(guild_id));
        }

        if !self.connection.is_connected() {
            info!("Lavalink no conectado, intentando conectar...");
            self.connection.reconnect().await?;
        }

        let channel_id = self
            .directory
            .radio_channel(guild_id)
            .await?
            .ok_or(RadioError::NoRadioChannel(guild_id))?;

        self.registry.set_active(guild_id, true);

        let joined = time::timeout(self.timings.join_timeout, self.voice.join(guild_id, channel_id))
            .await
            .map_err(|_| "tiempo de espera agotado".to_string())
            .and_then(|result| result.map_err(|e| e.to_string()));

        if let Err(reason) = joined {
            self.registry.set_active(guild_id, false);
            return Err(RadioError::VoiceJoin(reason));
        }

        self.registry.set_channel(guild_id, Some(channel_id));
        info!(
            "📻 Conectado al canal de radio {} en guild {}",
            channel_id, guild_id
        );

        // La conexión de voz tarda un poco en asentarse en el nodo
        time::sleep(self.timings.join_settle).await;

        self.set_status(channel_id, LOADING_STATUS).await;

        if let Err(e) = self.play_next(guild_id).await {
            self.abandon(guild_id, &e).await;
            return Err(e);
        }

        Ok(())
    }

    /// Reproduce una canción aleatoria del catálogo.
    ///
    /// Reintenta con otra canción tras cada fallo hasta agotar
    /// `max_play_attempts`. Si la sesión se detiene o pausa entretanto, no
    /// hace nada más.
    pub async fn play_next(&self, guild_id: GuildId) -> RadioResult<()> {
        let generation = self.registry.generation(guild_id);
        let max_attempts = self.timings.max_play_attempts;

        for attempt in 1..=max_attempts {
            if !self.registry.is_current(guild_id, generation) {
                debug!(
                    "Sesión de guild {} ya no está reproduciendo, se descarta la siguiente pista",
                    guild_id
                );
                return Ok(());
            }

            if !self.connection.is_connected() {
                return Err(RadioError::NotConnected);
            }

            match self.try_play(guild_id, generation).await {
                Ok(()) => return Ok(()),
                Err(RadioError::CatalogEmpty) => return Err(RadioError::CatalogEmpty),
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts, "⚠️ No se pudo reproducir en guild {}: {}", guild_id, e
                    );
                    if attempt < max_attempts {
                        time::sleep(self.timings.play_retry_backoff).await;
                    }
                }
            }
        }

        Err(RadioError::NoPlayableTrack {
            attempts: max_attempts,
        })
    }

    async fn try_play(&self, guild_id: GuildId, generation: u64) -> RadioResult<()> {
        let song = self
            .catalog
            .pick_random_song()
            .await?
            .ok_or(RadioError::CatalogEmpty)?;

        let query = song.search_query();
        self.registry
            .set_current_track(guild_id, song.id, &song.artist, &song.title);

        let loaded = time::timeout(
            self.timings.command_timeout,
            self.node.load_and_play(guild_id, &query),
        )
        .await
        .map_err(|_| NodeError::Timeout("carga de pista"))??;

        let length = loaded
            .duration
            .map(|duration| humantime::format_duration(duration).to_string())
            .unwrap_or_else(|| "en directo".to_string());
        debug!(
            uri = loaded.uri.as_deref().unwrap_or("-"),
            "Nodo aceptó '{} - {}' ({}) para '{}'",
            loaded.author,
            loaded.title,
            length,
            query
        );

        // Un stop concurrente tiene prioridad sobre esta reproducción
        if !self.registry.is_current(guild_id, generation) {
            info!(
                "Sesión de guild {} detenida durante la carga, parando pista",
                guild_id
            );
            self.stop_node(guild_id).await;
        }

        Ok(())
    }

    /// Lanza `play_next` en segundo plano; si falla del todo, abandona la sesión
    pub fn advance(self: &Arc<Self>, guild_id: GuildId) {
        self.advance_after(guild_id, Duration::ZERO);
    }

    pub fn advance_after(self: &Arc<Self>, guild_id: GuildId, delay: Duration) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            if !delay.is_zero() {
                time::sleep(delay).await;
            }
            if let Err(e) = scheduler.play_next(guild_id).await {
                scheduler.abandon(guild_id, &e).await;
            }
        });
    }

    /// Reacciona a un evento de pista del nodo
    pub async fn handle_event(self: &Arc<Self>, event: NodeEvent) {
        let guild_id = event.guild_id();

        match event {
            NodeEvent::TrackStarted { title, author, .. } => {
                info!("▶️ Pista iniciada en guild {}: {} - {}", guild_id, author, title);
                if !self.registry.is_active(guild_id) {
                    return;
                }

                self.votes.reset_votes(guild_id);

                let status = self
                    .registry
                    .current_track(guild_id)
                    .map(|track| track.status_text())
                    .unwrap_or_else(|| format!("{} - {}", author, title));

                if let Some(channel_id) = self.registry.channel(guild_id) {
                    self.set_status(channel_id, &status).await;
                }
            }
            NodeEvent::TrackEnded { reason, .. } => {
                info!("🎵 Pista terminada en guild {} ({:?})", guild_id, reason);
                if reason.may_start_next() && self.registry.is_active(guild_id) {
                    self.advance(guild_id);
                }
            }
            NodeEvent::TrackException {
                severity, message, ..
            } => {
                error!(
                    "❌ Excepción de pista en guild {}: {} ({})",
                    guild_id, message, severity
                );
                if self.registry.is_active(guild_id) {
                    self.advance(guild_id);
                }
            }
            NodeEvent::TrackStuck { threshold, .. } => {
                warn!(
                    "⏳ Pista atascada en guild {} (umbral {})",
                    guild_id,
                    humantime::format_duration(threshold)
                );
                if self.registry.is_active(guild_id) {
                    self.advance(guild_id);
                }
            }
            NodeEvent::ControlSocketClosed {
                code,
                reason,
                by_remote,
                ..
            } => {
                warn!(
                    code,
                    by_remote, "🔌 Socket de voz cerrado en guild {}: {}", guild_id, reason
                );
                if code != NORMAL_CLOSE && self.registry.is_active(guild_id) {
                    tokio::spawn(Arc::clone(self).rejoin(guild_id));
                }
            }
            NodeEvent::PlayerReset { .. } => {
                // En pausa no hay nada que retomar: la reanudación ya reproduce
                if self.registry.state(guild_id) == SessionState::Active {
                    warn!("♻️ Lavalink perdió el player de guild {}, retomando la radio", guild_id);
                    self.advance(guild_id);
                }
            }
        }
    }

    /// Reentra al canal configurado tras un cierre anómalo del socket de voz
    async fn rejoin(self: Arc<Self>, guild_id: GuildId) {
        time::sleep(self.timings.reconnect_delay).await;

        if !self.registry.is_active(guild_id) {
            return;
        }

        let channel_id = match self.directory.radio_channel(guild_id).await {
            Ok(Some(channel_id)) => channel_id,
            Ok(None) => {
                warn!("Guild {} ya no tiene canal de radio configurado", guild_id);
                return;
            }
            Err(e) => {
                error!("Error obteniendo canal de radio de guild {}: {:?}", guild_id, e);
                return;
            }
        };

        match time::timeout(self.timings.join_timeout, self.voice.join(guild_id, channel_id)).await {
            Ok(Ok(())) => info!("🔄 Reconectado al canal de voz en guild {}", guild_id),
            Ok(Err(e)) => {
                error!("Error al reconectar al canal de voz en guild {}: {:?}", guild_id, e);
                return;
            }
            Err(_) => {
                error!("Reconexión al canal de voz agotó el tiempo en guild {}", guild_id);
                return;
            }
        }

        self.registry.set_channel(guild_id, Some(channel_id));
        time::sleep(self.timings.join_settle).await;

        if let Err(e) = self.play_next(guild_id).await {
            self.abandon(guild_id, &e).await;
        }
    }

    /// Pausa la reproducción cuando el canal se queda sin oyentes
    pub async fn pause(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.votes.reset_votes(guild_id);
        self.stop_node(guild_id).await;
        self.set_status(channel_id, "").await;
    }

    /// Detiene la radio de una guild y sale del canal de voz
    pub async fn stop_session(&self, guild_id: GuildId) -> RadioResult<()> {
        self.registry.set_active(guild_id, false);
        self.votes.reset_votes(guild_id);

        self.stop_node(guild_id).await;

        if let Some(channel_id) = self.registry.channel(guild_id) {
            self.set_status(channel_id, "").await;
        }
        self.registry.clear_current_track(guild_id);

        time::timeout(self.timings.command_timeout, self.voice.leave(guild_id))
            .await
            .map_err(|_| anyhow::anyhow!("tiempo de espera agotado al salir del canal de voz"))??;
        self.registry.set_channel(guild_id, None);

        info!("⏹️ Radio detenida en guild {}", guild_id);
        Ok(())
    }

    /// Para todas las sesiones activas sin salir de voz (apagado o caída)
    pub async fn stop_all_sessions(&self) {
        for guild_id in self.registry.active_guilds() {
            self.registry.set_active(guild_id, false);
            self.votes.reset_votes(guild_id);
            self.stop_node(guild_id).await;
        }
    }

    /// Sale de todos los canales de radio tras perder el nodo definitivamente
    pub async fn disconnect_all(&self) {
        let guilds = self.registry.active_guilds();

        for &guild_id in &guilds {
            info!(
                "🔌 Saliendo del canal de radio en guild {} por caída de Lavalink",
                guild_id
            );

            if let Some(channel_id) = self.registry.channel(guild_id) {
                self.set_status(channel_id, "").await;
            }

            match time::timeout(self.timings.command_timeout, self.voice.leave(guild_id)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Error al salir del canal de voz en guild {}: {:?}", guild_id, e),
                Err(_) => error!("Salida del canal de voz agotó el tiempo en guild {}", guild_id),
            }
        }

        self.stop_all_sessions().await;
    }

    /// Cierra una sesión que no puede seguir reproduciendo
    async fn abandon(&self, guild_id: GuildId, reason: &RadioError) {
        error!("❌ Abandonando la radio en guild {}: {}", guild_id, reason);
        if let Err(e) = self.stop_session(guild_id).await {
            error!("Error al cerrar la radio en guild {}: {:?}", guild_id, e);
        }
    }

    async fn stop_node(&self, guild_id: GuildId) {
        if !self.connection.is_initialized() {
            return;
        }

        match time::timeout(self.timings.command_timeout, self.node.stop(guild_id)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Error al detener la pista en guild {}: {}", guild_id, e),
            Err(_) => warn!("Detener la pista agotó el tiempo en guild {}", guild_id),
        }
    }

    async fn set_status(&self, channel_id: ChannelId, status: &str) {
        match time::timeout(
            self.timings.command_timeout,
            self.voice.set_channel_status(channel_id, status),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Error al actualizar el estado del canal {}: {:?}", channel_id, e),
            Err(_) => error!("Actualizar el estado del canal {} agotó el tiempo", channel_id),
        }
    }
}
