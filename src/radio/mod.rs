//! # Radio Module
//!
//! Orquestador de la radio 24/7: una sesión por guild que reproduce canciones
//! aleatorias del catálogo sin fin, se pausa cuando no quedan oyentes y
//! sobrevive a caídas del nodo de audio.
//!
//! ### [`registry`] - Estado por guild
//! ### [`connection`] - Conexión y salud del nodo
//! ### [`scheduler`] - Selección de pistas y eventos del nodo
//! ### [`relay`] - Señales de voz de Discord
//! ### [`skip`] - Votaciones de salto

pub mod connection;
pub mod registry;
pub mod relay;
pub mod scheduler;
pub mod skip;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    audio::node::{AudioNode, NodeEvent},
    error::{RadioError, RadioResult},
};

pub use connection::{ConnectionHealth, ConnectionManager, NodeSettings};
pub use registry::{SessionRegistry, SessionState, TrackInfo};
pub use relay::{PresenceAction, PresenceChange, VoiceSignalRelay};
pub use scheduler::TrackScheduler;
pub use skip::{SkipTally, SkipVoteCoordinator};

/// Canción del catálogo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: i64,
    pub artist: String,
    pub title: String,
}

impl Song {
    /// Búsqueda que se envía al nodo para resolver la canción
    pub fn search_query(&self) -> String {
        format!("ytsearch:{} - {}", self.artist, self.title)
    }
}

/// Fuente de canciones de la radio
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    /// `None` si el catálogo está vacío
    async fn pick_random_song(&self) -> anyhow::Result<Option<Song>>;
}

/// Configuración persistida del canal de radio por guild
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn radio_channel(&self, guild_id: GuildId) -> anyhow::Result<Option<ChannelId>>;
}

/// Operaciones de voz y de canal contra Discord
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> anyhow::Result<()>;

    async fn leave(&self, guild_id: GuildId) -> anyhow::Result<()>;

    /// `Ok(false)` para bots; error si no se pudo resolver el miembro
    async fn is_human(&self, guild_id: GuildId, user_id: UserId) -> anyhow::Result<bool>;

    /// Usuarios no-bot en el canal; error si la guild no se pudo consultar
    async fn humans_in_channel(&self, guild_id: GuildId, channel_id: ChannelId)
        -> anyhow::Result<usize>;

    /// Estado visible del canal de voz; cadena vacía lo borra
    async fn set_channel_status(&self, channel_id: ChannelId, status: &str) -> anyhow::Result<()>;
}

/// Callback que se dispara una vez cuando el nodo se da por perdido
pub type DisconnectCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Tiempos y límites de la radio
#[derive(Debug, Clone)]
pub struct RadioTimings {
    pub connect_attempts: u32,
    pub connect_timeout: Duration,
    pub connect_retry_delay: Duration,
    pub health_interval: Duration,
    pub health_poll_timeout: Duration,
    pub command_timeout: Duration,
    pub join_timeout: Duration,
    pub join_settle: Duration,
    pub play_retry_backoff: Duration,
    pub max_play_attempts: u32,
    pub reconnect_delay: Duration,
    pub skip_delay: Duration,
    pub lookup_timeout: Duration,
}

impl Default for RadioTimings {
    fn default() -> Self {
        Self {
            connect_attempts: 5,
            connect_timeout: Duration::from_secs(10),
            connect_retry_delay: Duration::from_secs(5),
            health_interval: Duration::from_secs(5),
            health_poll_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(10),
            join_timeout: Duration::from_secs(10),
            join_settle: Duration::from_secs(2),
            play_retry_backoff: Duration::from_secs(2),
            max_play_attempts: 5,
            reconnect_delay: Duration::from_secs(3),
            skip_delay: Duration::from_millis(500),
            lookup_timeout: Duration::from_secs(5),
        }
    }
}

/// Colaboradores externos del servicio
pub struct RadioDeps {
    pub node: Arc<dyn AudioNode>,
    pub catalog: Arc<dyn Catalog>,
    pub directory: Arc<dyn ChannelDirectory>,
    pub voice: Arc<dyn VoiceGateway>,
    pub bot_user_id: UserId,
    pub node_settings: NodeSettings,
    pub timings: RadioTimings,
    /// Se invoca tras salir de todos los canales por caída del nodo
    pub on_permanent_disconnect: Option<DisconnectCallback>,
}

/// Punto de entrada de la radio para el bot
pub struct RadioService {
    registry: Arc<SessionRegistry>,
    votes: Arc<SkipVoteCoordinator>,
    connection: Arc<ConnectionManager>,
    scheduler: Arc<TrackScheduler>,
    relay: VoiceSignalRelay,
    voice: Arc<dyn VoiceGateway>,
    timings: RadioTimings,
    on_permanent_disconnect: Option<DisconnectCallback>,
}

impl RadioService {
    pub fn new(deps: RadioDeps) -> Arc<Self> {
        Arc::new_cyclic(|service: &Weak<Self>| {
            let service = service.clone();
            let on_disconnect: DisconnectCallback = Arc::new(move || {
                let service = service.clone();
                async move {
                    if let Some(service) = service.upgrade() {
                        service.handle_permanent_disconnect().await;
                    }
                }
                .boxed()
            });

            let registry = Arc::new(SessionRegistry::new());
            let votes = Arc::new(SkipVoteCoordinator::new());
            let connection = Arc::new(ConnectionManager::new(
                Arc::clone(&deps.node),
                deps.node_settings,
                deps.timings.clone(),
                on_disconnect,
            ));
            let scheduler = Arc::new(TrackScheduler::new(
                Arc::clone(&registry),
                Arc::clone(&votes),
                Arc::clone(&connection),
                Arc::clone(&deps.node),
                deps.catalog,
                deps.directory,
                Arc::clone(&deps.voice),
                deps.timings.clone(),
            ));
            let relay = VoiceSignalRelay::new(
                deps.node,
                Arc::clone(&connection),
                Arc::clone(&registry),
                Arc::clone(&votes),
                Arc::clone(&scheduler),
                Arc::clone(&deps.voice),
                deps.bot_user_id,
                deps.timings.clone(),
            );

            Self {
                registry,
                votes,
                connection,
                scheduler,
                relay,
                voice: deps.voice,
                timings: deps.timings,
                on_permanent_disconnect: deps.on_permanent_disconnect,
            }
        })
    }

    /// Conecta con el nodo configurado y arranca la monitorización
    pub async fn connect(&self) -> RadioResult<()> {
        self.connection.reconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection_health(&self) -> ConnectionHealth {
        self.connection.health()
    }

    /// Consume los eventos del nodo; cada evento se atiende en su propia tarea
    pub fn spawn_event_loop(&self, mut events: UnboundedReceiver<NodeEvent>) -> JoinHandle<()> {
        let scheduler = Arc::clone(&self.scheduler);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let scheduler = Arc::clone(&scheduler);
                tokio::spawn(async move { scheduler.handle_event(event).await });
            }
            warn!("Canal de eventos del nodo cerrado");
        })
    }

    pub async fn start_session(&self, guild_id: GuildId) -> RadioResult<()> {
        self.scheduler.start_session(guild_id).await
    }

    pub async fn stop_session(&self, guild_id: GuildId) -> RadioResult<()> {
        if !self.registry.is_active(guild_id) {
            return Err(RadioError::NotActive(guild_id));
        }
        self.scheduler.stop_session(guild_id).await
    }

    pub async fn stop_all_sessions(&self) {
        self.scheduler.stop_all_sessions().await;
    }

    pub fn is_active(&self, guild_id: GuildId) -> bool {
        self.registry.is_active(guild_id)
    }

    pub fn is_paused(&self, guild_id: GuildId) -> bool {
        self.registry.is_paused(guild_id)
    }

    pub fn session_state(&self, guild_id: GuildId) -> SessionState {
        self.registry.state(guild_id)
    }

    pub fn current_track(&self, guild_id: GuildId) -> Option<TrackInfo> {
        self.registry.current_track(guild_id)
    }

    pub fn active_guilds(&self) -> Vec<GuildId> {
        self.registry.active_guilds()
    }

    pub fn add_skip_vote(&self, guild_id: GuildId, user_id: UserId, total_members: usize) -> SkipTally {
        self.votes.add_vote(guild_id, user_id, total_members)
    }

    pub fn skip_votes(&self, guild_id: GuildId) -> usize {
        self.votes.current_votes(guild_id)
    }

    pub fn reset_votes(&self, guild_id: GuildId) {
        self.votes.reset_votes(guild_id);
    }

    /// Canal de voz que ocupa la radio en la guild
    pub fn channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.registry.channel(guild_id)
    }

    /// Humanos escuchando la radio en este momento.
    ///
    /// Si el recuento falla se asume un oyente.
    pub async fn listeners(&self, guild_id: GuildId) -> usize {
        let Some(channel_id) = self.registry.channel(guild_id) else {
            return 0;
        };

        match self.voice.humans_in_channel(guild_id, channel_id).await {
            Ok(humans) => humans,
            Err(e) => {
                warn!("No se pudo contar oyentes en guild {}: {:?}", guild_id, e);
                1
            }
        }
    }

    /// Registra un voto de salto con el recuento actual de oyentes y salta si
    /// hay mayoría
    pub fn vote_skip(&self, guild_id: GuildId, user_id: UserId, listeners: usize) -> RadioResult<SkipTally> {
        if !self.registry.is_active(guild_id) {
            return Err(RadioError::NotActive(guild_id));
        }

        let tally = self.add_skip_vote(guild_id, user_id, listeners);
        if tally.should_skip {
            self.skip(guild_id)?;
        }
        Ok(tally)
    }

    /// Salta a otra canción aleatoria
    pub fn skip(&self, guild_id: GuildId) -> RadioResult<()> {
        if !self.registry.is_active(guild_id) {
            return Err(RadioError::NotActive(guild_id));
        }

        info!("⏭️ Saltando canción en guild {}", guild_id);
        self.reset_votes(guild_id);
        self.scheduler
            .advance_after(guild_id, self.timings.skip_delay);
        Ok(())
    }

    pub fn relay(&self) -> &VoiceSignalRelay {
        &self.relay
    }

    /// Sale de todos los canales tras perder el nodo y avisa al bot
    async fn handle_permanent_disconnect(&self) {
        warn!("🔌 Lavalink perdido, cerrando todas las radios");
        self.scheduler.disconnect_all().await;

        if let Some(callback) = &self.on_permanent_disconnect {
            callback().await;
        }
    }
}
