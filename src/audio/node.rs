use async_trait::async_trait;
use serde::Deserialize;
use serenity::model::id::{ChannelId, GuildId};
use std::time::Duration;
use thiserror::Error;

/// Estado del enlace de control con el nodo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Connected,
    Disconnected,
}

/// Dirección del nodo ya normalizada (`host:puerto` sin esquema)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddress {
    pub authority: String,
    pub secure: bool,
}

impl NodeAddress {
    /// Quita cualquier prefijo `esquema://` y deduce si la conexión es segura.
    ///
    /// `https` y `wss` implican TLS; cualquier otro esquema (o ninguno) no.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let (secure, rest) = match raw.split_once("://") {
            Some((scheme, rest)) => {
                let scheme = scheme.to_ascii_lowercase();
                (scheme == "https" || scheme == "wss", rest)
            }
            None => (false, raw),
        };

        Self {
            authority: rest.trim_end_matches('/').to_string(),
            secure,
        }
    }

    pub fn websocket_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}/v4/websocket", scheme, self.authority)
    }

    pub fn rest_base(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.authority)
    }
}

/// Motivo por el que terminó una pista, tal como lo reporta el nodo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    /// `finished` y `loadFailed` permiten continuar con la siguiente pista;
    /// el resto son terminales (alguien reemplazó o detuvo la pista).
    pub fn may_start_next(self) -> bool {
        matches!(self, Self::Finished | Self::LoadFailed)
    }
}

/// Eventos del ciclo de vida de pistas emitidos por el nodo
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    TrackStarted {
        guild_id: GuildId,
        title: String,
        author: String,
    },
    TrackEnded {
        guild_id: GuildId,
        reason: TrackEndReason,
    },
    TrackException {
        guild_id: GuildId,
        severity: String,
        message: String,
    },
    TrackStuck {
        guild_id: GuildId,
        threshold: Duration,
    },
    ControlSocketClosed {
        guild_id: GuildId,
        code: u16,
        reason: String,
        by_remote: bool,
    },
    /// El nodo abrió una sesión nueva y el player de la guild ya no existe
    PlayerReset { guild_id: GuildId },
}

impl NodeEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::TrackStarted { guild_id, .. }
            | Self::TrackEnded { guild_id, .. }
            | Self::TrackException { guild_id, .. }
            | Self::TrackStuck { guild_id, .. }
            | Self::ControlSocketClosed { guild_id, .. }
            | Self::PlayerReset { guild_id } => *guild_id,
        }
    }
}

/// Pista que el nodo aceptó reproducir
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedTrack {
    pub title: String,
    pub author: String,
    /// `None` para streams en directo
    pub duration: Option<Duration>,
    pub uri: Option<String>,
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("no hay nodo de audio registrado")]
    NotPresent,

    #[error("el nodo no tiene sesión activa")]
    NoSession,

    #[error("tiempo de espera agotado: {0}")]
    Timeout(&'static str),

    #[error("sin resultados para: {0}")]
    NoMatches(String),

    #[error("error al cargar pista: {message} ({severity})")]
    LoadFailed { message: String, severity: String },

    #[error("protocolo: {0}")]
    Protocol(String),

    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Interfaz de control del nodo de audio externo.
///
/// El nodo decodifica y transmite el audio; aquí solo se le envían órdenes.
/// Los eventos de pistas llegan por el canal entregado al construir la
/// implementación concreta.
#[async_trait]
pub trait AudioNode: Send + Sync {
    async fn connect(&self, address: &NodeAddress, password: &str) -> Result<(), NodeError>;

    async fn status(&self) -> NodeStatus;

    /// `true` mientras haya un nodo registrado (aunque esté reconectando)
    fn is_present(&self) -> bool;

    /// Elimina el nodo y detiene cualquier reconexión del transporte
    async fn remove(&self);

    async fn load_and_play(&self, guild_id: GuildId, query: &str) -> Result<LoadedTrack, NodeError>;

    async fn stop(&self, guild_id: GuildId) -> Result<(), NodeError>;

    async fn on_voice_state_update(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        session_id: &str,
    );

    async fn on_voice_server_update(&self, guild_id: GuildId, token: &str, endpoint: &str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_address_normalization() {
        assert_eq!(
            NodeAddress::parse("https://lava.example.com:443"),
            NodeAddress {
                authority: "lava.example.com:443".to_string(),
                secure: true
            }
        );
        assert_eq!(
            NodeAddress::parse("http://localhost:2333/"),
            NodeAddress {
                authority: "localhost:2333".to_string(),
                secure: false
            }
        );
        assert_eq!(
            NodeAddress::parse("localhost:2333"),
            NodeAddress {
                authority: "localhost:2333".to_string(),
                secure: false
            }
        );
        assert!(NodeAddress::parse("WSS://node:2333").secure);
    }

    #[test]
    fn test_node_urls() {
        let address = NodeAddress::parse("https://node:2333");
        assert_eq!(address.websocket_url(), "wss://node:2333/v4/websocket");
        assert_eq!(address.rest_base(), "https://node:2333");
    }

    #[test]
    fn test_end_reason_continuation() {
        assert!(TrackEndReason::Finished.may_start_next());
        assert!(TrackEndReason::LoadFailed.may_start_next());
        assert!(!TrackEndReason::Stopped.may_start_next());
        assert!(!TrackEndReason::Replaced.may_start_next());
        assert!(!TrackEndReason::Cleanup.may_start_next());
    }
}
