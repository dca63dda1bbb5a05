use serenity::model::id::GuildId;
use thiserror::Error;

use crate::audio::node::NodeError;

/// Errores del orquestador de radio.
///
/// Los errores de conexión y de reproducción se recuperan dentro del
/// subsistema; solo las precondiciones (y el agotamiento de reintentos) llegan
/// a quien invoca la operación.
#[derive(Debug, Error)]
pub enum RadioError {
    #[error("el nodo de audio no está conectado")]
    NotConnected,

    #[error("no se pudo conectar al nodo de audio tras {attempts} intentos: {source}")]
    ConnectFailed {
        attempts: u32,
        #[source]
        source: NodeError,
    },

    #[error("no hay canal de radio configurado para la guild {0}")]
    NoRadioChannel(GuildId),

    #[error("la radio ya está activa en la guild {0}")]
    AlreadyActive(GuildId),

    #[error("la radio no está activa en la guild {0}")]
    NotActive(GuildId),

    #[error("el catálogo de canciones está vacío")]
    CatalogEmpty,

    #[error("no se encontró ninguna pista reproducible tras {attempts} intentos")]
    NoPlayableTrack { attempts: u32 },

    #[error("no se pudo entrar al canal de voz: {0}")]
    VoiceJoin(String),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type RadioResult<T> = std::result::Result<T, RadioError>;
