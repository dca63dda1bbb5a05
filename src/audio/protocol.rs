//! Modelos del protocolo Lavalink v4 (WebSocket + REST).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serenity::model::id::GuildId;
use std::time::Duration;

use super::node::{NodeEvent, TrackEndReason};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LavalinkTrack {
    pub encoded: String,
    pub info: LavalinkTrackInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LavalinkTrackInfo {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub is_stream: bool,
    #[serde(default)]
    pub uri: Option<String>,
}

impl LavalinkTrackInfo {
    pub fn duration(&self) -> Option<Duration> {
        (!self.is_stream).then(|| Duration::from_millis(self.length))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Playlist {
    pub tracks: Vec<LavalinkTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LavalinkException {
    pub message: Option<String>,
    pub severity: String,
    #[serde(default)]
    pub cause: Option<String>,
}

impl LavalinkException {
    /// Mensaje con la causa, si el nodo la envía
    pub fn describe(&self) -> String {
        let message = self.message.as_deref().unwrap_or("error desconocido");
        match &self.cause {
            Some(cause) => format!("{} (causa: {})", message, cause),
            None => message.to_string(),
        }
    }
}

/// Respuesta de `GET /v4/loadtracks`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "loadType", content = "data", rename_all = "camelCase")]
pub enum LoadResult {
    Track(LavalinkTrack),
    Playlist(Playlist),
    Search(Vec<LavalinkTrack>),
    Empty(Value),
    Error(LavalinkException),
}

/// Cuerpo de `PATCH /v4/sessions/{sessionId}/players/{guildId}`
#[derive(Debug, Default, Serialize)]
pub struct PlayerUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<TrackUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceUpdate>,
}

#[derive(Debug, Serialize)]
pub struct TrackUpdate {
    /// `None` se serializa como `null` y detiene la pista actual
    pub encoded: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceUpdate {
    pub token: String,
    pub endpoint: String,
    pub session_id: String,
}

/// Mensaje entrante del WebSocket ya interpretado
#[derive(Debug)]
pub enum Incoming {
    Ready { session_id: String, resumed: bool },
    Event(NodeEvent),
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum EventPayload {
    #[serde(rename = "TrackStartEvent")]
    TrackStart {
        #[serde(rename = "guildId")]
        guild_id: String,
        track: LavalinkTrack,
    },
    #[serde(rename = "TrackEndEvent")]
    TrackEnd {
        #[serde(rename = "guildId")]
        guild_id: String,
        reason: TrackEndReason,
    },
    #[serde(rename = "TrackExceptionEvent")]
    TrackException {
        #[serde(rename = "guildId")]
        guild_id: String,
        exception: LavalinkException,
    },
    #[serde(rename = "TrackStuckEvent")]
    TrackStuck {
        #[serde(rename = "guildId")]
        guild_id: String,
        #[serde(rename = "thresholdMs")]
        threshold_ms: u64,
    },
    #[serde(rename = "WebSocketClosedEvent")]
    WebSocketClosed {
        #[serde(rename = "guildId")]
        guild_id: String,
        code: u16,
        reason: String,
        #[serde(rename = "byRemote")]
        by_remote: bool,
    },
    #[serde(other)]
    Unknown,
}

fn parse_guild(raw: &str) -> Option<GuildId> {
    raw.parse::<u64>().ok().filter(|id| *id != 0).map(GuildId::new)
}

impl EventPayload {
    fn into_node_event(self) -> Option<NodeEvent> {
        let event = match self {
            Self::TrackStart { guild_id, track } => NodeEvent::TrackStarted {
                guild_id: parse_guild(&guild_id)?,
                title: track.info.title,
                author: track.info.author,
            },
            Self::TrackEnd { guild_id, reason } => NodeEvent::TrackEnded {
                guild_id: parse_guild(&guild_id)?,
                reason,
            },
            Self::TrackException {
                guild_id,
                exception,
            } => NodeEvent::TrackException {
                guild_id: parse_guild(&guild_id)?,
                message: exception.describe(),
                severity: exception.severity,
            },
            Self::TrackStuck {
                guild_id,
                threshold_ms,
            } => NodeEvent::TrackStuck {
                guild_id: parse_guild(&guild_id)?,
                threshold: Duration::from_millis(threshold_ms),
            },
            Self::WebSocketClosed {
                guild_id,
                code,
                reason,
                by_remote,
            } => NodeEvent::ControlSocketClosed {
                guild_id: parse_guild(&guild_id)?,
                code,
                reason,
                by_remote,
            },
            Self::Unknown => return None,
        };
        Some(event)
    }
}

/// Interpreta un frame de texto del WebSocket del nodo.
///
/// `playerUpdate`, `stats` y los eventos desconocidos se reportan como
/// [`Incoming::Other`].
pub fn parse_incoming(text: &str) -> Result<Incoming, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;

    match value.get("op").and_then(Value::as_str) {
        Some("ready") => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct Ready {
                session_id: String,
                #[serde(default)]
                resumed: bool,
            }

            let ready: Ready = serde_json::from_value(value)?;
            Ok(Incoming::Ready {
                session_id: ready.session_id,
                resumed: ready.resumed,
            })
        }
        Some("event") => {
            let payload: EventPayload = serde_json::from_value(value)?;
            Ok(payload
                .into_node_event()
                .map(Incoming::Event)
                .unwrap_or(Incoming::Other))
        }
        _ => Ok(Incoming::Other),
    }
}
