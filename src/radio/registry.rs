use parking_lot::RwLock;
use serenity::model::id::{ChannelId, GuildId};
use std::collections::HashMap;

/// Canción que se está reproduciendo (o a punto de reproducirse) en una guild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub song_id: i64,
    pub artist: String,
    pub title: String,
}

impl TrackInfo {
    /// Texto para el estado del canal de voz
    pub fn status_text(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    Active,
    Paused,
}

#[derive(Debug, Default)]
struct RadioSession {
    active: bool,
    paused: bool,
    current_track: Option<TrackInfo>,
    channel_id: Option<ChannelId>,
    generation: u64,
}

/// Estado de radio por guild.
///
/// Un único `RwLock` cubre todo el mapa y nunca se mantiene a través de un
/// `.await`. Las entradas se crean al primer uso y no se eliminan.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<GuildId, RadioSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activa o desactiva la sesión. Cada transición incrementa la generación
    /// y limpia la pausa.
    pub fn set_active(&self, guild_id: GuildId, active: bool) {
        let mut sessions = self.sessions.write();
        let session = sessions.entry(guild_id).or_default();
        if session.active != active {
            session.generation = session.generation.wrapping_add(1);
        }
        session.active = active;
        session.paused = false;
    }

    pub fn is_active(&self, guild_id: GuildId) -> bool {
        self.sessions
            .read()
            .get(&guild_id)
            .is_some_and(|session| session.active)
    }

    pub fn is_paused(&self, guild_id: GuildId) -> bool {
        self.sessions
            .read()
            .get(&guild_id)
            .is_some_and(|session| session.paused)
    }

    /// Pasa de `Active` a `Paused`; `false` si la sesión no estaba sonando.
    ///
    /// Pausar y reanudar también incrementan la generación: un `play_next`
    /// anterior a la pausa no debe sobrevivir a la reanudación.
    pub fn pause_if_playing(&self, guild_id: GuildId) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(&guild_id) {
            Some(session) if session.active && !session.paused => {
                session.paused = true;
                session.generation = session.generation.wrapping_add(1);
                true
            }
            _ => false,
        }
    }

    /// Pasa de `Paused` a `Active`; `false` si otro evento ya la reanudó
    pub fn resume_if_paused(&self, guild_id: GuildId) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(&guild_id) {
            Some(session) if session.active && session.paused => {
                session.paused = false;
                session.generation = session.generation.wrapping_add(1);
                true
            }
            _ => false,
        }
    }

    pub fn state(&self, guild_id: GuildId) -> SessionState {
        match self.sessions.read().get(&guild_id) {
            Some(session) if session.active && session.paused => SessionState::Paused,
            Some(session) if session.active => SessionState::Active,
            _ => SessionState::Inactive,
        }
    }

    pub fn set_current_track(&self, guild_id: GuildId, song_id: i64, artist: &str, title: &str) {
        self.sessions.write().entry(guild_id).or_default().current_track = Some(TrackInfo {
            song_id,
            artist: artist.to_string(),
            title: title.to_string(),
        });
    }

    pub fn current_track(&self, guild_id: GuildId) -> Option<TrackInfo> {
        self.sessions
            .read()
            .get(&guild_id)
            .and_then(|session| session.current_track.clone())
    }

    pub fn clear_current_track(&self, guild_id: GuildId) {
        if let Some(session) = self.sessions.write().get_mut(&guild_id) {
            session.current_track = None;
        }
    }

    /// Canal de voz que ocupa el bot en la guild
    pub fn set_channel(&self, guild_id: GuildId, channel_id: Option<ChannelId>) {
        self.sessions.write().entry(guild_id).or_default().channel_id = channel_id;
    }

    pub fn channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.sessions
            .read()
            .get(&guild_id)
            .and_then(|session| session.channel_id)
    }

    pub fn generation(&self, guild_id: GuildId) -> u64 {
        self.sessions
            .read()
            .get(&guild_id)
            .map_or(0, |session| session.generation)
    }

    /// `true` si la sesión sigue activa, sin pausa y en la misma generación
    pub fn is_current(&self, guild_id: GuildId, generation: u64) -> bool {
        self.sessions.read().get(&guild_id).is_some_and(|session| {
            session.active && !session.paused && session.generation == generation
        })
    }

    pub fn active_guilds(&self) -> Vec<GuildId> {
        self.sessions
            .read()
            .iter()
            .filter(|(_, session)| session.active)
            .map(|(guild_id, _)| *guild_id)
            .collect()
    }
}
