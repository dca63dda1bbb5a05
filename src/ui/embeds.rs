use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::radio::{ConnectionHealth, SessionState, SkipTally, TrackInfo};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "📻 Garrix Radio 24/7";

fn base(title: String, description: String) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    base(format!("❌ {}", title), description.to_string()).color(colors::ERROR_RED)
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    base(format!("✅ {}", title), description.to_string()).color(colors::SUCCESS_GREEN)
}

/// Crea un embed de advertencia
pub fn create_warning_embed(title: &str, description: &str) -> CreateEmbed {
    base(format!("⚠️ {}", title), description.to_string()).color(colors::WARNING_ORANGE)
}

/// Canción que suena en la radio
pub fn create_now_playing_embed(
    track: &TrackInfo,
    state: SessionState,
    listeners: usize,
) -> CreateEmbed {
    let estado = match state {
        SessionState::Active => "🔴 En directo",
        SessionState::Paused => "⏸️ En pausa (sin oyentes)",
        SessionState::Inactive => "⏹️ Detenida",
    };

    base(
        "🎵 Reproduciendo Ahora".to_string(),
        format!("**{} - {}**", track.artist, track.title),
    )
    .color(colors::MUSIC_PURPLE)
    .field("📻 Estado", estado, true)
    .field("🎧 Oyentes", listeners.to_string(), true)
}

/// Resultado de un voto de salto
pub fn create_skip_vote_embed(tally: &SkipTally) -> CreateEmbed {
    if tally.should_skip {
        create_success_embed(
            "Canción saltada",
            &format!(
                "¡Votación aprobada! ({}/{} votos) Pasando a la siguiente canción...",
                tally.current_votes, tally.votes_needed
            ),
        )
    } else {
        base(
            "🗳️ Voto registrado".to_string(),
            format!(
                "Se necesitan {} votos para saltar (actualmente {}/{}).",
                tally.votes_needed, tally.current_votes, tally.votes_needed
            ),
        )
        .color(colors::INFO_BLUE)
    }
}

/// Estado de la conexión con Lavalink para el pie de `/radio start`
pub fn create_connection_embed(health: &ConnectionHealth) -> CreateEmbed {
    let mut embed = base(
        "🔌 Lavalink".to_string(),
        if health.connected {
            "Conectado".to_string()
        } else {
            "Desconectado".to_string()
        },
    )
    .color(if health.connected {
        colors::SUCCESS_GREEN
    } else {
        colors::ERROR_RED
    })
    .field(
        "Sondeos fallidos",
        health.consecutive_failures.to_string(),
        true,
    );

    if let Some(at) = health.last_failure_at {
        embed = embed.field("Último fallo", format!("<t:{}:R>", at.timestamp()), true);
    }

    embed
}
