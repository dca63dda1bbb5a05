use anyhow::Result;
use serenity::{
    all::{ResolvedOption, ResolvedValue},
    builder::{CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    bot::RadioBot,
    error::RadioError,
    radio::RadioService,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &RadioBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    if command.data.name != "radio" {
        return respond(
            ctx,
            &command,
            embeds::create_error_embed("Comando no reconocido", "Usa `/radio`."),
            true,
        )
        .await;
    }

    let options = command.data.options();
    let Some(ResolvedOption {
        name: subcommand,
        value: ResolvedValue::SubCommand(sub_options),
        ..
    }) = options.first()
    else {
        anyhow::bail!("/radio sin subcomando");
    };

    info!(
        "📝 Comando /radio {} usado por {} en guild {}",
        subcommand, command.user.name, guild_id
    );

    if *subcommand == "setchannel" {
        let channel_id = sub_options.iter().find_map(|option| match option.value {
            ResolvedValue::Channel(channel) if option.name == "channel" => Some(channel.id),
            _ => None,
        });
        return handle_setchannel(ctx, &command, bot, guild_id, channel_id).await;
    }

    let Some(radio) = bot.radio(ctx).await else {
        return respond(
            ctx,
            &command,
            embeds::create_error_embed(
                "Radio no disponible",
                "El subsistema de radio no está inicializado.",
            ),
            true,
        )
        .await;
    };

    match *subcommand {
        "start" => handle_start(ctx, &command, &radio, guild_id).await,
        "stop" => handle_stop(ctx, &command, &radio, guild_id).await,
        "nowplaying" => handle_nowplaying(ctx, &command, &radio, guild_id).await,
        "skip" => handle_skip(ctx, &command, &radio, guild_id).await,
        _ => {
            respond(
                ctx,
                &command,
                embeds::create_error_embed("Subcomando desconocido", subcommand),
                true,
            )
            .await
        }
    }
}

async fn handle_start(
    ctx: &Context,
    command: &CommandInteraction,
    radio: &Arc<RadioService>,
    guild_id: GuildId,
) -> Result<()> {
    // Entrar al canal y cargar la primera pista puede tardar
    command.defer(&ctx.http).await?;

    let embed = match radio.start_session(guild_id).await {
        Ok(()) => embeds::create_success_embed(
            "Radio iniciada",
            "¡La radio 24/7 de Martin Garrix está en marcha!",
        ),
        Err(RadioError::AlreadyActive(_)) => embeds::create_warning_embed(
            "Radio ya activa",
            "La radio 24/7 ya está sonando en este servidor.",
        ),
        Err(RadioError::NoRadioChannel(_)) => embeds::create_warning_embed(
            "Sin canal de radio",
            "Configura primero el canal con `/radio setchannel`.",
        ),
        Err(e @ RadioError::ConnectFailed { .. }) => {
            warn!("No se pudo iniciar la radio en guild {}: {}", guild_id, e);
            command
                .edit_response(
                    &ctx.http,
                    EditInteractionResponse::new()
                        .embed(embeds::create_error_embed(
                            "No se pudo iniciar la radio",
                            &format!("Error: {}", e),
                        ))
                        .embed(embeds::create_connection_embed(&radio.connection_health())),
                )
                .await?;
            return Ok(());
        }
        Err(e) => {
            warn!("No se pudo iniciar la radio en guild {}: {}", guild_id, e);
            embeds::create_error_embed("No se pudo iniciar la radio", &format!("Error: {}", e))
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    radio: &Arc<RadioService>,
    guild_id: GuildId,
) -> Result<()> {
    command.defer(&ctx.http).await?;

    let embed = match radio.stop_session(guild_id).await {
        Ok(()) => embeds::create_success_embed("Radio detenida", "La radio 24/7 se ha detenido."),
        Err(RadioError::NotActive(_)) => embeds::create_warning_embed(
            "Radio no activa",
            "La radio 24/7 no está sonando en este servidor.",
        ),
        Err(e) => {
            warn!("No se pudo detener la radio en guild {}: {}", guild_id, e);
            embeds::create_error_embed("No se pudo detener la radio", &format!("Error: {}", e))
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    radio: &Arc<RadioService>,
    guild_id: GuildId,
) -> Result<()> {
    if !radio.is_active(guild_id) {
        return respond(ctx, command, not_active_embed(), true).await;
    }

    let Some(track) = radio.current_track(guild_id) else {
        return respond(
            ctx,
            command,
            embeds::create_warning_embed("Sin pista", "No hay información de la pista actual."),
            true,
        )
        .await;
    };

    let listeners = radio.listeners(guild_id).await;
    let embed = embeds::create_now_playing_embed(&track, radio.session_state(guild_id), listeners);
    respond(ctx, command, embed, false).await
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    radio: &Arc<RadioService>,
    guild_id: GuildId,
) -> Result<()> {
    if !radio.is_active(guild_id) {
        return respond(ctx, command, not_active_embed(), true).await;
    }

    if radio.is_paused(guild_id) {
        return respond(
            ctx,
            command,
            embeds::create_warning_embed(
                "Radio en pausa",
                "No hay nada que saltar: la radio vuelve a sonar cuando entra un oyente.",
            ),
            true,
        )
        .await;
    }

    let Some(radio_channel) = radio.channel(guild_id) else {
        return respond(
            ctx,
            command,
            embeds::create_error_embed("Error", "No se encontró el canal de la radio."),
            true,
        )
        .await;
    };

    if user_voice_channel(ctx, guild_id, command.user.id) != Some(radio_channel) {
        return respond(
            ctx,
            command,
            embeds::create_error_embed(
                "Canal de voz incorrecto",
                "Debes estar en el mismo canal de voz que la radio para votar.",
            ),
            true,
        )
        .await;
    }

    let listeners = radio.listeners(guild_id).await;
    if listeners == 0 {
        return respond(
            ctx,
            command,
            embeds::create_error_embed("Error", "No hay oyentes en el canal de voz."),
            true,
        )
        .await;
    }

    match radio.vote_skip(guild_id, command.user.id, listeners) {
        Ok(tally) => respond(ctx, command, embeds::create_skip_vote_embed(&tally), false).await,
        Err(RadioError::NotActive(_)) => respond(ctx, command, not_active_embed(), true).await,
        Err(e) => Err(e.into()),
    }
}

async fn handle_setchannel(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &RadioBot,
    guild_id: GuildId,
    channel_id: Option<ChannelId>,
) -> Result<()> {
    let Some(channel_id) = channel_id else {
        anyhow::bail!("/radio setchannel sin canal");
    };

    bot.storage
        .lock()
        .await
        .set_radio_channel(guild_id.get(), Some(channel_id.get()))
        .await?;

    respond(
        ctx,
        command,
        embeds::create_success_embed(
            "Canal configurado",
            &format!("La radio sonará en <#{}>.", channel_id),
        ),
        true,
    )
    .await
}

/// Canal de voz del usuario según la caché
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    ctx.cache
        .guild(guild_id)?
        .voice_states
        .get(&user_id)
        .and_then(|state| state.channel_id)
}

fn not_active_embed() -> CreateEmbed {
    embeds::create_warning_embed(
        "Radio no activa",
        "La radio 24/7 no está sonando en este servidor.",
    )
}

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}
