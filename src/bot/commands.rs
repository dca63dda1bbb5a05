use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{
        application::CommandOptionType, channel::ChannelType, id::GuildId,
    },
    prelude::Context,
};

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![radio_command()]
}

fn radio_command() -> CreateCommand {
    CreateCommand::new("radio")
        .description("Controla la radio 24/7 de Martin Garrix")
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "start",
            "Inicia la radio 24/7 en el canal configurado",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "stop",
            "Detiene la radio 24/7",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "nowplaying",
            "Muestra la canción que está sonando",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "skip",
            "Vota para saltar la canción (requiere más del 50% de votos)",
        ))
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "setchannel",
                "Configura el canal de voz de la radio",
            )
            .add_sub_option(
                CreateCommandOption::new(CommandOptionType::Channel, "channel", "Canal de voz")
                    .channel_types(vec![ChannelType::Voice, ChannelType::Stage])
                    .required(true),
            ),
        )
}
