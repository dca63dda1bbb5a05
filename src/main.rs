use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod radio;
mod storage;
mod ui;

use crate::audio::lavalink_client::LavalinkClient;
use crate::bot::{voice::DiscordVoice, RadioBot};
use crate::config::Config;
use crate::radio::{NodeSettings, RadioDeps, RadioService, RadioTimings};
use crate::storage::{JsonStorage, SongCatalog};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("garrix_radio=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("📻 Iniciando Garrix Radio v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("{}", config.summary());

    // Inicializar almacenamiento JSON
    let storage = Arc::new(tokio::sync::Mutex::new(
        JsonStorage::new(config.data_dir.clone()).await?,
    ));

    let catalog = SongCatalog::load(&config.data_dir).await?;
    if catalog.is_empty() {
        warn!("⚠️ Catálogo vacío: la radio no podrá reproducir nada");
    }

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = RadioBot::new(config.clone(), storage.clone());

    // Songbird solo gestiona la señalización de voz; el audio lo emite Lavalink
    let songbird = Songbird::serenity();
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird.clone())
        .await?;

    let user_id = client.http.get_current_user().await?.id;

    info!("🎼 Inicializando Lavalink...");
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let node = Arc::new(LavalinkClient::new(user_id, events_tx));

    let voice = Arc::new(DiscordVoice::new(
        songbird,
        client.http.clone(),
        client.cache.clone(),
        &config.discord_token,
    ));

    let radio = RadioService::new(RadioDeps {
        node,
        catalog: Arc::new(catalog),
        directory: storage,
        voice,
        bot_user_id: user_id,
        node_settings: NodeSettings {
            url: config.lavalink_url.clone(),
            password: config.lavalink_password.clone(),
            max_consecutive_failures: config.lavalink_max_failures,
        },
        timings: RadioTimings::default(),
        on_permanent_disconnect: None,
    });
    radio.spawn_event_loop(events_rx);

    match radio.connect().await {
        Ok(()) => info!("✅ Lavalink inicializado exitosamente"),
        Err(e) => {
            error!("❌ Error al inicializar Lavalink: {}", e);
            info!("🔄 Continuando sin Lavalink; /radio start reintentará la conexión");
        }
    }

    {
        let mut data = client.data.write().await;
        data.insert::<RadioService>(radio.clone());
    }

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        radio.stop_all_sessions().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
