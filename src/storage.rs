use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::{info, warn};

use crate::radio::{Catalog, ChannelDirectory, Song};

/// Configuración de servidor almacenada en JSON
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub guild_id: u64,
    #[serde(default)]
    pub radio_voice_channel: Option<u64>,
}

/// Manager de almacenamiento basado en archivos JSON
pub struct JsonStorage {
    data_dir: PathBuf,
    servers_cache: HashMap<u64, ServerConfig>,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        let servers_dir = data_dir.join("servers");
        fs::create_dir_all(&servers_dir)
            .await
            .with_context(|| format!("no se pudo crear {}", servers_dir.display()))?;

        info!("📁 Storage inicializado en: {}", data_dir.display());

        let mut storage = Self {
            data_dir,
            servers_cache: HashMap::new(),
        };

        storage.load_all_servers().await?;

        Ok(storage)
    }

    /// Obtiene la configuración de un servidor (la de por defecto si no existe)
    pub fn get_server_config(&self, guild_id: u64) -> ServerConfig {
        self.servers_cache
            .get(&guild_id)
            .cloned()
            .unwrap_or(ServerConfig {
                guild_id,
                ..ServerConfig::default()
            })
    }

    /// Actualiza la configuración de un servidor
    pub async fn update_server_config(&mut self, config: ServerConfig) -> Result<()> {
        let guild_id = config.guild_id;

        self.save_server_config(&config).await?;
        self.servers_cache.insert(guild_id, config);

        info!("💾 Configuración actualizada para guild {}", guild_id);
        Ok(())
    }

    /// Fija el canal de voz donde suena la radio
    pub async fn set_radio_channel(&mut self, guild_id: u64, channel_id: Option<u64>) -> Result<()> {
        let mut config = self.get_server_config(guild_id);
        config.radio_voice_channel = channel_id;
        self.update_server_config(config).await
    }

    pub fn radio_channel(&self, guild_id: u64) -> Option<u64> {
        self.servers_cache
            .get(&guild_id)
            .and_then(|config| config.radio_voice_channel)
    }

    async fn load_server_config(&self, guild_id: u64) -> Result<ServerConfig> {
        let file_path = self.get_server_file_path(guild_id);
        let content = fs::read_to_string(&file_path).await?;
        let config: ServerConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    async fn save_server_config(&self, config: &ServerConfig) -> Result<()> {
        let file_path = self.get_server_file_path(config.guild_id);
        let content = serde_json::to_string_pretty(config)?;
        fs::write(&file_path, content)
            .await
            .with_context(|| format!("no se pudo escribir {}", file_path.display()))?;
        Ok(())
    }

    async fn load_all_servers(&mut self) -> Result<()> {
        let servers_dir = self.data_dir.join("servers");

        let mut files = fs::read_dir(&servers_dir).await?;
        let mut loaded_count = 0;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();

            if path.extension().is_some_and(|ext| ext == "json") {
                let guild_id = path
                    .file_stem()
                    .and_then(|n| n.to_str())
                    .and_then(|name| name.strip_prefix("guild_"))
                    .and_then(|id| id.parse::<u64>().ok());

                if let Some(guild_id) = guild_id {
                    match self.load_server_config(guild_id).await {
                        Ok(config) => {
                            self.servers_cache.insert(guild_id, config);
                            loaded_count += 1;
                        }
                        Err(e) => {
                            warn!("Error cargando configuración para guild {}: {}", guild_id, e);
                        }
                    }
                }
            }
        }

        if loaded_count > 0 {
            info!("📂 Cargadas {} configuraciones de servidor", loaded_count);
        }

        Ok(())
    }

    fn get_server_file_path(&self, guild_id: u64) -> PathBuf {
        self.data_dir.join("servers").join(format!("guild_{}.json", guild_id))
    }
}

#[async_trait]
impl ChannelDirectory for Mutex<JsonStorage> {
    async fn radio_channel(&self, guild_id: GuildId) -> anyhow::Result<Option<ChannelId>> {
        Ok(self
            .lock()
            .await
            .radio_channel(guild_id.get())
            .map(ChannelId::new))
    }
}

/// Catálogo de canciones leído de `songs.json`
pub struct SongCatalog {
    songs: Vec<Song>,
}

impl SongCatalog {
    pub const FILE_NAME: &'static str = "songs.json";

    /// Carga el catálogo; si el archivo no existe queda vacío
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(Self::FILE_NAME);

        if !fs::try_exists(&path).await.unwrap_or(false) {
            warn!("⚠️ No existe {}, catálogo vacío", path.display());
            return Ok(Self { songs: Vec::new() });
        }

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("no se pudo leer {}", path.display()))?;
        let songs: Vec<Song> = serde_json::from_str(&content)
            .with_context(|| format!("catálogo inválido en {}", path.display()))?;

        info!("🎶 Catálogo cargado: {} canciones", songs.len());
        Ok(Self { songs })
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }
}

#[async_trait]
impl Catalog for SongCatalog {
    async fn pick_random_song(&self) -> anyhow::Result<Option<Song>> {
        Ok(self.songs.choose(&mut rand::thread_rng()).cloned())
    }
}
