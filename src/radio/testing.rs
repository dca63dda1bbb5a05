//! Dobles de prueba compartidos por los tests de la radio

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc::{self, UnboundedSender},
    time::{self, Instant},
};

use super::{
    connection::NodeSettings, registry::SessionRegistry, scheduler::TrackScheduler, Catalog,
    ChannelDirectory, DisconnectCallback, MockChannelDirectory, RadioDeps, RadioService,
    RadioTimings, Song, VoiceGateway,
};
use crate::audio::node::{AudioNode, LoadedTrack, NodeAddress, NodeError, NodeEvent, NodeStatus};

pub fn guild() -> GuildId {
    GuildId::new(100)
}

pub fn radio_channel() -> ChannelId {
    ChannelId::new(200)
}

/// Nodo en memoria que registra cada orden recibida
pub struct FakeNode {
    connect_fails: bool,
    present: AtomicBool,
    status: Mutex<NodeStatus>,
    connect_calls: Mutex<Vec<Instant>>,
    last_address: Mutex<Option<NodeAddress>>,
    removals: AtomicU32,
    plays: Mutex<Vec<(GuildId, String)>>,
    failing_plays: AtomicU32,
    play_delay: Mutex<Duration>,
    stops: Mutex<Vec<GuildId>>,
    voice_states: Mutex<Vec<(GuildId, Option<ChannelId>)>>,
    voice_servers: Mutex<Vec<(GuildId, String)>>,
}

impl FakeNode {
    pub fn new() -> Self {
        Self {
            connect_fails: false,
            present: AtomicBool::new(false),
            status: Mutex::new(NodeStatus::Connected),
            connect_calls: Mutex::new(Vec::new()),
            last_address: Mutex::new(None),
            removals: AtomicU32::new(0),
            plays: Mutex::new(Vec::new()),
            failing_plays: AtomicU32::new(0),
            play_delay: Mutex::new(Duration::ZERO),
            stops: Mutex::new(Vec::new()),
            voice_states: Mutex::new(Vec::new()),
            voice_servers: Mutex::new(Vec::new()),
        }
    }

    /// Nodo que rechaza todas las conexiones
    pub fn failing() -> Self {
        Self {
            connect_fails: true,
            ..Self::new()
        }
    }

    pub fn set_status(&self, status: NodeStatus) {
        *self.status.lock() = status;
    }

    pub fn fail_next_plays(&self, count: u32) {
        self.failing_plays.store(count, Ordering::SeqCst);
    }

    pub fn delay_plays(&self, delay: Duration) {
        *self.play_delay.lock() = delay;
    }

    pub fn connect_calls(&self) -> Vec<Instant> {
        self.connect_calls.lock().clone()
    }

    pub fn last_address(&self) -> Option<NodeAddress> {
        self.last_address.lock().clone()
    }

    pub fn removals(&self) -> u32 {
        self.removals.load(Ordering::SeqCst)
    }

    pub fn plays(&self) -> Vec<(GuildId, String)> {
        self.plays.lock().clone()
    }

    pub fn stops(&self) -> Vec<GuildId> {
        self.stops.lock().clone()
    }

    pub fn voice_states(&self) -> Vec<(GuildId, Option<ChannelId>)> {
        self.voice_states.lock().clone()
    }

    pub fn voice_servers(&self) -> Vec<(GuildId, String)> {
        self.voice_servers.lock().clone()
    }
}

#[async_trait]
impl AudioNode for FakeNode {
    async fn connect(&self, address: &NodeAddress, _password: &str) -> Result<(), NodeError> {
        self.connect_calls.lock().push(Instant::now());
        *self.last_address.lock() = Some(address.clone());

        if self.connect_fails {
            return Err(NodeError::Protocol("connection refused".to_string()));
        }
        self.present.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn status(&self) -> NodeStatus {
        if self.is_present() {
            *self.status.lock()
        } else {
            NodeStatus::Disconnected
        }
    }

    fn is_present(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    async fn remove(&self) {
        self.present.store(false, Ordering::SeqCst);
        self.removals.fetch_add(1, Ordering::SeqCst);
    }

    async fn load_and_play(&self, guild_id: GuildId, query: &str) -> Result<LoadedTrack, NodeError> {
        self.plays.lock().push((guild_id, query.to_string()));

        let delay = *self.play_delay.lock();
        if !delay.is_zero() {
            time::sleep(delay).await;
        }

        let failing = self
            .failing_plays
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(NodeError::NoMatches(query.to_string()));
        }

        Ok(LoadedTrack {
            title: query.to_string(),
            author: "fake".to_string(),
            duration: Some(Duration::from_secs(180)),
            uri: None,
        })
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), NodeError> {
        self.stops.lock().push(guild_id);
        Ok(())
    }

    async fn on_voice_state_update(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        _session_id: &str,
    ) {
        self.voice_states.lock().push((guild_id, channel_id));
    }

    async fn on_voice_server_update(&self, guild_id: GuildId, _token: &str, endpoint: &str) {
        self.voice_servers.lock().push((guild_id, endpoint.to_string()));
    }
}

/// Gateway de voz en memoria
pub struct FakeVoice {
    joins: Mutex<Vec<(GuildId, ChannelId)>>,
    leaves: Mutex<Vec<GuildId>>,
    statuses: Mutex<Vec<(ChannelId, String)>>,
    bots: Mutex<HashSet<UserId>>,
    humans: AtomicUsize,
    join_fails: AtomicBool,
    lookup_fails: AtomicBool,
    headcount_fails: AtomicBool,
}

impl FakeVoice {
    pub fn new() -> Self {
        Self {
            joins: Mutex::new(Vec::new()),
            leaves: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
            bots: Mutex::new(HashSet::new()),
            humans: AtomicUsize::new(1),
            join_fails: AtomicBool::new(false),
            lookup_fails: AtomicBool::new(false),
            headcount_fails: AtomicBool::new(false),
        }
    }

    pub fn set_humans(&self, humans: usize) {
        self.humans.store(humans, Ordering::SeqCst);
    }

    pub fn mark_bot(&self, user_id: UserId) {
        self.bots.lock().insert(user_id);
    }

    pub fn fail_joins(&self) {
        self.join_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_lookups(&self) {
        self.lookup_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_headcounts(&self) {
        self.headcount_fails.store(true, Ordering::SeqCst);
    }

    pub fn joins(&self) -> Vec<(GuildId, ChannelId)> {
        self.joins.lock().clone()
    }

    pub fn leaves(&self) -> Vec<GuildId> {
        self.leaves.lock().clone()
    }

    pub fn statuses(&self) -> Vec<(ChannelId, String)> {
        self.statuses.lock().clone()
    }
}

#[async_trait]
impl VoiceGateway for FakeVoice {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> anyhow::Result<()> {
        if self.join_fails.load(Ordering::SeqCst) {
            anyhow::bail!("sin permisos para conectar");
        }
        self.joins.lock().push((guild_id, channel_id));
        Ok(())
    }

    async fn leave(&self, guild_id: GuildId) -> anyhow::Result<()> {
        self.leaves.lock().push(guild_id);
        Ok(())
    }

    async fn is_human(&self, _guild_id: GuildId, user_id: UserId) -> anyhow::Result<bool> {
        if self.lookup_fails.load(Ordering::SeqCst) {
            anyhow::bail!("miembro no encontrado");
        }
        Ok(!self.bots.lock().contains(&user_id))
    }

    async fn humans_in_channel(
        &self,
        _guild_id: GuildId,
        _channel_id: ChannelId,
    ) -> anyhow::Result<usize> {
        if self.headcount_fails.load(Ordering::SeqCst) {
            anyhow::bail!("guild fuera de caché");
        }
        Ok(self.humans.load(Ordering::SeqCst))
    }

    async fn set_channel_status(&self, channel_id: ChannelId, status: &str) -> anyhow::Result<()> {
        self.statuses.lock().push((channel_id, status.to_string()));
        Ok(())
    }
}

/// Catálogo que rota por sus canciones en orden
pub struct FakeCatalog {
    songs: Vec<Song>,
    next: AtomicUsize,
}

impl FakeCatalog {
    pub fn new(songs: Vec<Song>) -> Self {
        Self {
            songs,
            next: AtomicUsize::new(0),
        }
    }

    pub fn garrix() -> Self {
        let songs = [
            "Animals",
            "In the Name of Love",
            "Scared to be Lonely",
            "High on Life",
        ]
        .into_iter()
        .zip(1..)
        .map(|(title, id)| Song {
            id,
            artist: "Martin Garrix".to_string(),
            title: title.to_string(),
        })
        .collect();
        Self::new(songs)
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn pick_random_song(&self) -> anyhow::Result<Option<Song>> {
        if self.songs.is_empty() {
            return Ok(None);
        }
        let index = self.next.fetch_add(1, Ordering::SeqCst) % self.songs.len();
        Ok(Some(self.songs[index].clone()))
    }
}

/// Servicio completo montado sobre los dobles de prueba
pub struct Harness {
    pub service: Arc<RadioService>,
    pub node: Arc<FakeNode>,
    pub voice: Arc<FakeVoice>,
    events: UnboundedSender<NodeEvent>,
}

impl Harness {
    pub async fn connected() -> Self {
        Self::assemble(
            Arc::new(FakeCatalog::garrix()),
            Self::fixed_directory(),
            None,
            true,
        )
        .await
    }

    pub async fn disconnected() -> Self {
        Self::assemble(
            Arc::new(FakeCatalog::garrix()),
            Self::fixed_directory(),
            None,
            false,
        )
        .await
    }

    pub async fn build(catalog: Arc<dyn Catalog>, directory: Arc<dyn ChannelDirectory>) -> Self {
        Self::assemble(catalog, directory, None, true).await
    }

    pub async fn with_callback(callback: DisconnectCallback) -> Self {
        Self::assemble(
            Arc::new(FakeCatalog::garrix()),
            Self::fixed_directory(),
            Some(callback),
            true,
        )
        .await
    }

    pub fn fixed_directory() -> Arc<dyn ChannelDirectory> {
        let mut directory = MockChannelDirectory::new();
        directory
            .expect_radio_channel()
            .returning(|_| Ok(Some(radio_channel())));
        Arc::new(directory)
    }

    async fn assemble(
        catalog: Arc<dyn Catalog>,
        directory: Arc<dyn ChannelDirectory>,
        on_permanent_disconnect: Option<DisconnectCallback>,
        connect: bool,
    ) -> Self {
        let node = Arc::new(FakeNode::new());
        let voice = Arc::new(FakeVoice::new());
        let (events, receiver) = mpsc::unbounded_channel();

        let service = RadioService::new(RadioDeps {
            node: node.clone(),
            catalog,
            directory,
            voice: voice.clone(),
            bot_user_id: UserId::new(1),
            node_settings: NodeSettings {
                url: "http://lavalink:2333".to_string(),
                password: "youshallnotpass".to_string(),
                max_consecutive_failures: 10,
            },
            timings: RadioTimings::default(),
            on_permanent_disconnect,
        });
        service.spawn_event_loop(receiver);

        if connect {
            service.connect().await.expect("conexión con el nodo falso");
        }

        Self {
            service,
            node,
            voice,
            events,
        }
    }

    pub fn emit(&self, event: NodeEvent) {
        self.events.send(event).expect("bucle de eventos vivo");
    }

    /// Deja correr las tareas en segundo plano (reintentos y reconexiones incluidos)
    pub async fn settle(&self) {
        time::sleep(Duration::from_secs(10)).await;
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.service.registry
    }

    pub fn scheduler(&self) -> &Arc<TrackScheduler> {
        &self.service.scheduler
    }
}
