use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::RwLock;
use reqwest::{header::AUTHORIZATION, Method};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{net::TcpStream, sync::mpsc::UnboundedSender};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    node::{AudioNode, LoadedTrack, NodeAddress, NodeError, NodeEvent, NodeStatus},
    protocol::{self, Incoming, LavalinkTrack, LoadResult, PlayerUpdate, TrackUpdate, VoiceUpdate},
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type VoiceBuffer = Arc<DashMap<GuildId, PendingVoice>>;

const CLIENT_NAME: &str = concat!("garrix-radio/", env!("CARGO_PKG_VERSION"));
const REST_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const BACKOFF_BASE_MS: u64 = 1_000;

/// Cliente de control para un único nodo Lavalink v4.
///
/// Mantiene el WebSocket de eventos (con reconexión propia hasta que se llame
/// a [`AudioNode::remove`]) y habla REST para cargar pistas y actualizar
/// players. Los eventos de pistas se reenvían por `events`.
pub struct LavalinkClient {
    user_id: UserId,
    http: reqwest::Client,
    events: UnboundedSender<NodeEvent>,
    link: RwLock<Option<Arc<NodeLink>>>,
    voice: VoiceBuffer,
}

/// Estado compartido entre el cliente y la tarea que supervisa el socket
struct NodeLink {
    address: NodeAddress,
    password: String,
    session_id: RwLock<Option<String>>,
    connected: AtomicBool,
    shutdown: CancellationToken,
}

/// Datos de voz a medio reunir: el session id llega por voice-state y el
/// token/endpoint por voice-server, en cualquier orden.
#[derive(Debug, Default, Clone)]
struct PendingVoice {
    channel_id: Option<ChannelId>,
    session_id: Option<String>,
    token: Option<String>,
    endpoint: Option<String>,
}

impl PendingVoice {
    fn complete(&self) -> Option<VoiceUpdate> {
        Some(VoiceUpdate {
            token: self.token.clone()?,
            endpoint: self.endpoint.clone()?,
            session_id: self.session_id.clone()?,
        })
    }
}

/// Backoff exponencial con tope para reconectar el socket
struct Backoff {
    attempt: u32,
}

impl Backoff {
    fn new() -> Self {
        Self { attempt: 0 }
    }

    fn next(&mut self) -> Duration {
        self.attempt += 1;
        let delay = BACKOFF_BASE_MS * 2u64.pow((self.attempt - 1).min(3));
        Duration::from_millis(delay)
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl LavalinkClient {
    pub fn new(user_id: UserId, events: UnboundedSender<NodeEvent>) -> Self {
        Self {
            user_id,
            http: reqwest::Client::new(),
            events,
            link: RwLock::new(None),
            voice: Arc::new(DashMap::new()),
        }
    }

    fn current_link(&self) -> Result<Arc<NodeLink>, NodeError> {
        self.link.read().clone().ok_or(NodeError::NotPresent)
    }

    async fn update_player(
        &self,
        guild_id: GuildId,
        update: &PlayerUpdate,
    ) -> Result<(), NodeError> {
        let link = self.current_link()?;
        patch_player(&self.http, &link, guild_id, update).await
    }

    async fn destroy_player(&self, guild_id: GuildId) -> Result<(), NodeError> {
        let link = self.current_link()?;
        let url = player_url(&link, guild_id)?;

        self.http
            .request(Method::DELETE, url)
            .header(AUTHORIZATION, &link.password)
            .timeout(REST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn load_tracks(&self, query: &str) -> Result<LavalinkTrack, NodeError> {
        let link = self.current_link()?;
        let url = format!("{}/v4/loadtracks", link.address.rest_base());

        let result: LoadResult = self
            .http
            .get(url)
            .query(&[("identifier", query)])
            .header(AUTHORIZATION, &link.password)
            .timeout(REST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let track = match result {
            LoadResult::Track(track) => Some(track),
            LoadResult::Playlist(playlist) => playlist.tracks.into_iter().next(),
            LoadResult::Search(tracks) => tracks.into_iter().next(),
            LoadResult::Empty(_) => None,
            LoadResult::Error(exception) => {
                return Err(NodeError::LoadFailed {
                    message: exception.describe(),
                    severity: exception.severity,
                });
            }
        };

        track
            .filter(|track| !track.info.title.is_empty())
            .ok_or_else(|| NodeError::NoMatches(query.to_string()))
    }

    /// Envía la actualización de voz si ya están las tres piezas
    async fn flush_voice(&self, guild_id: GuildId) {
        let (channel_id, update) = match self
            .voice
            .get(&guild_id)
            .and_then(|pending| Some((pending.channel_id, pending.complete()?)))
        {
            Some(ready) => ready,
            None => return,
        };

        let body = PlayerUpdate {
            track: None,
            voice: Some(update),
        };

        match self.update_player(guild_id, &body).await {
            Ok(()) => debug!(
                "🎙️ Datos de voz enviados al nodo para guild {} (canal {:?})",
                guild_id, channel_id
            ),
            Err(e) => warn!("Error enviando datos de voz al nodo para guild {}: {:?}", guild_id, e),
        }
    }
}

fn player_url(link: &NodeLink, guild_id: GuildId) -> Result<String, NodeError> {
    let session_id = link.session_id.read().clone().ok_or(NodeError::NoSession)?;
    Ok(format!(
        "{}/v4/sessions/{}/players/{}",
        link.address.rest_base(),
        session_id,
        guild_id
    ))
}

async fn patch_player(
    http: &reqwest::Client,
    link: &NodeLink,
    guild_id: GuildId,
    update: &PlayerUpdate,
) -> Result<(), NodeError> {
    let url = player_url(link, guild_id)?;

    http.patch(url)
        .query(&[("noReplace", "false")])
        .header(AUTHORIZATION, &link.password)
        .timeout(REST_TIMEOUT)
        .json(update)
        .send()
        .await?
        .error_for_status()?;

    Ok(())
}

/// Abre el WebSocket y espera el op `ready`: devuelve el session id y si el
/// nodo reanudó la sesión anterior
async fn open_socket(
    address: &NodeAddress,
    password: &str,
    user_id: UserId,
) -> Result<(Socket, String, bool), NodeError> {
    let mut request = address.websocket_url().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(
        "Authorization",
        HeaderValue::from_str(password).map_err(|e| NodeError::Protocol(e.to_string()))?,
    );
    headers.insert("User-Id", HeaderValue::from(user_id.get()));
    headers.insert("Client-Name", HeaderValue::from_static(CLIENT_NAME));

    let (mut socket, _) = connect_async(request).await?;

    while let Some(message) = socket.next().await {
        match message? {
            Message::Text(text) => {
                if let Ok(Incoming::Ready {
                    session_id,
                    resumed,
                }) = protocol::parse_incoming(text.as_str())
                {
                    debug!("Sesión Lavalink {} (resumed={})", session_id, resumed);
                    return Ok((socket, session_id, resumed));
                }
            }
            Message::Close(frame) => {
                return Err(NodeError::Protocol(format!(
                    "socket cerrado antes de ready: {:?}",
                    frame
                )));
            }
            _ => {}
        }
    }

    Err(NodeError::Protocol("socket cerrado antes de ready".to_string()))
}

/// Lee frames hasta que el socket se cierre o falle
async fn pump(socket: &mut Socket, link: &NodeLink, events: &UnboundedSender<NodeEvent>) {
    while let Some(message) = socket.next().await {
        match message {
            Ok(Message::Text(text)) => match protocol::parse_incoming(text.as_str()) {
                Ok(Incoming::Event(event)) => {
                    if events.send(event).is_err() {
                        warn!("Nadie escucha los eventos del nodo");
                    }
                }
                Ok(Incoming::Ready { session_id, .. }) => {
                    *link.session_id.write() = Some(session_id);
                }
                Ok(Incoming::Other) => {}
                Err(e) => debug!("Frame de Lavalink no reconocido: {}", e),
            },
            Ok(Message::Close(frame)) => {
                warn!("🔌 Lavalink cerró el socket: {:?}", frame);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("🔌 Error en el socket de Lavalink: {}", e);
                return;
            }
        }
    }
}

/// Una sesión nueva no conserva players: reenvía los datos de voz de cada
/// guild y avisa para que vuelva a sonar.
async fn restore_players(
    http: &reqwest::Client,
    link: &NodeLink,
    voice: &VoiceBuffer,
    events: &UnboundedSender<NodeEvent>,
) {
    let pending: Vec<(GuildId, VoiceUpdate)> = voice
        .iter()
        .filter_map(|entry| Some((*entry.key(), entry.value().complete()?)))
        .collect();

    for (guild_id, update) in pending {
        let body = PlayerUpdate {
            track: None,
            voice: Some(update),
        };
        if let Err(e) = patch_player(http, link, guild_id, &body).await {
            warn!("Error restaurando la voz de guild {} en Lavalink: {:?}", guild_id, e);
        }

        if events.send(NodeEvent::PlayerReset { guild_id }).is_err() {
            warn!("Nadie escucha los eventos del nodo");
        }
    }
}

/// Mantiene vivo el socket: lo lee y, si cae, lo reabre con backoff hasta que
/// se cancele el nodo.
async fn supervise(
    link: Arc<NodeLink>,
    mut socket: Socket,
    user_id: UserId,
    http: reqwest::Client,
    voice: VoiceBuffer,
    events: UnboundedSender<NodeEvent>,
) {
    let mut backoff = Backoff::new();

    loop {
        let cancelled = tokio::select! {
            _ = link.shutdown.cancelled() => true,
            _ = pump(&mut socket, &link, &events) => false,
        };

        if cancelled {
            let _ = socket.close(None).await;
            debug!("Supervisor del socket de Lavalink finalizado");
            return;
        }

        link.connected.store(false, Ordering::SeqCst);

        socket = loop {
            let delay = backoff.next();
            tokio::select! {
                _ = link.shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            info!("🔄 Reconectando socket de Lavalink en {}", link.address.authority);
            match tokio::time::timeout(
                RECONNECT_TIMEOUT,
                open_socket(&link.address, &link.password, user_id),
            )
            .await
            {
                Ok(Ok((socket, session_id, resumed))) => {
                    *link.session_id.write() = Some(session_id);
                    link.connected.store(true, Ordering::SeqCst);
                    backoff.reset();
                    info!("✅ Socket de Lavalink restablecido");
                    if !resumed {
                        restore_players(&http, &link, &voice, &events).await;
                    }
                    break socket;
                }
                Ok(Err(e)) => warn!("Reconexión a Lavalink fallida: {}", e),
                Err(_) => warn!("Reconexión a Lavalink agotó el tiempo de espera"),
            }
        };
    }
}

#[async_trait]
impl AudioNode for LavalinkClient {
    async fn connect(&self, address: &NodeAddress, password: &str) -> Result<(), NodeError> {
        let (socket, session_id, _) = open_socket(address, password, self.user_id).await?;

        let link = Arc::new(NodeLink {
            address: address.clone(),
            password: password.to_string(),
            session_id: RwLock::new(Some(session_id)),
            connected: AtomicBool::new(true),
            shutdown: CancellationToken::new(),
        });

        if let Some(previous) = self.link.write().replace(link.clone()) {
            previous.shutdown.cancel();
        }

        tokio::spawn(supervise(
            link,
            socket,
            self.user_id,
            self.http.clone(),
            Arc::clone(&self.voice),
            self.events.clone(),
        ));

        info!("🎼 Conectado a Lavalink en {}", address.authority);
        Ok(())
    }

    async fn status(&self) -> NodeStatus {
        match self.link.read().as_ref() {
            Some(link) if link.connected.load(Ordering::SeqCst) => NodeStatus::Connected,
            _ => NodeStatus::Disconnected,
        }
    }

    fn is_present(&self) -> bool {
        self.link.read().is_some()
    }

    async fn remove(&self) {
        let link = self.link.write().take();
        if let Some(link) = link {
            link.shutdown.cancel();
            link.connected.store(false, Ordering::SeqCst);
            info!("🗑️ Nodo Lavalink {} eliminado", link.address.authority);
        }
        self.voice.clear();
    }

    async fn load_and_play(&self, guild_id: GuildId, query: &str) -> Result<LoadedTrack, NodeError> {
        let track = self.load_tracks(query).await?;

        let body = PlayerUpdate {
            track: Some(TrackUpdate {
                encoded: Some(track.encoded.clone()),
            }),
            voice: None,
        };
        self.update_player(guild_id, &body).await?;

        info!(
            "🎵 Reproduciendo en guild {}: {} - {}",
            guild_id, track.info.author, track.info.title
        );

        Ok(LoadedTrack {
            duration: track.info.duration(),
            uri: track.info.uri,
            title: track.info.title,
            author: track.info.author,
        })
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), NodeError> {
        let body = PlayerUpdate {
            track: Some(TrackUpdate { encoded: None }),
            voice: None,
        };
        self.update_player(guild_id, &body).await?;

        info!("⏹️ Reproducción detenida en guild {}", guild_id);
        Ok(())
    }

    async fn on_voice_state_update(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        session_id: &str,
    ) {
        if !self.is_present() {
            return;
        }

        if channel_id.is_none() {
            self.voice.remove(&guild_id);
            if let Err(e) = self.destroy_player(guild_id).await {
                debug!("No se pudo destruir el player de guild {}: {:?}", guild_id, e);
            }
            return;
        }

        {
            let mut pending = self.voice.entry(guild_id).or_default();
            pending.channel_id = channel_id;
            pending.session_id = Some(session_id.to_string());
        }

        self.flush_voice(guild_id).await;
    }

    async fn on_voice_server_update(&self, guild_id: GuildId, token: &str, endpoint: &str) {
        if !self.is_present() {
            return;
        }

        {
            let mut pending = self.voice.entry(guild_id).or_default();
            pending.token = Some(token.to_string());
            pending.endpoint = Some(endpoint.to_string());
        }

        self.flush_voice(guild_id).await;
    }
}

impl Drop for LavalinkClient {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.shutdown.cancel();
        }
    }
}
