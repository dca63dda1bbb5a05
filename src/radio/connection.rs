use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{DisconnectCallback, RadioTimings};
use crate::{
    audio::node::{AudioNode, NodeAddress, NodeError, NodeStatus},
    error::{RadioError, RadioResult},
};

/// Salud del enlace de control (uno por proceso)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionHealth {
    pub connected: bool,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Dirección y credenciales del nodo configurado
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub url: String,
    pub password: String,
    pub max_consecutive_failures: u32,
}

/// Ciclo de vida de la conexión con el nodo de audio.
///
/// Es el único que escribe en [`ConnectionHealth`]; el resto de componentes
/// solo lo consulta antes de enviar órdenes al nodo.
pub struct ConnectionManager {
    node: Arc<dyn AudioNode>,
    settings: NodeSettings,
    timings: RadioTimings,
    health: RwLock<ConnectionHealth>,
    monitoring: AtomicBool,
    on_disconnect: DisconnectCallback,
}

impl ConnectionManager {
    pub fn new(
        node: Arc<dyn AudioNode>,
        settings: NodeSettings,
        timings: RadioTimings,
        on_disconnect: DisconnectCallback,
    ) -> Self {
        Self {
            node,
            settings,
            timings,
            health: RwLock::new(ConnectionHealth::default()),
            monitoring: AtomicBool::new(false),
            on_disconnect,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.health.read().connected
    }

    /// `true` si hay un nodo registrado, aunque esté caído
    pub fn is_initialized(&self) -> bool {
        self.node.is_present()
    }

    pub fn health(&self) -> ConnectionHealth {
        self.health.read().clone()
    }

    /// Conecta con el nodo con un presupuesto fijo de intentos.
    ///
    /// Cada intento tiene su propio timeout y entre fallos se espera un retardo
    /// fijo. Devuelve el último error si se agota el presupuesto.
    pub async fn connect(&self, url: &str, password: &str) -> RadioResult<()> {
        if self.is_connected() && self.node.is_present() {
            info!("Ya conectado a Lavalink");
            return Ok(());
        }

        let address = NodeAddress::parse(url);
        let attempts = self.timings.connect_attempts;
        let mut last_error = NodeError::NotPresent;

        for attempt in 1..=attempts {
            info!(
                address = %address.authority,
                secure = address.secure,
                tries_remaining = attempts - attempt + 1,
                "🔌 Intentando conectar a Lavalink..."
            );

            let result = time::timeout(
                self.timings.connect_timeout,
                self.node.connect(&address, password),
            )
            .await
            .unwrap_or(Err(NodeError::Timeout("conexión con el nodo")));

            match result {
                Ok(()) => {
                    let mut health = self.health.write();
                    health.connected = true;
                    health.consecutive_failures = 0;
                    info!("✅ Conectado a Lavalink");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        tries_remaining = attempts - attempt,
                        "Error al conectar a Lavalink: {}", e
                    );
                    last_error = e;
                    if attempt < attempts {
                        time::sleep(self.timings.connect_retry_delay).await;
                    }
                }
            }
        }

        self.health.write().connected = false;
        Err(RadioError::ConnectFailed {
            attempts,
            source: last_error,
        })
    }

    /// Conecta con el nodo configurado y arma la monitorización de salud
    pub async fn reconnect(self: &Arc<Self>) -> RadioResult<()> {
        self.connect(&self.settings.url, &self.settings.password).await?;
        self.spawn_monitor();
        Ok(())
    }

    /// Lanza [`Self::monitor_health`] en su propia tarea salvo que ya corra
    pub fn spawn_monitor(self: &Arc<Self>) {
        if self.monitoring.swap(true, Ordering::SeqCst) {
            debug!("Monitor de Lavalink ya en marcha");
            return;
        }

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager
                .monitor_health(manager.settings.max_consecutive_failures)
                .await;
            manager.monitoring.store(false, Ordering::SeqCst);
        });
    }

    /// Sondea el estado del nodo a intervalo fijo hasta que el nodo desaparece.
    ///
    /// Tras `max_consecutive_failures` sondeos desconectados seguidos marca la
    /// conexión como caída, elimina el nodo y dispara el callback de
    /// desconexión una sola vez.
    pub async fn monitor_health(&self, max_consecutive_failures: u32) {
        let interval = self.timings.health_interval;
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            max_failures = max_consecutive_failures,
            "🩺 Monitorizando conexión con Lavalink"
        );

        loop {
            ticker.tick().await;

            if !self.node.is_present() {
                info!("Nodo Lavalink eliminado, fin de la monitorización");
                return;
            }

            let status = time::timeout(self.timings.health_poll_timeout, self.node.status())
                .await
                .unwrap_or(NodeStatus::Disconnected);

            match status {
                NodeStatus::Connected => {
                    let mut health = self.health.write();
                    if health.consecutive_failures > 0 {
                        info!(
                            "✅ Lavalink recuperado tras {} sondeos fallidos",
                            health.consecutive_failures
                        );
                    }
                    health.consecutive_failures = 0;
                    health.connected = true;
                }
                NodeStatus::Disconnected => {
                    let failures = {
                        let mut health = self.health.write();
                        health.consecutive_failures += 1;
                        health.last_failure_at = Some(Utc::now());
                        health.consecutive_failures
                    };

                    warn!(
                        failures,
                        max = max_consecutive_failures,
                        "⚠️ Lavalink desconectado"
                    );

                    if failures >= max_consecutive_failures {
                        self.health.write().connected = false;
                        error!(
                            "❌ Lavalink caído tras {} sondeos, abandonando la conexión",
                            failures
                        );

                        self.node.remove().await;

                        let callback = Arc::clone(&self.on_disconnect);
                        tokio::spawn(async move { callback().await });
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::testing::FakeNode;
    use futures::FutureExt;
    use pretty_assertions::assert_eq;
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    fn settings() -> NodeSettings {
        NodeSettings {
            url: "http://lavalink:2333".to_string(),
            password: "youshallnotpass".to_string(),
            max_consecutive_failures: 10,
        }
    }

    fn counting_callback() -> (DisconnectCallback, Arc<AtomicU32>) {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let callback: DisconnectCallback = Arc::new(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        });
        (callback, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_gives_up_after_five_attempts() {
        let node = Arc::new(FakeNode::failing());
        let (callback, _) = counting_callback();
        let manager = ConnectionManager::new(node.clone(), settings(), RadioTimings::default(), callback);

        let result = manager.connect("https://lavalink:443", "pw").await;

        match result {
            Err(RadioError::ConnectFailed { attempts, .. }) => assert_eq!(attempts, 5),
            other => panic!("se esperaba ConnectFailed, llegó {:?}", other),
        }

        let calls = node.connect_calls();
        assert_eq!(calls.len(), 5);
        for pair in calls.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(5));
        }
        assert!(!manager.is_connected());
        assert_eq!(node.last_address().map(|a| a.secure), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_succeeds_and_is_idempotent() {
        let node = Arc::new(FakeNode::new());
        let (callback, _) = counting_callback();
        let manager = ConnectionManager::new(node.clone(), settings(), RadioTimings::default(), callback);

        manager.connect("lavalink:2333", "pw").await.expect("conexión");
        assert!(manager.is_connected());

        manager.connect("lavalink:2333", "pw").await.expect("segunda conexión");
        assert_eq!(node.connect_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_escalation_fires_callback_once() {
        let node = Arc::new(FakeNode::new());
        let (callback, fired) = counting_callback();
        let manager = ConnectionManager::new(node.clone(), settings(), RadioTimings::default(), callback);
        manager.connect("lavalink:2333", "pw").await.expect("conexión");

        node.set_status(NodeStatus::Disconnected);
        let started = Instant::now();
        manager.monitor_health(10).await;

        // Diez sondeos de cinco segundos
        assert!(started.elapsed() >= Duration::from_secs(50));
        time::sleep(Duration::from_secs(60)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!manager.is_connected());
        assert!(!node.is_present());
        assert_eq!(node.removals(), 1);
        assert_eq!(manager.health().consecutive_failures, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_poll_resets_failures() {
        let node = Arc::new(FakeNode::new());
        let (callback, fired) = counting_callback();
        let manager = Arc::new(ConnectionManager::new(
            node.clone(),
            settings(),
            RadioTimings::default(),
            callback,
        ));
        manager.connect("lavalink:2333", "pw").await.expect("conexión");

        node.set_status(NodeStatus::Disconnected);
        manager.spawn_monitor();
        time::sleep(Duration::from_secs(23)).await;
        assert_eq!(manager.health().consecutive_failures, 4);
        assert!(manager.health().last_failure_at.is_some());

        node.set_status(NodeStatus::Connected);
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(manager.health().consecutive_failures, 0);
        assert!(manager.is_connected());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stops_when_node_removed() {
        let node = Arc::new(FakeNode::new());
        let (callback, fired) = counting_callback();
        let manager = ConnectionManager::new(node.clone(), settings(), RadioTimings::default(), callback);
        manager.connect("lavalink:2333", "pw").await.expect("conexión");

        node.remove().await;
        manager.monitor_health(10).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
