use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tokio::time;
use tracing::{debug, info, warn};

use super::{
    connection::ConnectionManager, registry::SessionRegistry, scheduler::TrackScheduler,
    skip::SkipVoteCoordinator, RadioTimings, VoiceGateway,
};
use crate::audio::node::AudioNode;

/// Cambio de canal de voz de otro usuario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceChange {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub old_channel: Option<ChannelId>,
    pub new_channel: Option<ChannelId>,
}

/// Qué hizo la radio con un [`PresenceChange`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceAction {
    Ignored,
    Resumed,
    Paused,
}

/// Reenvía las señales de voz del gateway al nodo y pausa o reanuda la radio
/// según haya oyentes humanos.
pub struct VoiceSignalRelay {
    node: Arc<dyn AudioNode>,
    connection: Arc<ConnectionManager>,
    registry: Arc<SessionRegistry>,
    votes: Arc<SkipVoteCoordinator>,
    scheduler: Arc<TrackScheduler>,
    voice: Arc<dyn VoiceGateway>,
    bot_user_id: UserId,
    timings: RadioTimings,
}

impl VoiceSignalRelay {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node: Arc<dyn AudioNode>,
        connection: Arc<ConnectionManager>,
        registry: Arc<SessionRegistry>,
        votes: Arc<SkipVoteCoordinator>,
        scheduler: Arc<TrackScheduler>,
        voice: Arc<dyn VoiceGateway>,
        bot_user_id: UserId,
        timings: RadioTimings,
    ) -> Self {
        Self {
            node,
            connection,
            registry,
            votes,
            scheduler,
            voice,
            bot_user_id,
            timings,
        }
    }

    pub fn bot_user_id(&self) -> UserId {
        self.bot_user_id
    }

    /// Estado de voz del propio bot
    pub async fn on_own_voice_state(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        session_id: &str,
    ) {
        if !self.connection.is_initialized() {
            debug!("Lavalink no inicializado, ignorando estado de voz del bot");
            return;
        }

        let forwarded = time::timeout(
            self.timings.command_timeout,
            self.node.on_voice_state_update(guild_id, channel_id, session_id),
        )
        .await;
        if forwarded.is_err() {
            warn!("Reenvío de estado de voz agotó el tiempo en guild {}", guild_id);
        }

        match channel_id {
            Some(channel_id) => self.registry.set_channel(guild_id, Some(channel_id)),
            None => {
                if self.registry.is_active(guild_id) {
                    info!("🔇 Bot desconectado del canal de voz en guild {}", guild_id);
                    self.registry.set_active(guild_id, false);
                    self.registry.clear_current_track(guild_id);
                }
                self.votes.reset_votes(guild_id);
                self.registry.set_channel(guild_id, None);
            }
        }
    }

    /// Credenciales del servidor de voz; sin endpoint no hay servidor disponible
    pub async fn on_voice_server(&self, guild_id: GuildId, token: &str, endpoint: Option<&str>) {
        if !self.connection.is_initialized() {
            debug!("Lavalink no inicializado, ignorando servidor de voz");
            return;
        }

        let Some(endpoint) = endpoint else {
            warn!("Servidor de voz sin endpoint en guild {}", guild_id);
            return;
        };

        let forwarded = time::timeout(
            self.timings.command_timeout,
            self.node.on_voice_server_update(guild_id, token, endpoint),
        )
        .await;
        if forwarded.is_err() {
            warn!("Reenvío de servidor de voz agotó el tiempo en guild {}", guild_id);
        }
    }

    /// Pausa la radio cuando se va el último humano y la reanuda cuando entra uno
    pub async fn on_presence_change(&self, change: PresenceChange) -> PresenceAction {
        let guild_id = change.guild_id;

        if change.user_id == self.bot_user_id || !self.registry.is_active(guild_id) {
            return PresenceAction::Ignored;
        }

        let Some(bot_channel) = self.registry.channel(guild_id) else {
            return PresenceAction::Ignored;
        };

        let joined = change.new_channel == Some(bot_channel) && change.old_channel != Some(bot_channel);
        let left = change.old_channel == Some(bot_channel) && change.new_channel != Some(bot_channel);

        if joined {
            if !self.is_human(guild_id, change.user_id).await {
                return PresenceAction::Ignored;
            }

            if self.registry.resume_if_paused(guild_id) {
                info!("▶️ Oyente de vuelta en guild {}, reanudando radio", guild_id);
                self.scheduler.advance(guild_id);
                return PresenceAction::Resumed;
            }
        } else if left {
            if !self.channel_is_empty(guild_id, bot_channel).await {
                return PresenceAction::Ignored;
            }

            if self.registry.pause_if_playing(guild_id) {
                info!("⏸️ Canal vacío en guild {}, pausando radio", guild_id);
                self.scheduler.pause(guild_id, bot_channel).await;
                return PresenceAction::Paused;
            }
        }

        PresenceAction::Ignored
    }

    /// Un recuento fallido cuenta como canal ocupado
    async fn channel_is_empty(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        match time::timeout(
            self.timings.lookup_timeout,
            self.voice.humans_in_channel(guild_id, channel_id),
        )
        .await
        {
            Ok(Ok(humans)) => humans == 0,
            Ok(Err(e)) => {
                warn!("No se pudo contar humanos en guild {}: {:?}", guild_id, e);
                false
            }
            Err(_) => {
                warn!("Recuento de humanos agotó el tiempo en guild {}", guild_id);
                false
            }
        }
    }

    /// Ante la duda se asume humano
    async fn is_human(&self, guild_id: GuildId, user_id: UserId) -> bool {
        match time::timeout(self.timings.lookup_timeout, self.voice.is_human(guild_id, user_id)).await
        {
            Ok(Ok(human)) => human,
            Ok(Err(e)) => {
                warn!("No se pudo resolver el miembro {}: {:?}", user_id, e);
                true
            }
            Err(_) => {
                warn!("Búsqueda del miembro {} agotó el tiempo", user_id);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::node::{NodeEvent, TrackEndReason};
    use crate::radio::{
        testing::{guild, radio_channel, Harness},
        SessionState,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn presence(user: u64, old: Option<ChannelId>, new: Option<ChannelId>) -> PresenceChange {
        PresenceChange {
            guild_id: guild(),
            user_id: UserId::new(user),
            old_channel: old,
            new_channel: new,
        }
    }

    async fn paused_harness() -> Harness {
        let harness = Harness::connected().await;
        harness.service.start_session(guild()).await.expect("radio iniciada");
        harness.voice.set_humans(0);

        let action = harness
            .service
            .relay()
            .on_presence_change(presence(20, Some(radio_channel()), None))
            .await;
        assert_eq!(action, PresenceAction::Paused);
        harness
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_human_leaving_pauses() {
        let harness = paused_harness().await;

        assert_eq!(harness.service.session_state(guild()), SessionState::Paused);
        assert_eq!(harness.node.stops(), vec![guild()]);
        assert_eq!(
            harness.voice.statuses().last(),
            Some(&(radio_channel(), String::new()))
        );
        assert!(harness.voice.leaves().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaving_with_listeners_left_keeps_playing() {
        let harness = Harness::connected().await;
        harness.service.start_session(guild()).await.expect("radio iniciada");
        harness.voice.set_humans(2);

        let action = harness
            .service
            .relay()
            .on_presence_change(presence(20, Some(radio_channel()), None))
            .await;

        assert_eq!(action, PresenceAction::Ignored);
        assert_eq!(harness.service.session_state(guild()), SessionState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_human_joining_resumes_once() {
        let harness = paused_harness().await;
        let relay = harness.service.relay();

        let first = relay
            .on_presence_change(presence(21, None, Some(radio_channel())))
            .await;
        let second = relay
            .on_presence_change(presence(22, None, Some(radio_channel())))
            .await;
        harness.settle().await;

        assert_eq!(first, PresenceAction::Resumed);
        assert_eq!(second, PresenceAction::Ignored);
        assert_eq!(harness.service.session_state(guild()), SessionState::Active);
        assert_eq!(harness.node.plays().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_during_retry_backoff_plays_once() {
        let harness = Harness::connected().await;
        harness.service.start_session(guild()).await.expect("radio iniciada");
        let relay = harness.service.relay();

        // La siguiente pista falla y el bucle queda esperando para reintentar
        harness.node.fail_next_plays(1);
        harness.emit(NodeEvent::TrackEnded {
            guild_id: guild(),
            reason: TrackEndReason::Finished,
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(harness.node.plays().len(), 2);

        harness.voice.set_humans(0);
        let paused = relay
            .on_presence_change(presence(20, Some(radio_channel()), None))
            .await;
        harness.voice.set_humans(1);
        let resumed = relay
            .on_presence_change(presence(21, None, Some(radio_channel())))
            .await;
        harness.settle().await;

        assert_eq!(paused, PresenceAction::Paused);
        assert_eq!(resumed, PresenceAction::Resumed);
        let titles: Vec<String> = harness.node.plays().into_iter().map(|(_, query)| query).collect();
        assert_eq!(
            titles,
            vec![
                "ytsearch:Martin Garrix - Animals".to_string(),
                "ytsearch:Martin Garrix - In the Name of Love".to_string(),
                "ytsearch:Martin Garrix - Scared to be Lonely".to_string(),
            ]
        );
        assert_eq!(harness.service.session_state(guild()), SessionState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bot_joining_does_not_resume() {
        let harness = paused_harness().await;
        harness.voice.mark_bot(UserId::new(30));

        let action = harness
            .service
            .relay()
            .on_presence_change(presence(30, None, Some(radio_channel())))
            .await;
        harness.settle().await;

        assert_eq!(action, PresenceAction::Ignored);
        assert_eq!(harness.service.session_state(guild()), SessionState::Paused);
        assert_eq!(harness.node.plays().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_lookup_assumes_human() {
        let harness = paused_harness().await;
        harness.voice.fail_lookups();

        let action = harness
            .service
            .relay()
            .on_presence_change(presence(31, None, Some(radio_channel())))
            .await;

        assert_eq!(action, PresenceAction::Resumed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_headcount_keeps_playing() {
        let harness = Harness::connected().await;
        harness.service.start_session(guild()).await.expect("radio iniciada");
        harness.voice.fail_headcounts();

        let action = harness
            .service
            .relay()
            .on_presence_change(presence(20, Some(radio_channel()), None))
            .await;

        assert_eq!(action, PresenceAction::Ignored);
        assert_eq!(harness.service.session_state(guild()), SessionState::Active);
        assert!(harness.node.stops().is_empty());
        assert_eq!(harness.service.listeners(guild()).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_channels_are_ignored() {
        let harness = Harness::connected().await;
        harness.service.start_session(guild()).await.expect("radio iniciada");
        harness.voice.set_humans(0);

        let elsewhere = Some(ChannelId::new(777));
        let action = harness
            .service
            .relay()
            .on_presence_change(presence(20, elsewhere, None))
            .await;

        assert_eq!(action, PresenceAction::Ignored);
        assert_eq!(harness.service.session_state(guild()), SessionState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_disconnect_deactivates_session() {
        let harness = Harness::connected().await;
        harness.service.start_session(guild()).await.expect("radio iniciada");
        harness.service.add_skip_vote(guild(), UserId::new(40), 4);

        harness
            .service
            .relay()
            .on_own_voice_state(guild(), None, "session")
            .await;

        assert_eq!(harness.service.session_state(guild()), SessionState::Inactive);
        assert!(harness.service.current_track(guild()).is_none());
        assert_eq!(harness.service.skip_votes(guild()), 0);
        assert_eq!(harness.node.voice_states(), vec![(guild(), None)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_move_updates_channel() {
        let harness = Harness::connected().await;
        harness.service.start_session(guild()).await.expect("radio iniciada");
        let moved_to = ChannelId::new(300);

        harness
            .service
            .relay()
            .on_own_voice_state(guild(), Some(moved_to), "session")
            .await;

        assert_eq!(harness.registry().channel(guild()), Some(moved_to));
        assert_eq!(harness.service.session_state(guild()), SessionState::Active);
        assert_eq!(harness.node.voice_states(), vec![(guild(), Some(moved_to))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_server_is_forwarded() {
        let harness = Harness::connected().await;
        let relay = harness.service.relay();

        relay
            .on_voice_server(guild(), "token", Some("eu-west.discord.media:443"))
            .await;
        relay.on_voice_server(guild(), "token", None).await;

        assert_eq!(
            harness.node.voice_servers(),
            vec![(guild(), "eu-west.discord.media:443".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_signals_dropped_without_node() {
        let harness = Harness::disconnected().await;
        let relay = harness.service.relay();

        relay
            .on_own_voice_state(guild(), Some(radio_channel()), "session")
            .await;
        relay.on_voice_server(guild(), "token", Some("endpoint")).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(harness.node.voice_states().is_empty());
        assert!(harness.node.voice_servers().is_empty());
    }
}
