//! # Audio Module
//!
//! Control plane for the external audio node.
//!
//! The bot never decodes audio itself: a Lavalink v4 node renders and streams
//! tracks into the voice channel, and this module only talks to it.
//!
//! ### [`node`] - Node Interface
//! - [`node::AudioNode`] trait consumed by the radio orchestrator
//! - Track lifecycle events ([`node::NodeEvent`]) and end reasons
//! - Address normalization (`https://host:port` → `host:port` + TLS flag)
//!
//! ### [`lavalink_client`] - Lavalink v4 Client
//! - WebSocket event stream with automatic socket reconnection
//! - REST track loading and player updates
//! - Voice credential forwarding once both gateway events have arrived
//!
//! ### [`protocol`] - Wire Models
//! - Serde models for `loadtracks`, player updates and WebSocket ops

pub mod lavalink_client;
pub mod node;
pub mod protocol;
