//! State shared by every connection task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use mc_rs_crypto::ServerKeyPair;
use mc_rs_dispatch::{DispatchError, ObjectId, Router, WorkerId};
use mc_rs_proto::packets::status::{Description, PlayersInfo, ServerListInfo, VersionInfo};
use mc_rs_proto::packets::{GAME_VERSION, PROTOCOL_VERSION};
use mc_rs_proto::PacketRegistry;
use tracing::debug;

use crate::config::ServerConfig;
use crate::handler::PlayMessage;
use crate::sessions::SessionRegistry;

pub struct ServerContext {
    pub config: ServerConfig,
    pub registry: PacketRegistry,
    /// Present only in online mode.
    pub keypair: Option<ServerKeyPair>,
    pub router: Router<PlayMessage>,
    pub sessions: Arc<SessionRegistry>,
    favicon: Option<String>,
    worlds: Vec<(String, ObjectId)>,
    next_player_id: AtomicU64,
}

impl ServerContext {
    /// Build the context and spread the configured worlds across workers.
    pub fn new(
        config: ServerConfig,
        registry: PacketRegistry,
        keypair: Option<ServerKeyPair>,
        router: Router<PlayMessage>,
        sessions: Arc<SessionRegistry>,
    ) -> Result<Self, DispatchError> {
        let mut names = config.workers.worlds.clone();
        if names.is_empty() {
            names.push("world".into());
        }
        let mut worlds = Vec::with_capacity(names.len());
        for (index, name) in names.into_iter().enumerate() {
            let id = ObjectId::world(index as u64);
            let worker = WorkerId(index % router.worker_count());
            router.assign(id, worker)?;
            worlds.push((name, id));
        }
        Ok(Self {
            config,
            registry,
            keypair,
            router,
            sessions,
            favicon: None,
            worlds,
            next_player_id: AtomicU64::new(1),
        })
    }

    pub fn with_favicon(mut self, favicon: Option<String>) -> Self {
        self.favicon = favicon;
        self
    }

    /// Where new players spawn.
    pub fn default_world(&self) -> ObjectId {
        self.worlds[0].1
    }

    pub fn worlds(&self) -> impl Iterator<Item = (&str, ObjectId)> {
        self.worlds.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn allocate_player_id(&self) -> u64 {
        self.next_player_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue one simulation tick for every world.
    pub fn tick_worlds(&self) {
        for (name, id) in &self.worlds {
            if let Err(e) = self.router.tick(*id) {
                debug!("Tick for world {name} not delivered: {e}");
            }
        }
    }

    pub fn status_info(&self) -> ServerListInfo {
        ServerListInfo {
            version: VersionInfo {
                name: GAME_VERSION.into(),
                protocol: PROTOCOL_VERSION,
            },
            players: PlayersInfo {
                max: self.config.server.max_players,
                online: self.sessions.len() as u32,
            },
            description: Description {
                text: self.config.server.motd.clone(),
            },
            favicon: self.favicon.clone(),
        }
    }
}

/// Read a PNG and turn it into the status-response data URI.
pub fn load_favicon(path: &str) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(bytes)))
}
