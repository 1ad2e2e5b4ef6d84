//! Play-side game logic, executed on dispatch workers.

use std::collections::HashMap;
use std::sync::Arc;

use mc_rs_dispatch::{HandlerResult, ObjectId, ObjectKind, WorkerContext, WorkerHandler};
use mc_rs_proto::packets::ChatBroadcast;
use mc_rs_proto::types::Uuid;
use tracing::{debug, info};

use crate::sessions::SessionRegistry;

/// Message routed to the worker owning a player or world.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayMessage {
    Join { name: String, uuid: Uuid },
    Chat { message: String },
    Move { x: f64, y: f64, z: f64, on_ground: bool },
    Leave,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub name: String,
    pub uuid: Uuid,
    pub position: Option<[f64; 3]>,
    pub on_ground: bool,
    pub chat_count: u64,
}

/// One per worker; holds state only for the objects that worker owns.
pub struct PlayHandler {
    sessions: Arc<SessionRegistry>,
    players: HashMap<ObjectId, PlayerState>,
    world_ticks: HashMap<ObjectId, u64>,
}

impl PlayHandler {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self {
            sessions,
            players: HashMap::new(),
            world_ticks: HashMap::new(),
        }
    }

    pub fn player(&self, id: ObjectId) -> Option<&PlayerState> {
        self.players.get(&id)
    }

    /// Ticks executed for `world` on this worker.
    pub fn world_ticks(&self, world: ObjectId) -> u64 {
        self.world_ticks.get(&world).copied().unwrap_or(0)
    }

    fn player_mut(&mut self, id: ObjectId) -> Result<&mut PlayerState, String> {
        self.players
            .get_mut(&id)
            .ok_or_else(|| format!("{id} has not joined"))
    }
}

impl WorkerHandler<PlayMessage> for PlayHandler {
    fn handle(
        &mut self,
        ctx: &WorkerContext<'_, PlayMessage>,
        target: ObjectId,
        message: PlayMessage,
    ) -> HandlerResult {
        match message {
            PlayMessage::Join { name, uuid } => {
                info!("{name} joined the game on {}", ctx.worker_id());
                self.sessions
                    .broadcast(ChatBroadcast::system(&format!("{name} joined the game")));
                self.players.insert(
                    target,
                    PlayerState {
                        name,
                        uuid,
                        position: None,
                        on_ground: false,
                        chat_count: 0,
                    },
                );
            }
            PlayMessage::Chat { message } => {
                let player = self.player_mut(target)?;
                player.chat_count += 1;
                if message.starts_with('/') {
                    debug!("{} issued command {message}", player.name);
                    self.sessions
                        .send(target, ChatBroadcast::system("Unknown command"));
                } else {
                    info!("<{}> {message}", player.name);
                    let line = format!("<{}> {message}", player.name);
                    self.sessions.broadcast(ChatBroadcast::chat(&line));
                }
            }
            PlayMessage::Move {
                x,
                y,
                z,
                on_ground,
            } => {
                let player = self.player_mut(target)?;
                player.position = Some([x, y, z]);
                player.on_ground = on_ground;
            }
            PlayMessage::Leave => {
                if let Some(player) = self.players.remove(&target) {
                    info!("{} left the game", player.name);
                    self.sessions
                        .broadcast(ChatBroadcast::system(&format!("{} left the game", player.name)));
                }
                ctx.router().release(target);
            }
        }
        Ok(())
    }

    fn tick(&mut self, _ctx: &WorkerContext<'_, PlayMessage>, target: ObjectId) -> HandlerResult {
        if target.kind == ObjectKind::World {
            *self.world_ticks.entry(target).or_default() += 1;
        }
        Ok(())
    }
}
