//! Outbound handles of players that reached the play state, and the names
//! and slots claimed by logins still in progress.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mc_rs_dispatch::ObjectId;
use mc_rs_proto::types::Uuid;
use mc_rs_proto::GamePacket;
use tokio::sync::mpsc::UnboundedSender;

/// Queue feeding one connection's writer.
pub type Outbound = UnboundedSender<GamePacket>;

#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub name: String,
    pub uuid: Uuid,
    pub outbound: Outbound,
}

/// Why a login could not claim its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    AlreadyOnline,
    Full,
}

/// Online players by object id. Workers use it to reach clients.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    players: DashMap<ObjectId, PlayerSession>,
    /// Lowercased names held by a login in progress or an online player.
    names: DashMap<String, ()>,
    claimed: AtomicUsize,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` and one of `max_players` slots for a login. The claim
    /// lasts until [`release`](Self::release), or until the player that
    /// registers under the name is unregistered.
    pub fn reserve(&self, name: &str, max_players: usize) -> Result<(), Rejection> {
        match self.names.entry(name.to_ascii_lowercase()) {
            Entry::Occupied(_) => Err(Rejection::AlreadyOnline),
            Entry::Vacant(vacant) => {
                self.claimed
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < max_players).then_some(n + 1)
                    })
                    .map_err(|_| Rejection::Full)?;
                vacant.insert(());
                Ok(())
            }
        }
    }

    /// Give back a claim whose login never reached the play state.
    pub fn release(&self, name: &str) {
        if self.names.remove(&name.to_ascii_lowercase()).is_some() {
            self.claimed.fetch_sub(1, Ordering::AcqRel);
        }
    }

    pub fn register(&self, player: ObjectId, session: PlayerSession) {
        self.players.insert(player, session);
    }

    /// Remove the player and free its name and slot.
    pub fn unregister(&self, player: ObjectId) -> Option<PlayerSession> {
        let (_, session) = self.players.remove(&player)?;
        self.release(&session.name);
        Some(session)
    }

    /// Queue `packet` for one player. False if the player is gone.
    pub fn send(&self, player: ObjectId, packet: impl Into<GamePacket>) -> bool {
        match self.players.get(&player) {
            Some(session) => session.outbound.send(packet.into()).is_ok(),
            None => false,
        }
    }

    /// Queue `packet` for every online player. Returns how many accepted it.
    pub fn broadcast(&self, packet: impl Into<GamePacket>) -> usize {
        let packet = packet.into();
        self.players
            .iter()
            .filter(|entry| entry.outbound.send(packet.clone()).is_ok())
            .count()
    }

    /// Players in the play state.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Logins in progress plus online players.
    pub fn claimed(&self) -> usize {
        self.claimed.load(Ordering::Acquire)
    }
}
