use bytes::Bytes;
use mc_rs_dispatch::WorkerId;
use mc_rs_proto::packets::login::MAX_USERNAME;
use mc_rs_proto::packets::{
    is_supported_version, EncryptionRequest, EncryptionResponse, Handshake, JoinGame, LoginStart,
    LoginSuccess, SetCompression, GAME_VERSION, PROTOCOL_VERSION,
};
use mc_rs_proto::types::Uuid;
use sha2::{Digest, Sha256};

use crate::sessions::{PlayerSession, Rejection};

use super::*;

impl Connection {
    pub(super) fn handle_handshake(&mut self, handshake: Handshake) -> Result<(), ConnectionError> {
        let next = ConnectionState::from_next_state(handshake.next_state)
            .ok_or(ConnectionError::InvalidNextState(handshake.next_state))?;
        debug!(
            "{}: handshake v{} to {}:{}, next state {next}",
            self.addr, handshake.protocol_version, handshake.server_address, handshake.server_port
        );
        self.protocol_version = handshake.protocol_version;
        self.state = next;
        Ok(())
    }

    pub(super) fn handle_login_start(&mut self, login: LoginStart) -> Result<(), ConnectionError> {
        if !matches!(self.login, LoginStep::AwaitingStart) {
            return Err(self.out_of_sequence("LoginStart"));
        }
        let name = login.name;

        if !is_supported_version(self.protocol_version) {
            let reason = if self.protocol_version < PROTOCOL_VERSION {
                format!("Outdated client! Please use {GAME_VERSION}")
            } else {
                format!("Outdated server! I'm still on {GAME_VERSION}")
            };
            self.disconnect(&reason);
            return Ok(());
        }
        if !is_valid_username(&name) {
            self.disconnect("Invalid username");
            return Ok(());
        }
        // Claimed now so a second login under the name, or one past the
        // player limit, is refused while this one is still in progress.
        let max_players = self.ctx.config.server.max_players as usize;
        match self.ctx.sessions.reserve(&name, max_players) {
            Ok(()) => {
                debug!(
                    "{}: reserved {name} ({}/{max_players} slots claimed)",
                    self.addr,
                    self.ctx.sessions.claimed()
                );
                self.reserved = Some(name.clone());
            }
            Err(Rejection::AlreadyOnline) => {
                self.disconnect("You are already logged in");
                return Ok(());
            }
            Err(Rejection::Full) => {
                self.disconnect("The server is full!");
                return Ok(());
            }
        }

        let ctx = Arc::clone(&self.ctx);
        match &ctx.keypair {
            Some(keypair) => {
                let handshake = PendingHandshake::new();
                self.send(EncryptionRequest {
                    server_id: String::new(),
                    public_key: Bytes::copy_from_slice(keypair.public_key_der()),
                    verify_token: Bytes::copy_from_slice(handshake.verify_token()),
                })?;
                debug!("{}: requesting encryption for {name}", self.addr);
                self.login = LoginStep::AwaitingEncryption { name, handshake };
                Ok(())
            }
            None => self.finish_login(name),
        }
    }

    /// Any failure here is fatal: the pending handshake is consumed, so the
    /// client cannot retry with another secret.
    pub(super) fn handle_encryption_response(
        &mut self,
        response: EncryptionResponse,
    ) -> Result<(), ConnectionError> {
        let (name, handshake) = match std::mem::replace(&mut self.login, LoginStep::Done) {
            LoginStep::AwaitingEncryption { name, handshake } => (name, handshake),
            other => {
                self.login = other;
                return Err(self.out_of_sequence("EncryptionResponse"));
            }
        };
        let ctx = Arc::clone(&self.ctx);
        let keypair = ctx
            .keypair
            .as_ref()
            .ok_or(ConnectionError::UnexpectedPacket("EncryptionResponse"))?;

        let secret =
            handshake.complete(keypair, &response.shared_secret, &response.verify_token)?;
        debug!("{}: encryption established", self.addr);
        self.secret = Some(secret.clone());
        self.actions.push(Action::EnableEncryption(secret));
        self.finish_login(name)
    }

    /// Compression, LoginSuccess, then the switch to Play and the player's
    /// first message to its worker.
    fn finish_login(&mut self, name: String) -> Result<(), ConnectionError> {
        self.login = LoginStep::Done;
        if let Some(threshold) = self.ctx.config.network.compression() {
            self.send(SetCompression {
                threshold: threshold as i32,
            })?;
            self.actions.push(Action::EnableCompression(threshold));
        }

        let uuid = offline_uuid(&name);
        self.send(LoginSuccess {
            uuid: uuid.to_string(),
            username: name.clone(),
        })?;
        self.state = ConnectionState::Play;

        let player_id = self.ctx.allocate_player_id();
        let player = ObjectId::player(player_id);
        let world = self.ctx.default_world();
        // Players live on their world's worker.
        let worker = self
            .ctx
            .router
            .owner(world)
            .unwrap_or(WorkerId(player_id as usize % self.ctx.router.worker_count()));
        self.ctx.router.assign(player, worker)?;

        self.send(JoinGame {
            entity_id: player_id as i32,
            gamemode: 0,
            dimension: 0,
            difficulty: 1,
            max_players: self.ctx.config.server.max_players.min(u8::MAX as u32) as u8,
            level_type: "default".into(),
            reduced_debug_info: false,
        })?;

        self.ctx.sessions.register(
            player,
            PlayerSession {
                name: name.clone(),
                uuid,
                outbound: self.outbound.clone(),
            },
        );
        // The session holds the name from here; unregistering frees it.
        self.reserved = None;
        self.player = Some(player);
        self.username = Some(name.clone());
        self.keep_alive.last_sent = Instant::now();
        self.keep_alive.pending = None;

        info!("{name} ({}) logged in as {player} [{uuid}] on {worker}", self.addr);
        self.actions
            .push(Action::Dispatch(player, PlayMessage::Join { name, uuid }));
        Ok(())
    }
}

fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_USERNAME
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Name-derived UUID for players without an account lookup: the first 16
/// bytes of SHA-256("OfflinePlayer:" + name), stamped as version 8.
pub(crate) fn offline_uuid(name: &str) -> Uuid {
    let digest = Sha256::digest(format!("OfflinePlayer:{name}").as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    bytes[6] = (bytes[6] & 0x0f) | 0x80;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    Uuid::from_bytes(bytes)
}
