//! Per-connection protocol state machine.
//!
//! A [`Connection`] does no I/O. The transport feeds it decoded packets and
//! applies the [`Action`]s it returns, in order. Codec toggles are actions
//! too, so a packet queued before `EnableCompression` or `EnableEncryption`
//! still goes out under the old settings.

mod login;
mod play;
mod status;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mc_rs_crypto::{PendingHandshake, SessionSecret};
use mc_rs_dispatch::ObjectId;
use mc_rs_proto::packets::{KeepAlive, LoginDisconnect, PlayDisconnect};
use mc_rs_proto::{ConnectionState, Direction, GamePacket};
use rand::Rng;
use tracing::{debug, info};

use crate::context::ServerContext;
use crate::error::ConnectionError;
use crate::handler::PlayMessage;
use crate::sessions::Outbound;

/// Side effect requested by the state machine.
#[derive(Debug, PartialEq)]
pub enum Action {
    Send(GamePacket),
    /// Compress frames of at least this many bytes from now on.
    EnableCompression(usize),
    /// Wrap every following byte, in both directions, in AES/CFB8.
    EnableEncryption(SessionSecret),
    /// Route a message to the worker owning the object.
    Dispatch(ObjectId, PlayMessage),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusStep {
    AwaitingRequest,
    AwaitingPing,
}

#[derive(Debug)]
enum LoginStep {
    AwaitingStart,
    AwaitingEncryption {
        name: String,
        handshake: PendingHandshake,
    },
    Done,
}

#[derive(Debug)]
struct KeepAliveState {
    last_sent: Instant,
    /// Outstanding id and when it was sent.
    pending: Option<(i32, Instant)>,
}

pub struct Connection {
    addr: SocketAddr,
    ctx: Arc<ServerContext>,
    outbound: Outbound,
    state: ConnectionState,
    protocol_version: i32,
    status: StatusStep,
    login: LoginStep,
    secret: Option<SessionSecret>,
    player: Option<ObjectId>,
    username: Option<String>,
    /// Name claimed in the session registry by a login not yet in play.
    reserved: Option<String>,
    connected_at: Instant,
    keep_alive: KeepAliveState,
    actions: Vec<Action>,
    closed: bool,
}

impl Connection {
    /// `outbound` is the queue workers use to reach this client once it
    /// enters the play state.
    pub fn new(addr: SocketAddr, ctx: Arc<ServerContext>, outbound: Outbound) -> Self {
        Self {
            addr,
            ctx,
            outbound,
            state: ConnectionState::Handshake,
            protocol_version: 0,
            status: StatusStep::AwaitingRequest,
            login: LoginStep::AwaitingStart,
            secret: None,
            player: None,
            username: None,
            reserved: None,
            connected_at: Instant::now(),
            keep_alive: KeepAliveState {
                last_sent: Instant::now(),
                pending: None,
            },
            actions: Vec::new(),
            closed: false,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_encrypted(&self) -> bool {
        self.secret.is_some()
    }

    pub fn player(&self) -> Option<ObjectId> {
        self.player
    }

    /// Process one decoded inbound packet.
    ///
    /// Unknown ids are dropped in the play state. Before that every id the
    /// client may send is known, so an unknown one is a sequence error.
    pub fn handle(&mut self, packet: GamePacket) -> Result<Vec<Action>, ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        if let GamePacket::Unknown(p) = &packet {
            if self.state != ConnectionState::Play {
                return Err(ConnectionError::UnknownPacket {
                    state: self.state,
                    id: p.id,
                });
            }
            debug!(
                "{}: ignoring unknown packet 0x{:02x} in {} state ({} bytes)",
                self.addr,
                p.id,
                p.state,
                p.body.len()
            );
            return Ok(Vec::new());
        }
        if packet.direction() != Direction::Inbound {
            return Err(ConnectionError::UnexpectedPacket(packet.name()));
        }
        if packet.state() != self.state {
            return Err(self.out_of_sequence(packet.name()));
        }

        self.actions.clear();
        let result = match packet {
            GamePacket::Handshake(p) => self.handle_handshake(p),
            GamePacket::StatusRequest(_) => self.handle_status_request(),
            GamePacket::StatusPing(p) => self.handle_status_ping(p),
            GamePacket::LoginStart(p) => self.handle_login_start(p),
            GamePacket::EncryptionResponse(p) => self.handle_encryption_response(p),
            GamePacket::KeepAliveResponse(p) => self.handle_keep_alive_response(p),
            GamePacket::ChatMessage(p) => self.handle_chat(p),
            GamePacket::PlayerPosition(p) => self.handle_position(p),
            other => Err(ConnectionError::UnexpectedPacket(other.name())),
        };
        match result {
            Ok(()) => Ok(std::mem::take(&mut self.actions)),
            Err(e) => {
                self.actions.clear();
                Err(e)
            }
        }
    }

    /// Reject an outbound packet that does not belong to the current state.
    pub fn check_outbound(&self, packet: &GamePacket) -> Result<(), ConnectionError> {
        if packet.direction() != Direction::Outbound || packet.state() != self.state {
            return Err(self.out_of_sequence(packet.name()));
        }
        Ok(())
    }

    /// Server-initiated disconnect: a Disconnect packet where the state has
    /// one, then `Close`.
    pub fn kick(&mut self, reason: &str) -> Vec<Action> {
        self.actions.clear();
        self.disconnect(reason);
        std::mem::take(&mut self.actions)
    }

    /// Drive the login deadline and keep-alive. Called periodically by the
    /// transport.
    pub fn poll_timers(&mut self, now: Instant) -> Result<Vec<Action>, ConnectionError> {
        if self.closed {
            return Ok(Vec::new());
        }
        let network = &self.ctx.config.network;
        if self.state != ConnectionState::Play {
            let limit = Duration::from_secs(network.login_timeout_secs);
            if now.saturating_duration_since(self.connected_at) >= limit {
                debug!("{}: still in {} state after {limit:?}", self.addr, self.state);
                return Err(ConnectionError::LoginTimeout);
            }
            return Ok(Vec::new());
        }
        let interval = Duration::from_secs(network.keep_alive_interval_secs);
        let timeout = Duration::from_secs(network.keep_alive_timeout_secs);

        if let Some((id, sent)) = self.keep_alive.pending {
            if now.saturating_duration_since(sent) >= timeout {
                debug!("{}: keep-alive {id} unanswered", self.addr);
                return Err(ConnectionError::KeepAliveTimeout);
            }
            return Ok(Vec::new());
        }
        if now.saturating_duration_since(self.keep_alive.last_sent) < interval {
            return Ok(Vec::new());
        }
        let id: i32 = rand::thread_rng().gen();
        self.keep_alive.pending = Some((id, now));
        self.keep_alive.last_sent = now;
        Ok(vec![Action::Send(KeepAlive { keep_alive_id: id }.into())])
    }

    /// Tear down the session: zero the secret, unregister the player and
    /// give its object back. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.secret = None;
        self.login = LoginStep::Done;

        if let Some(name) = self.reserved.take() {
            self.ctx.sessions.release(&name);
        }
        let Some(player) = self.player.take() else {
            debug!("{} closed in {} state", self.addr, self.state);
            return;
        };
        self.ctx.sessions.unregister(player);
        // Only the owning worker releases the record, after every message
        // queued ahead of Leave. Routing fails only when nothing was queued:
        // the record is gone or the workers have shut down.
        if let Err(e) = self.ctx.router.route(player, PlayMessage::Leave) {
            debug!("Leave for {player} not routed: {e}");
        }
        info!(
            "{} ({}) disconnected",
            self.username.as_deref().unwrap_or("?"),
            self.addr
        );
    }

    fn out_of_sequence(&self, packet: &'static str) -> ConnectionError {
        ConnectionError::OutOfSequencePacket {
            state: self.state,
            packet,
        }
    }

    /// Queue a packet after checking it belongs to the state at this point
    /// of the action list.
    fn send(&mut self, packet: impl Into<GamePacket>) -> Result<(), ConnectionError> {
        let packet = packet.into();
        self.check_outbound(&packet)?;
        self.actions.push(Action::Send(packet));
        Ok(())
    }

    fn disconnect(&mut self, reason: &str) {
        info!("Kicking {}: {reason}", self.addr);
        match self.state {
            ConnectionState::Login => self
                .actions
                .push(Action::Send(LoginDisconnect::with_message(reason).into())),
            ConnectionState::Play => self
                .actions
                .push(Action::Send(PlayDisconnect::with_message(reason).into())),
            ConnectionState::Handshake | ConnectionState::Status => {}
        }
        self.actions.push(Action::Close);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &self.addr)
            .field("state", &self.state)
            .field("player", &self.player)
            .field("encrypted", &self.secret.is_some())
            .finish()
    }
}
