//! Byte-level side of one client: framing, compression and encryption around
//! a [`Connection`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use mc_rs_crypto::StreamCipher;
use mc_rs_proto::{Direction, FrameCodec, GamePacket};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use crate::connection::{Action, Connection};
use crate::context::ServerContext;
use crate::error::ConnectionError;

const READ_BUF_SIZE: usize = 8192;

/// How often the login deadline and keep-alive are checked.
const TIMER_POLL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

pub struct Transport<S> {
    stream: S,
    ctx: Arc<ServerContext>,
    conn: Connection,
    codec: FrameCodec,
    cipher: Option<StreamCipher>,
    outbound_rx: mpsc::UnboundedReceiver<GamePacket>,
    write_buf: BytesMut,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, addr: SocketAddr, ctx: Arc<ServerContext>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let codec = FrameCodec::new(ctx.config.network.max_frame_length);
        Self {
            stream,
            conn: Connection::new(addr, Arc::clone(&ctx), outbound_tx),
            ctx,
            codec,
            cipher: None,
            outbound_rx,
            write_buf: BytesMut::with_capacity(READ_BUF_SIZE),
        }
    }

    /// Serve the client until it disconnects, is kicked, or the server shuts
    /// down. Always releases the connection's resources.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let addr = self.conn.addr();
        if let Err(e) = self.serve(&mut shutdown).await {
            match e.kick_reason() {
                Some(reason) => {
                    warn!("{addr}: {e}");
                    let actions = self.conn.kick(&reason);
                    if let Err(e) = self.apply(actions).await {
                        debug!("{addr}: failed to deliver disconnect: {e}");
                    }
                }
                None => debug!("{addr}: connection closed: {e}"),
            }
        }
        debug!(
            "{addr}: session ended in {} state (player {:?}, encrypted: {})",
            self.conn.state(),
            self.conn.player(),
            self.conn.is_encrypted()
        );
        self.conn.close();
        let _ = self.stream.shutdown().await;
    }

    async fn serve(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<(), ConnectionError> {
        let mut read_buf = vec![0u8; READ_BUF_SIZE];
        let mut timers = tokio::time::interval(TIMER_POLL);

        loop {
            tokio::select! {
                result = self.stream.read(&mut read_buf) => {
                    let n = result?;
                    if n == 0 {
                        debug!("{}: peer closed the connection", self.conn.addr());
                        return Ok(());
                    }
                    if self.receive(&mut read_buf[..n]).await? == Flow::Close {
                        return Ok(());
                    }
                }
                Some(packet) = self.outbound_rx.recv() => {
                    self.conn.check_outbound(&packet)?;
                    self.write_packet(&packet)?;
                    self.flush().await?;
                }
                _ = timers.tick() => {
                    let actions = self.conn.poll_timers(Instant::now())?;
                    if self.apply(actions).await? == Flow::Close {
                        return Ok(());
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let actions = self.conn.kick("Server closed");
                        self.apply(actions).await?;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Decrypt, frame and handle everything in `data`.
    async fn receive(&mut self, data: &mut [u8]) -> Result<Flow, ConnectionError> {
        if let Some(cipher) = &mut self.cipher {
            cipher.decrypt(data);
        }
        self.codec.push(data);

        while let Some(frame) = self.codec.next_frame()? {
            let packet = self
                .ctx
                .registry
                .decode(self.conn.state(), Direction::Inbound, frame)?;
            trace!("{} <- {}", self.conn.addr(), packet.name());
            let actions = match self.conn.handle(packet) {
                Ok(actions) => actions,
                Err(e) if !e.is_fatal() => {
                    warn!("{}: {e}", self.conn.addr());
                    continue;
                }
                Err(e) => return Err(e),
            };
            if self.apply(actions).await? == Flow::Close {
                return Ok(Flow::Close);
            }
        }
        Ok(Flow::Continue)
    }

    /// Apply actions in order, then flush whatever they wrote.
    async fn apply(&mut self, actions: Vec<Action>) -> Result<Flow, ConnectionError> {
        let mut flow = Flow::Continue;
        for action in actions {
            match action {
                Action::Send(packet) => self.write_packet(&packet)?,
                Action::EnableCompression(threshold) => {
                    self.codec.set_compression_threshold(Some(threshold));
                }
                Action::EnableEncryption(secret) => {
                    let mut cipher = StreamCipher::new(&secret);
                    // Bytes read together with the response are already ciphertext.
                    cipher.decrypt(self.codec.buffered_mut());
                    self.cipher = Some(cipher);
                }
                Action::Dispatch(target, message) => {
                    if let Err(e) = self.ctx.router.route(target, message) {
                        let e = ConnectionError::from(e);
                        if e.is_fatal() {
                            return Err(e);
                        }
                        warn!("{}: dropped message for {target}: {e}", self.conn.addr());
                    }
                }
                Action::Close => {
                    flow = Flow::Close;
                    break;
                }
            }
        }
        self.flush().await?;
        Ok(flow)
    }

    /// Frame `packet` under the current compression setting and encrypt it
    /// under the current cipher.
    fn write_packet(&mut self, packet: &GamePacket) -> Result<(), ConnectionError> {
        trace!("{} -> {}", self.conn.addr(), packet.name());
        let start = self.write_buf.len();
        self.codec.encode(packet, &mut self.write_buf)?;
        if let Some(cipher) = &mut self.cipher {
            cipher.encrypt(&mut self.write_buf[start..]);
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ConnectionError> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        self.stream.write_all(&self.write_buf).await?;
        self.write_buf.clear();
        self.stream.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{config, harness, harness_with, Harness};
    use crate::handler::{PlayHandler, PlayMessage};
    use mc_rs_crypto::{encrypt_with_public_key, SessionSecret};
    use mc_rs_dispatch::{HandlerResult, ObjectId, WorkerContext, WorkerHandler, WorkerId};
    use mc_rs_proto::packets::*;
    use mc_rs_proto::{ConnectionState, PacketRegistry};
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;

    const TIMEOUT: Duration = Duration::from_secs(10);

    /// Client half of the protocol, enough to drive the server.
    struct TestClient {
        stream: DuplexStream,
        codec: FrameCodec,
        cipher: Option<StreamCipher>,
        state: ConnectionState,
        registry: PacketRegistry,
    }

    impl TestClient {
        async fn send(&mut self, packet: impl Into<GamePacket>) {
            let mut buf = BytesMut::new();
            self.codec.encode(&packet.into(), &mut buf).unwrap();
            if let Some(cipher) = &mut self.cipher {
                cipher.encrypt(&mut buf);
            }
            self.stream.write_all(&buf).await.unwrap();
        }

        async fn recv(&mut self) -> GamePacket {
            loop {
                if let Some(frame) = self.codec.next_frame().unwrap() {
                    let packet = self
                        .registry
                        .decode(self.state, Direction::Outbound, frame)
                        .unwrap();
                    if let GamePacket::SetCompression(p) = &packet {
                        self.codec
                            .set_compression_threshold(usize::try_from(p.threshold).ok());
                    }
                    return packet;
                }
                let mut buf = [0u8; 4096];
                let n = tokio::time::timeout(TIMEOUT, self.stream.read(&mut buf))
                    .await
                    .expect("timed out waiting for the server")
                    .unwrap();
                assert!(n > 0, "server closed the connection");
                let data = &mut buf[..n];
                if let Some(cipher) = &mut self.cipher {
                    cipher.decrypt(data);
                }
                self.codec.push(data);
            }
        }

        /// True once the server has closed its end.
        async fn closed(&mut self) -> bool {
            let mut buf = [0u8; 64];
            matches!(
                tokio::time::timeout(TIMEOUT, self.stream.read(&mut buf)).await,
                Ok(Ok(0))
            )
        }
    }

    fn start(h: &Harness) -> (TestClient, JoinHandle<()>, watch::Sender<bool>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let addr: SocketAddr = "127.0.0.1:51000".parse().unwrap();
        let transport = Transport::new(server, addr, h.ctx.clone());
        let task = tokio::spawn(transport.run(shutdown_rx));
        let client = TestClient {
            stream: client,
            codec: FrameCodec::default(),
            cipher: None,
            state: ConnectionState::Handshake,
            registry: PacketRegistry::standard().unwrap(),
        };
        (client, task, shutdown_tx)
    }

    fn handshake(next_state: i32) -> Handshake {
        Handshake {
            protocol_version: PROTOCOL_VERSION,
            server_address: "localhost".into(),
            server_port: 25565,
            next_state,
        }
    }

    /// Reports which worker saw each message before handing it on.
    struct Recorder {
        inner: PlayHandler,
        seen: std::sync::mpsc::Sender<(WorkerId, ObjectId, PlayMessage)>,
    }

    impl WorkerHandler<PlayMessage> for Recorder {
        fn handle(
            &mut self,
            ctx: &WorkerContext<'_, PlayMessage>,
            target: ObjectId,
            message: PlayMessage,
        ) -> HandlerResult {
            let _ = self.seen.send((ctx.worker_id(), target, message.clone()));
            self.inner.handle(ctx, target, message)
        }
    }

    #[tokio::test]
    async fn status_probe() {
        let h = harness(config(false, 256));
        let (mut client, task, _shutdown) = start(&h);

        client.send(handshake(1)).await;
        client.state = ConnectionState::Status;
        client.send(StatusRequest).await;
        let GamePacket::StatusResponse(resp) = client.recv().await else {
            panic!("expected a status response");
        };
        assert!(resp.json.contains("\"protocol\":47"));

        client.send(StatusPing { payload: 99 }).await;
        assert!(matches!(client.recv().await, GamePacket::StatusPong(_)));
        assert!(client.closed().await);
        tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn encrypted_login_and_ordered_chat() {
        let (seen_tx, seen_rx) = std::sync::mpsc::channel();
        let h = harness_with(config(true, 64), |sessions| Recorder {
            inner: PlayHandler::new(sessions),
            seen: seen_tx.clone(),
        });
        let (mut client, task, _shutdown) = start(&h);

        client.send(handshake(2)).await;
        client.state = ConnectionState::Login;
        client
            .send(LoginStart {
                name: "Tester".into(),
            })
            .await;

        let GamePacket::EncryptionRequest(request) = client.recv().await else {
            panic!("expected an encryption request");
        };
        let secret = SessionSecret::random();
        client
            .send(EncryptionResponse {
                shared_secret: encrypt_with_public_key(&request.public_key, secret.as_bytes())
                    .unwrap()
                    .into(),
                verify_token: encrypt_with_public_key(&request.public_key, &request.verify_token)
                    .unwrap()
                    .into(),
            })
            .await;
        client.cipher = Some(StreamCipher::new(&secret));

        assert_eq!(
            client.recv().await,
            SetCompression { threshold: 64 }.into()
        );
        let GamePacket::LoginSuccess(success) = client.recv().await else {
            panic!("expected LoginSuccess");
        };
        assert_eq!(success.username, "Tester");
        client.state = ConnectionState::Play;
        assert!(matches!(client.recv().await, GamePacket::JoinGame(_)));
        assert_eq!(
            client.recv().await,
            ChatBroadcast::system("Tester joined the game").into()
        );

        let long = "x".repeat(90);
        let messages = ["one", "two", "three", long.as_str()];
        for message in messages {
            client
                .send(ChatMessage {
                    message: message.into(),
                })
                .await;
        }
        for message in messages {
            assert_eq!(
                client.recv().await,
                ChatBroadcast::chat(&format!("<Tester> {message}")).into()
            );
        }

        // Every message ran on the worker owning the player, in send order.
        let records: Vec<_> = seen_rx.try_iter().collect();
        assert_eq!(records.len(), 1 + messages.len());
        let (worker, player, _) = &records[0];
        assert_eq!(*worker, WorkerId(0));
        assert!(matches!(records[0].2, PlayMessage::Join { .. }));
        for ((w, target, message), expected) in records[1..].iter().zip(messages) {
            assert_eq!(w, worker);
            assert_eq!(target, player);
            assert_eq!(
                message,
                &PlayMessage::Chat {
                    message: expected.into()
                }
            );
        }

        let player = *player;
        drop(client);
        tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();
        assert!(h.ctx.sessions.is_empty());
        let deadline = tokio::time::Instant::now() + TIMEOUT;
        while h.ctx.router.owner(player).is_some() {
            assert!(tokio::time::Instant::now() < deadline, "player never released");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn framing_error_closes_connection() {
        let h = harness(config(false, 256));
        let (mut client, task, _shutdown) = start(&h);
        // Zero-length frame.
        client.stream.write_all(&[0x00]).await.unwrap();
        assert!(client.closed().await);
        tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bad_username_gets_disconnect() {
        let h = harness(config(false, 256));
        let (mut client, task, _shutdown) = start(&h);
        client.send(handshake(2)).await;
        client.state = ConnectionState::Login;
        client
            .send(LoginStart {
                name: "no spaces".into(),
            })
            .await;
        assert_eq!(
            client.recv().await,
            LoginDisconnect::with_message("Invalid username").into()
        );
        assert!(client.closed().await);
        tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_kicks_players() {
        let h = harness(config(false, -1));
        let (mut client, task, shutdown) = start(&h);
        client.send(handshake(2)).await;
        client.state = ConnectionState::Login;
        client.send(LoginStart { name: "Steve".into() }).await;
        assert!(matches!(client.recv().await, GamePacket::LoginSuccess(_)));
        client.state = ConnectionState::Play;

        // Skip JoinGame and the join broadcast.
        shutdown.send(true).unwrap();
        let reason = loop {
            if let GamePacket::PlayDisconnect(d) = client.recv().await {
                break d.reason;
            }
        };
        assert_eq!(reason, text_component("Server closed"));
        tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();
        assert!(h.ctx.sessions.is_empty());
    }

    #[tokio::test]
    async fn play_packets_before_play_close_connection() {
        let h = harness(config(false, 256));

        let (mut client, task, _shutdown) = start(&h);
        client.send(ChatMessage { message: "early".into() }).await;
        assert!(client.closed().await);
        tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();

        let (mut client, task, _shutdown) = start(&h);
        client.send(handshake(2)).await;
        client.state = ConnectionState::Login;
        client
            .send(PlayerPosition {
                x: 0.0,
                y: 64.0,
                z: 0.0,
                on_ground: true,
            })
            .await;
        assert!(matches!(
            client.recv().await,
            GamePacket::LoginDisconnect(_)
        ));
        assert!(client.closed().await);
        tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();
        assert!(h.ctx.sessions.is_empty());
        assert_eq!(h.ctx.sessions.claimed(), 0);
    }

    #[tokio::test]
    async fn stalled_login_times_out() {
        let mut cfg = config(true, -1);
        cfg.network.login_timeout_secs = 1;
        let h = harness(cfg);

        // Never sends a byte.
        let (mut client, task, _shutdown) = start(&h);
        assert!(client.closed().await);
        tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();

        // Never answers the encryption request.
        let (mut client, task, _shutdown) = start(&h);
        client.send(handshake(2)).await;
        client.state = ConnectionState::Login;
        client.send(LoginStart { name: "Notch".into() }).await;
        assert!(matches!(
            client.recv().await,
            GamePacket::EncryptionRequest(_)
        ));
        assert_eq!(
            client.recv().await,
            LoginDisconnect::with_message("Timed out").into()
        );
        assert!(client.closed().await);
        tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();
        assert_eq!(h.ctx.sessions.claimed(), 0);
    }
}
