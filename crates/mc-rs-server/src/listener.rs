//! TCP accept loop and world ticking.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::context::ServerContext;
use crate::transport::Transport;

/// One simulation tick (20 per second).
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

pub struct Listener {
    socket: TcpListener,
    ctx: Arc<ServerContext>,
}

impl Listener {
    /// Bind the configured address and port.
    pub async fn bind(ctx: Arc<ServerContext>) -> std::io::Result<Self> {
        let server = &ctx.config.server;
        let socket = TcpListener::bind((server.address.as_str(), server.port)).await?;
        info!("Listening on {}", socket.local_addr()?);
        Ok(Self { socket, ctx })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Accept clients and tick worlds until shutdown. Returns once every
    /// connection task has finished.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut connections = JoinSet::new();
        let mut tick_interval = tokio::time::interval(TICK_INTERVAL);

        loop {
            tokio::select! {
                accepted = self.socket.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            debug!("Accepted connection from {addr}");
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!("{addr}: could not set TCP_NODELAY: {e}");
                            }
                            let transport = Transport::new(stream, addr, Arc::clone(&self.ctx));
                            connections.spawn(transport.run(shutdown.clone()));
                        }
                        Err(e) => warn!("TCP accept error: {e}"),
                    }
                }
                _ = tick_interval.tick() => {
                    self.ctx.tick_worlds();
                }
                Some(finished) = connections.join_next() => {
                    if let Err(e) = finished {
                        warn!("Connection task failed: {e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Listener shutting down");
                        break;
                    }
                }
            }
        }

        // Open connections saw the same signal and are kicking their clients.
        while let Some(finished) = connections.join_next().await {
            if let Err(e) = finished {
                warn!("Connection task failed: {e}");
            }
        }
    }
}
