//! UDP front end of the perception service.

use std::net::SocketAddr;

use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::time::{interval, MissedTickBehavior};

use crate::config::PerceptionSettings;
use crate::error::Result;
use crate::protocol::PerceptionQuery;
use crate::render;

use super::service::PerceptionService;

/// Largest datagram read from the socket.
pub const MAX_DATAGRAM: usize = 4096;

// Query log sampling: one line per this many queries.
const LOG_EVERY: u64 = 5;

pub struct PerceptionServer {
    socket: UdpSocket,
    service: PerceptionService,
    settings: PerceptionSettings,
    render: bool,
    dirty: bool,
}

impl PerceptionServer {
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        service: PerceptionService,
        settings: PerceptionSettings,
        render: bool,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            service,
            settings,
            render,
            dirty: true,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Answer queries one datagram at a time until the task is dropped.
    pub async fn run(mut self) -> Result<()> {
        let maze = self.service.maze();
        tracing::info!(
            "Perception service listening on {} ({}x{} maze, start={}, {} goals)",
            self.socket.local_addr()?,
            maze.width(),
            maze.height(),
            maze.start(),
            maze.goals().len()
        );

        let mut tick = interval(self.settings.tick());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((n, peer)) => self.on_datagram(&buf[..n], peer).await,
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    // ICMP port-unreachable from a departed agent surfaces here
                    Err(e) => tracing::debug!("recv_from failed: {}", e),
                },
                _ = tick.tick() => self.housekeeping(),
            }
        }
    }

    async fn on_datagram(&mut self, bytes: &[u8], peer: SocketAddr) {
        let query = match PerceptionQuery::from_bytes(bytes) {
            Ok(query) => query,
            Err(e) => {
                tracing::warn!("Bad packet from {} ({} bytes): {}", peer, bytes.len(), e);
                return;
            }
        };

        let response = self.service.query(query.agent_id, query.x, query.y);
        self.dirty = true;

        let out = match response.to_bytes() {
            Ok(out) => out,
            Err(e) => {
                tracing::error!("Could not encode response for {}: {}", peer, e);
                return;
            }
        };
        if let Err(e) = self.socket.send_to(&out, peer).await {
            tracing::warn!("Reply to {} failed: {}", peer, e);
            return;
        }

        if self.service.query_count() % LOG_EVERY == 0 {
            tracing::debug!(
                "Agent#{} at ({},{}) -> window sent to {}",
                query.agent_id,
                query.x,
                query.y,
                peer
            );
        }
    }

    fn housekeeping(&mut self) {
        if self.render && self.dirty {
            render::redraw(&render::render_maze(&self.service));
            self.dirty = false;
        }
    }
}
