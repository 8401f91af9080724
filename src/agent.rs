//! Agent process: query perception, report state, apply the returned move.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{sleep, timeout, Instant};

use crate::config::AgentSettings;
use crate::error::{Error, Result};
use crate::perception::server::MAX_DATAGRAM;
use crate::protocol::{
    AgentId, CommandPayload, Envelope, FrameBuffer, Move, Neighborhood, PerceptionQuery,
    PerceptionResponse, Point, StatePayload,
};

/// Order in which unit moves are checked against the window.
const CANDIDATE_MOVES: [Move; 4] = [Move::RIGHT, Move::LEFT, Move::DOWN, Move::UP];

/// Unit moves whose target cell is neither a wall nor occupied.
pub fn allowed_moves(window: &Neighborhood) -> Vec<Move> {
    CANDIDATE_MOVES
        .iter()
        .copied()
        .filter(|m| {
            window
                .at(m.dx, m.dy)
                .map_or(false, |cell| !cell.is_wall() && !cell.occupied)
        })
        .collect()
}

/// Agent-local bookkeeping for what has already been told to the
/// coordination service.
#[derive(Debug, Default)]
pub struct Reporter {
    reported_goals: HashSet<Point>,
    known_goals: Option<Vec<Point>>,
    goals_sent: bool,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the state report for standing at `pos` with `response` in hand.
    ///
    /// A goal is reported at most once per coordinate, and the goal list is
    /// attached only to the first report after it became known.
    pub fn build_state(
        &mut self,
        agent_id: AgentId,
        pos: Point,
        response: &PerceptionResponse,
    ) -> StatePayload {
        if self.known_goals.is_none() && !response.goals.is_empty() {
            self.known_goals = Some(response.goals.clone());
        }

        let goal_found = response.is_goal_here && self.reported_goals.insert(pos);

        let known_goals = match &self.known_goals {
            Some(goals) if !self.goals_sent => {
                self.goals_sent = true;
                Some(goals.clone())
            }
            _ => None,
        };

        StatePayload {
            agent_id,
            x: pos.x,
            y: pos.y,
            allowed_moves: allowed_moves(&response.neighborhood),
            last_neighborhood: Some(response.neighborhood),
            goal_found,
            goal_x: if goal_found { pos.x } else { 0 },
            goal_y: if goal_found { pos.y } else { 0 },
            known_goals,
        }
    }

    pub fn reported_goals(&self) -> &HashSet<Point> {
        &self.reported_goals
    }
}

/// Framed stream to the coordination service.
pub struct CommandLink {
    stream: TcpStream,
    rx: FrameBuffer,
    agent_id: AgentId,
}

impl CommandLink {
    /// Connect, retrying every `retry` until the service is up.
    pub async fn connect(addr: SocketAddr, agent_id: AgentId, retry: Duration) -> Self {
        loop {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    return Self {
                        stream,
                        rx: FrameBuffer::new(),
                        agent_id,
                    };
                }
                Err(e) => {
                    tracing::debug!("Coordination service at {} not reachable: {}", addr, e);
                    sleep(retry).await;
                }
            }
        }
    }

    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let frame = envelope.to_frame()?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    /// Next command, already buffered or arriving within `wait`.
    ///
    /// `Ok(None)` on timeout. A closed stream or a malformed frame is an
    /// error.
    pub async fn next_command(&mut self, wait: Duration) -> Result<Option<CommandPayload>> {
        let deadline = Instant::now() + wait;
        let mut buf = [0u8; 4096];

        loop {
            while let Some(frame) = self.rx.try_extract()? {
                match Envelope::from_bytes(&frame)? {
                    Envelope::Command(cmd) => return Ok(Some(cmd)),
                    Envelope::Finished { note } => {
                        return Ok(Some(CommandPayload {
                            agent_id: self.agent_id,
                            mv: Move::STAY,
                            finished: true,
                            note,
                        }))
                    }
                    other => tracing::debug!("Ignoring {} from coordination service", other.kind()),
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            match timeout(remaining, self.stream.read(&mut buf)).await {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => return Err(Error::ConnectionClosed),
                Ok(Ok(n)) => self.rx.extend(&buf[..n]),
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Wait for a command over several bounded attempts.
    pub async fn wait_for_command(
        &mut self,
        attempts: u32,
        per_attempt: Duration,
    ) -> Result<Option<CommandPayload>> {
        for _ in 0..attempts {
            if let Some(cmd) = self.next_command(per_attempt).await? {
                return Ok(Some(cmd));
            }
        }
        Ok(None)
    }

    pub async fn shutdown(mut self) {
        let _ = self.stream.shutdown().await;
    }
}

/// One query/response exchange with the perception service.
///
/// `Ok(None)` when nothing usable came back within `wait`.
pub async fn query_perception(
    socket: &UdpSocket,
    addr: SocketAddr,
    query: &PerceptionQuery,
    wait: Duration,
) -> Result<Option<PerceptionResponse>> {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    // answers to earlier, timed-out queries
    while socket.try_recv_from(&mut buf).is_ok() {}

    match socket.send_to(&query.to_bytes()?, addr).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
        Err(e) => {
            tracing::debug!("Query to {} failed: {}", addr, e);
            return Ok(None);
        }
    }

    let (n, _) = match timeout(wait, socket.recv_from(&mut buf)).await {
        Ok(Ok(received)) => received,
        Ok(Err(e)) => {
            tracing::debug!("No perception reply: {}", e);
            return Ok(None);
        }
        Err(_) => return Ok(None),
    };

    match PerceptionResponse::from_bytes(&buf[..n]) {
        Ok(response) => Ok(Some(response)),
        Err(e) => {
            tracing::warn!("Undecodable perception reply: {}", e);
            Ok(None)
        }
    }
}

/// Addresses of the two services as seen by an agent.
#[derive(Debug, Clone, Copy)]
pub struct Endpoints {
    pub perception: SocketAddr,
    pub coordination: SocketAddr,
}

/// Run one agent until the coordination service announces the finish.
pub async fn run_agent(agent_id: AgentId, endpoints: Endpoints, settings: &AgentSettings) -> Result<()> {
    let start = Point::new(0, 0);
    let udp = UdpSocket::bind("0.0.0.0:0").await?;

    tracing::info!(
        "Agent#{} perception -> {}, coordination -> {}",
        agent_id,
        endpoints.perception,
        endpoints.coordination
    );

    let mut link = CommandLink::connect(
        endpoints.coordination,
        agent_id,
        Duration::from_millis(settings.connect_retry_ms),
    )
    .await;
    tracing::info!("Agent#{} connected, sending hello", agent_id);
    link.send(&Envelope::hello(agent_id, start)).await?;

    let ack = link
        .wait_for_command(settings.ack_attempts, Duration::from_millis(settings.ack_wait_ms))
        .await?;
    match ack {
        Some(cmd) if cmd.finished => {
            tracing::info!("Agent#{} search already finished ({})", agent_id, cmd.note);
            link.shutdown().await;
            return Ok(());
        }
        Some(cmd) => tracing::info!("Agent#{} server ack: cmd {} note={}", agent_id, cmd.mv, cmd.note),
        None => tracing::warn!("Agent#{} got no ack, continuing", agent_id),
    }

    let query_wait = Duration::from_millis(settings.query_timeout_ms);
    let command_wait = Duration::from_millis(settings.command_timeout_ms);
    let step_delay = Duration::from_millis(settings.step_delay_ms);

    let mut reporter = Reporter::new();
    let mut pos = start;
    let mut steps: u64 = 0;

    loop {
        steps += 1;

        let query = PerceptionQuery {
            agent_id,
            x: pos.x,
            y: pos.y,
        };
        let Some(response) = query_perception(&udp, endpoints.perception, &query, query_wait).await? else {
            tracing::warn!("Agent#{} no perception response, retrying", agent_id);
            continue;
        };

        let state = reporter.build_state(agent_id, pos, &response);
        if let Some(goal) = state.reported_goal() {
            tracing::info!("Agent#{} GOAL REACHED at {} in {} steps", agent_id, goal, steps);
        }
        link.send(&Envelope::State(state)).await?;

        let cmd = match link.next_command(command_wait).await? {
            Some(cmd) => cmd,
            None => {
                tracing::warn!("Agent#{} no command (timeout)", agent_id);
                continue;
            }
        };

        if cmd.finished {
            tracing::info!("Agent#{} FINISH received, note={}", agent_id, cmd.note);
            break;
        }

        pos = pos.checked_step(cmd.mv).ok_or_else(|| {
            Error::Protocol(format!("move {} from {} leaves the coordinate space", cmd.mv, pos))
        })?;
        tracing::info!("Agent#{} step {}: move {} -> {}", agent_id, steps, cmd.mv, pos);

        sleep(step_delay).await;
    }

    link.shutdown().await;
    Ok(())
}
