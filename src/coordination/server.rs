//! TCP front end of the coordination service.
//!
//! One loop owns the coordinator and every connection record. Per-connection
//! reader tasks only forward raw byte chunks; writer tasks only drain an
//! outbox of ready-made frames. Framing, decoding and every state change
//! happen inside the loop, one chunk at a time.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::CoordinationSettings;
use crate::error::Result;
use crate::protocol::{Envelope, FrameBuffer};
use crate::render;

use super::coordinator::{ConnId, Coordinator, Outbound};

const READ_CHUNK: usize = 4096;
const EVENT_QUEUE: usize = 256;

/// What a reader or writer task reports back to the loop.
#[derive(Debug)]
enum ConnEvent {
    Data(ConnId, Vec<u8>),
    Closed(ConnId),
    Failed(ConnId, std::io::Error),
}

struct Connection {
    peer: SocketAddr,
    rx: FrameBuffer,
    outbox: mpsc::UnboundedSender<Vec<u8>>,
    reader: JoinHandle<()>,
}

/// State owned by the loop.
struct Hub {
    coordinator: Coordinator,
    connections: HashMap<ConnId, Connection>,
    next_conn: ConnId,
    events: mpsc::Sender<ConnEvent>,
    render: bool,
    dirty: bool,
}

pub struct CoordinationServer {
    listener: TcpListener,
    events: mpsc::Receiver<ConnEvent>,
    settings: CoordinationSettings,
    hub: Hub,
}

impl CoordinationServer {
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        settings: CoordinationSettings,
        render: bool,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let (tx, rx) = mpsc::channel(EVENT_QUEUE);

        Ok(Self {
            listener,
            events: rx,
            settings,
            hub: Hub {
                coordinator: Coordinator::new(),
                connections: HashMap::new(),
                next_conn: 1,
                events: tx,
                render,
                dirty: true,
            },
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the task is dropped.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(
            "Coordination service listening on {}",
            self.listener.local_addr()?
        );

        let mut tick = interval(self.settings.tick());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.hub.accept(stream, peer),
                    Err(e) => tracing::warn!("Accept failed: {}", e),
                },
                Some(event) = self.events.recv() => self.hub.on_event(event),
                _ = tick.tick() => self.hub.housekeeping(),
            }
        }
    }
}

impl Hub {
    fn accept(&mut self, stream: TcpStream, peer: SocketAddr) {
        let conn = self.next_conn;
        self.next_conn += 1;

        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        let (outbox, queued) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(conn, read_half, self.events.clone()));
        tokio::spawn(write_loop(conn, write_half, queued, self.events.clone()));

        self.connections.insert(
            conn,
            Connection {
                peer,
                rx: FrameBuffer::new(),
                outbox,
                reader,
            },
        );
        self.coordinator.connect(conn);
        self.dirty = true;

        tracing::info!("Connection {} accepted from {}", conn, peer);
    }

    fn on_event(&mut self, event: ConnEvent) {
        match event {
            ConnEvent::Data(conn, bytes) => self.on_data(conn, &bytes),
            ConnEvent::Closed(conn) => {
                tracing::info!("Connection {} closed by peer", conn);
                self.close(conn);
            }
            ConnEvent::Failed(conn, e) => {
                tracing::warn!("Connection {} failed: {}", conn, e);
                self.close(conn);
            }
        }
    }

    /// Buffer a chunk and drain every complete frame in it.
    fn on_data(&mut self, conn: ConnId, bytes: &[u8]) {
        match self.connections.get_mut(&conn) {
            Some(c) => c.rx.extend(bytes),
            // late chunk from a connection that is already gone
            None => return,
        }

        loop {
            let frame = match self.connections.get_mut(&conn).map(|c| c.rx.try_extract()) {
                None | Some(Ok(None)) => return,
                Some(Ok(Some(frame))) => frame,
                Some(Err(e)) => {
                    tracing::warn!("Bad frame on connection {}: {} -> closing", conn, e);
                    self.close(conn);
                    return;
                }
            };

            let envelope = match Envelope::from_bytes(&frame) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!("Undecodable envelope on connection {}: {} -> closing", conn, e);
                    self.close(conn);
                    return;
                }
            };

            tracing::trace!("Connection {} -> {}", conn, envelope.kind());
            match self.coordinator.handle(conn, envelope) {
                Ok(out) => {
                    self.dirty = true;
                    self.deliver(out);
                }
                Err(e) => {
                    tracing::warn!("Connection {}: {} -> closing", conn, e);
                    self.close(conn);
                    return;
                }
            }
        }
    }

    fn deliver(&mut self, out: Vec<Outbound>) {
        for Outbound { conn, envelope } in out {
            let Some(c) = self.connections.get(&conn) else {
                continue;
            };
            match envelope.to_frame() {
                Ok(frame) => {
                    if c.outbox.send(frame).is_err() {
                        tracing::debug!("Writer for connection {} already gone", conn);
                    }
                }
                Err(e) => tracing::error!("Could not encode {} for {}: {}", envelope.kind(), c.peer, e),
            }
        }
    }

    fn close(&mut self, conn: ConnId) {
        if let Some(c) = self.connections.remove(&conn) {
            c.reader.abort();
            // dropping the outbox lets the writer flush and shut down
            drop(c.outbox);
            tracing::debug!("Dropped connection {} ({})", conn, c.peer);
        }
        if let Some(session) = self.coordinator.disconnect(conn) {
            if let Some(agent) = session.agent_id {
                tracing::info!("Agent#{} left", agent);
            }
        }
        self.dirty = true;
    }

    fn housekeeping(&mut self) {
        if self.render && self.dirty {
            render::redraw(&render::render_status(&self.coordinator));
            self.dirty = false;
        }
    }
}

async fn read_loop(conn: ConnId, mut reader: OwnedReadHalf, events: mpsc::Sender<ConnEvent>) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let event = match reader.read(&mut buf).await {
            Ok(0) => ConnEvent::Closed(conn),
            Ok(n) => ConnEvent::Data(conn, buf[..n].to_vec()),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(e) => ConnEvent::Failed(conn, e),
        };

        let done = !matches!(event, ConnEvent::Data(..));
        if events.send(event).await.is_err() || done {
            return;
        }
    }
}

async fn write_loop(
    conn: ConnId,
    mut writer: OwnedWriteHalf,
    mut queued: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::Sender<ConnEvent>,
) {
    while let Some(frame) = queued.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            let _ = events.send(ConnEvent::Failed(conn, e)).await;
            return;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CommandPayload, Move, Point};
    use std::time::Duration;
    use tokio::time::timeout;

    async fn start() -> SocketAddr {
        let server = CoordinationServer::bind("127.0.0.1:0", CoordinationSettings::default(), false)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    async fn read_command(stream: &mut TcpStream, rx: &mut FrameBuffer) -> Option<CommandPayload> {
        let mut buf = [0u8; 1024];
        loop {
            if let Some(frame) = rx.try_extract().unwrap() {
                return match Envelope::from_bytes(&frame).unwrap() {
                    Envelope::Command(cmd) => Some(cmd),
                    _ => None,
                };
            }
            let n = timeout(Duration::from_secs(2), stream.read(&mut buf))
                .await
                .ok()?
                .ok()?;
            if n == 0 {
                return None;
            }
            rx.extend(&buf[..n]);
        }
    }

    #[tokio::test]
    async fn test_hello_and_state_split_across_writes() {
        let addr = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut rx = FrameBuffer::new();

        // hello and the first half of a state frame in one write
        let hello = Envelope::hello(1, Point::new(0, 0)).to_frame().unwrap();
        let state = Envelope::State(crate::protocol::StatePayload {
            agent_id: 1,
            x: 0,
            y: 0,
            allowed_moves: vec![Move::DOWN],
            last_neighborhood: None,
            goal_found: false,
            goal_x: 0,
            goal_y: 0,
            known_goals: None,
        })
        .to_frame()
        .unwrap();
        let (head, tail) = state.split_at(state.len() / 2);

        let mut first = hello.clone();
        first.extend_from_slice(head);
        stream.write_all(&first).await.unwrap();

        let ack = read_command(&mut stream, &mut rx).await.unwrap();
        assert_eq!(ack.note, "ACK");

        stream.write_all(tail).await.unwrap();
        let step = read_command(&mut stream, &mut rx).await.unwrap();
        assert_eq!(step.note, "dfs");
        assert_eq!(step.mv, Move::DOWN);
    }

    #[tokio::test]
    async fn test_bad_length_closes_only_that_connection() {
        let addr = start().await;

        let mut bad = TcpStream::connect(addr).await.unwrap();
        bad.write_all(&0i32.to_le_bytes()).await.unwrap();
        let mut buf = [0u8; 16];
        let n = timeout(Duration::from_secs(2), bad.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0, "server should close the offending connection");

        let mut good = TcpStream::connect(addr).await.unwrap();
        good.write_all(&Envelope::hello(2, Point::new(0, 0)).to_frame().unwrap())
            .await
            .unwrap();
        let mut rx = FrameBuffer::new();
        let ack = read_command(&mut good, &mut rx).await.unwrap();
        assert_eq!(ack.agent_id, 2);
    }
}
