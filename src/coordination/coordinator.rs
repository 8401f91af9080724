//! Coordination state machine: one explorer per connection, a shared goal
//! ledger, and the global finish latch.
//!
//! The coordinator does no I/O. The server loop feeds it one decoded
//! envelope at a time and writes out whatever [`Outbound`] messages it
//! returns, so every transition can be exercised directly in tests.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::protocol::envelope::{NOTE_ACK, NOTE_DFS};
use crate::protocol::{AgentId, Envelope, HelloPayload, Move, Point, StatePayload};

use super::explorer::Explorer;

/// Stable handle assigned to a connection when it is accepted.
pub type ConnId = u64;

/// Per-connection record. `explorer` is `None` until the agent says hello.
#[derive(Debug, Default)]
pub struct Session {
    pub agent_id: Option<AgentId>,
    pub position: Point,
    pub last_move: Move,
    explorer: Option<Explorer>,
}

impl Session {
    pub fn is_tracking(&self) -> bool {
        self.explorer.is_some()
    }

    pub fn explorer(&self) -> Option<&Explorer> {
        self.explorer.as_ref()
    }

    fn start(&mut self, hello: &HelloPayload) {
        let start = Point::new(hello.start_x, hello.start_y);
        self.agent_id = Some(hello.agent_id);
        self.position = start;
        self.last_move = Move::STAY;
        self.explorer = Some(Explorer::new(start));
    }
}

/// A message the server loop must write to `conn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub conn: ConnId,
    pub envelope: Envelope,
}

#[derive(Debug, Default)]
pub struct Coordinator {
    sessions: BTreeMap<ConnId, Session>,
    expected_goals: Option<Vec<Point>>,
    found_by: HashMap<Point, AgentId>,
    finished: bool,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, conn: ConnId) {
        self.sessions.insert(conn, Session::default());
    }

    /// Drop everything known about `conn`.
    pub fn disconnect(&mut self, conn: ConnId) -> Option<Session> {
        self.sessions.remove(&conn)
    }

    pub fn sessions(&self) -> &BTreeMap<ConnId, Session> {
        &self.sessions
    }

    pub fn session(&self, conn: ConnId) -> Option<&Session> {
        self.sessions.get(&conn)
    }

    pub fn expected_goals(&self) -> Option<&[Point]> {
        self.expected_goals.as_deref()
    }

    /// Agent credited with `goal`, if anyone reported it.
    pub fn found_by(&self, goal: Point) -> Option<AgentId> {
        self.found_by.get(&goal).copied()
    }

    /// Number of distinct goal cells reported, declared or not.
    pub fn reported_count(&self) -> usize {
        self.found_by.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Process one envelope from `conn`.
    ///
    /// An `Err` is a protocol violation: the caller closes the connection
    /// and calls [`Coordinator::disconnect`].
    pub fn handle(&mut self, conn: ConnId, envelope: Envelope) -> Result<Vec<Outbound>> {
        if self.finished {
            tracing::trace!("Ignoring {} from connection {} after finish", envelope.kind(), conn);
            return Ok(Vec::new());
        }

        match envelope {
            Envelope::Hello(hello) => self.on_hello(conn, &hello),
            Envelope::State(state) => self.on_state(conn, state),
            other => Err(Error::Protocol(format!(
                "agent sent a {} envelope",
                other.kind()
            ))),
        }
    }

    fn on_hello(&mut self, conn: ConnId, hello: &HelloPayload) -> Result<Vec<Outbound>> {
        let session = self.session_mut(conn)?;
        if session.is_tracking() {
            tracing::debug!("Connection {} re-sent hello, resetting exploration", conn);
        }
        session.start(hello);

        tracing::info!(
            "Agent#{} joined on connection {} at ({},{})",
            hello.agent_id,
            conn,
            hello.start_x,
            hello.start_y
        );

        Ok(vec![Outbound {
            conn,
            envelope: Envelope::command(hello.agent_id, Move::STAY, NOTE_ACK),
        }])
    }

    fn on_state(&mut self, conn: ConnId, state: StatePayload) -> Result<Vec<Outbound>> {
        if !self.session_mut(conn)?.is_tracking() {
            return Err(Error::Protocol(format!(
                "state from connection {} before hello",
                conn
            )));
        }

        self.adopt_goals(state.known_goals.as_deref());
        if let Some(goal) = state.reported_goal() {
            self.record_goal(goal, state.agent_id);
        }

        let pos = state.position();
        let session = self.session_mut(conn)?;
        session.position = pos;
        let agent_id = session.agent_id.unwrap_or(state.agent_id);

        let mv = match session.explorer.as_mut() {
            Some(explorer) => {
                explorer.sync_to(pos);
                explorer.choose_move(pos, &state.allowed_moves)
            }
            None => Move::STAY,
        };
        session.last_move = mv;

        let mut out = vec![Outbound {
            conn,
            envelope: Envelope::command(agent_id, mv, NOTE_DFS),
        }];

        if self.all_goals_found() {
            self.finished = true;
            self.log_finish();
            out.extend(self.broadcast_finish());
        }

        Ok(out)
    }

    /// First non-empty goal list wins; later ones are ignored.
    fn adopt_goals(&mut self, goals: Option<&[Point]>) {
        if self.expected_goals.is_some() {
            return;
        }
        if let Some(goals) = goals.filter(|g| !g.is_empty()) {
            tracing::info!("Expecting {} goals", goals.len());
            self.expected_goals = Some(goals.to_vec());
        }
    }

    fn record_goal(&mut self, goal: Point, agent_id: AgentId) {
        match self.found_by.get(&goal) {
            Some(owner) => {
                tracing::debug!(
                    "Goal {} already credited to Agent#{}, ignoring report from Agent#{}",
                    goal,
                    owner,
                    agent_id
                );
            }
            None => {
                tracing::info!("Agent#{} found goal {}", agent_id, goal);
                self.found_by.insert(goal, agent_id);
            }
        }
    }

    fn all_goals_found(&self) -> bool {
        match self.expected_goals.as_deref() {
            Some(goals) if !goals.is_empty() => {
                goals.iter().all(|g| self.found_by.contains_key(g))
            }
            _ => false,
        }
    }

    fn broadcast_finish(&mut self) -> Vec<Outbound> {
        self.sessions
            .iter_mut()
            .map(|(conn, session)| {
                session.last_move = Move::STAY;
                Outbound {
                    conn: *conn,
                    envelope: Envelope::finish(session.agent_id.unwrap_or_default()),
                }
            })
            .collect()
    }

    fn log_finish(&self) {
        tracing::info!("All goals found, finishing search");
        for goal in self.expected_goals.iter().flatten() {
            match self.found_by(*goal) {
                Some(agent) => tracing::info!("  Goal {} -> Agent#{}", goal, agent),
                None => tracing::info!("  Goal {} -> (not reported)", goal),
            }
        }
    }

    fn session_mut(&mut self, conn: ConnId) -> Result<&mut Session> {
        self.sessions
            .get_mut(&conn)
            .ok_or_else(|| Error::Protocol(format!("unknown connection {}", conn)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CommandPayload;

    fn goals() -> Vec<Point> {
        vec![
            Point::new(7, 2),
            Point::new(0, 9),
            Point::new(4, 5),
            Point::new(8, 5),
        ]
    }

    fn state(agent_id: AgentId, pos: Point, allowed: Vec<Move>) -> StatePayload {
        StatePayload {
            agent_id,
            x: pos.x,
            y: pos.y,
            allowed_moves: allowed,
            last_neighborhood: None,
            goal_found: false,
            goal_x: 0,
            goal_y: 0,
            known_goals: None,
        }
    }

    fn with_goal(mut st: StatePayload, goal: Point) -> StatePayload {
        st.goal_found = true;
        st.goal_x = goal.x;
        st.goal_y = goal.y;
        st
    }

    fn joined(conns: &[(ConnId, AgentId)]) -> Coordinator {
        let mut c = Coordinator::new();
        for (conn, agent) in conns {
            c.connect(*conn);
            c.handle(*conn, Envelope::hello(*agent, Point::new(0, 0)))
                .unwrap();
        }
        c
    }

    fn command(out: &Outbound) -> &CommandPayload {
        match &out.envelope {
            Envelope::Command(cmd) => cmd,
            other => panic!("expected command, got {}", other.kind()),
        }
    }

    #[test]
    fn test_hello_is_acked() {
        let mut c = Coordinator::new();
        c.connect(1);
        let out = c.handle(1, Envelope::hello(4, Point::new(2, 3))).unwrap();

        assert_eq!(out.len(), 1);
        let cmd = command(&out[0]);
        assert_eq!(cmd.note, "ACK");
        assert_eq!(cmd.mv, Move::STAY);
        assert!(!cmd.finished);
        assert_eq!(cmd.agent_id, 4);

        let session = c.session(1).unwrap();
        assert_eq!(session.position, Point::new(2, 3));
        assert_eq!(session.explorer().unwrap().stack(), &[Point::new(2, 3)]);
    }

    #[test]
    fn test_state_before_hello_is_violation() {
        let mut c = Coordinator::new();
        c.connect(1);
        let st = state(1, Point::new(0, 0), vec![Move::RIGHT]);
        assert!(matches!(
            c.handle(1, Envelope::State(st)),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_command_from_agent_is_violation() {
        let mut c = joined(&[(1, 1)]);
        assert!(c.handle(1, Envelope::command(1, Move::RIGHT, "x")).is_err());
        assert!(c
            .handle(1, Envelope::Finished { note: "bye".into() })
            .is_err());
    }

    #[test]
    fn test_state_gets_dfs_move() {
        let mut c = joined(&[(1, 1)]);
        let out = c
            .handle(1, Envelope::State(state(1, Point::new(0, 0), vec![Move::DOWN, Move::RIGHT])))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(command(&out[0]).mv, Move::RIGHT);
        assert_eq!(command(&out[0]).note, "dfs");
        assert_eq!(c.session(1).unwrap().last_move, Move::RIGHT);
    }

    #[test]
    fn test_state_at_coordinate_limit_is_answered() {
        let mut c = joined(&[(1, 1)]);
        let edge = Point::new(i32::MAX, i32::MAX);

        let out = c
            .handle(1, Envelope::State(state(1, edge, vec![Move::RIGHT, Move::DOWN])))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(command(&out[0]).mv.is_stay());

        // the connection stays usable
        let out = c
            .handle(1, Envelope::State(state(1, edge, vec![Move::LEFT])))
            .unwrap();
        assert_eq!(command(&out[0]).mv, Move::LEFT);
    }

    #[test]
    fn test_explorers_are_isolated() {
        let mut c = joined(&[(1, 1), (2, 2)]);
        let a = c
            .handle(1, Envelope::State(state(1, Point::new(0, 0), vec![Move::RIGHT])))
            .unwrap();
        let b = c
            .handle(2, Envelope::State(state(2, Point::new(0, 0), vec![Move::RIGHT])))
            .unwrap();
        assert_eq!(command(&a[0]).mv, Move::RIGHT);
        assert_eq!(command(&b[0]).mv, Move::RIGHT);
    }

    #[test]
    fn test_goal_list_adopted_once() {
        let mut c = joined(&[(1, 1), (2, 2)]);
        let mut st = state(1, Point::new(0, 0), vec![]);
        st.known_goals = Some(vec![]);
        c.handle(1, Envelope::State(st)).unwrap();
        assert!(c.expected_goals().is_none());

        let mut st = state(1, Point::new(0, 0), vec![]);
        st.known_goals = Some(goals());
        c.handle(1, Envelope::State(st)).unwrap();

        let mut st = state(2, Point::new(0, 0), vec![]);
        st.known_goals = Some(vec![Point::new(1, 1)]);
        c.handle(2, Envelope::State(st)).unwrap();

        assert_eq!(c.expected_goals(), Some(goals().as_slice()));
    }

    #[test]
    fn test_goal_attribution_first_write_wins() {
        let mut c = joined(&[(1, 1), (2, 2)]);
        let g = Point::new(4, 5);

        c.handle(2, Envelope::State(with_goal(state(2, g, vec![]), g)))
            .unwrap();
        c.handle(1, Envelope::State(with_goal(state(1, g, vec![]), g)))
            .unwrap();
        c.handle(2, Envelope::State(with_goal(state(2, g, vec![]), g)))
            .unwrap();

        assert_eq!(c.found_by(g), Some(2));
        assert_eq!(c.reported_count(), 1);
    }

    #[test]
    fn test_undeclared_goal_does_not_count() {
        let mut c = joined(&[(1, 1)]);
        let mut st = state(1, Point::new(0, 0), vec![]);
        st.known_goals = Some(vec![Point::new(7, 2)]);
        c.handle(1, Envelope::State(st)).unwrap();

        let bogus = Point::new(3, 3);
        c.handle(1, Envelope::State(with_goal(state(1, bogus, vec![]), bogus)))
            .unwrap();
        assert_eq!(c.found_by(bogus), Some(1));
        assert!(!c.is_finished());
    }

    #[test]
    fn test_single_goal_does_not_finish() {
        let mut c = joined(&[(1, 1)]);
        let g = Point::new(7, 2);
        let mut st = with_goal(state(1, g, vec![Move::LEFT]), g);
        st.known_goals = Some(goals());
        let out = c.handle(1, Envelope::State(st)).unwrap();

        assert_eq!(out.len(), 1);
        assert!(!command(&out[0]).finished);
        assert!(!c.is_finished());
        assert_eq!(c.found_by(g), Some(1));
    }

    #[test]
    fn test_finish_latches_and_broadcasts_once() {
        let mut c = joined(&[(1, 1), (2, 2)]);
        c.connect(3); // connected, never said hello

        let all = goals();
        let mut st = state(1, Point::new(0, 0), vec![]);
        st.known_goals = Some(all.clone());
        c.handle(1, Envelope::State(st)).unwrap();

        for g in &all[..3] {
            let out = c
                .handle(2, Envelope::State(with_goal(state(2, *g, vec![]), *g)))
                .unwrap();
            assert_eq!(out.len(), 1);
            assert!(!c.is_finished());
        }

        let last = all[3];
        let out = c
            .handle(1, Envelope::State(with_goal(state(1, last, vec![Move::UP]), last)))
            .unwrap();
        assert!(c.is_finished());

        // reply to the reporter first, then one FINISH per connection
        assert_eq!(out[0].conn, 1);
        assert_eq!(command(&out[0]).note, "dfs");
        let finishes: Vec<_> = out[1..].iter().collect();
        assert_eq!(finishes.len(), 3);
        for f in &finishes {
            let cmd = command(f);
            assert!(cmd.finished);
            assert_eq!(cmd.note, "FINISH");
            assert_eq!(cmd.mv, Move::STAY);
        }
        let conns: Vec<ConnId> = finishes.iter().map(|f| f.conn).collect();
        assert_eq!(conns, vec![1, 2, 3]);

        // after the latch nothing is answered and nothing changes
        let g = Point::new(1, 1);
        let out = c
            .handle(2, Envelope::State(with_goal(state(2, g, vec![Move::RIGHT]), g)))
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(c.found_by(g), None);
        assert!(c.handle(3, Envelope::hello(3, Point::new(0, 0))).unwrap().is_empty());
        assert!(c.handle(2, Envelope::command(2, Move::UP, "x")).unwrap().is_empty());
    }

    #[test]
    fn test_disconnect_discards_state() {
        let mut c = joined(&[(1, 1)]);
        assert!(c.disconnect(1).is_some());
        assert!(c.session(1).is_none());
        let st = state(1, Point::new(0, 0), vec![]);
        assert!(c.handle(1, Envelope::State(st)).is_err());
    }

    #[test]
    fn test_repeated_hello_resets_exploration() {
        let mut c = joined(&[(1, 1)]);
        c.handle(1, Envelope::State(state(1, Point::new(0, 0), vec![Move::RIGHT])))
            .unwrap();
        c.handle(1, Envelope::hello(1, Point::new(5, 5))).unwrap();

        let explorer = c.session(1).unwrap().explorer().unwrap();
        assert_eq!(explorer.stack(), &[Point::new(5, 5)]);
        assert_eq!(explorer.visited().len(), 1);
    }
}
