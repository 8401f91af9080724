//! Envelopes exchanged between agents and the coordination service.

use serde::{Deserialize, Serialize};

use super::framing::encode_frame;
use super::types::{AgentId, Move, Neighborhood, Point};
use crate::error::Result;

/// Note carried by the reply to a `Hello`.
pub const NOTE_ACK: &str = "ACK";
/// Note carried by an ordinary exploration step.
pub const NOTE_DFS: &str = "dfs";
/// Note carried by the terminal broadcast.
pub const NOTE_FINISH: &str = "FINISH";

/// First message on a new connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HelloPayload {
    pub agent_id: AgentId,
    pub start_x: i32,
    pub start_y: i32,
}

/// Per-step report from an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatePayload {
    pub agent_id: AgentId,
    pub x: i32,
    pub y: i32,
    /// Unit moves the agent can physically take right now.
    pub allowed_moves: Vec<Move>,
    /// Last window the agent got from the perception service.
    pub last_neighborhood: Option<Neighborhood>,
    pub goal_found: bool,
    pub goal_x: i32,
    pub goal_y: i32,
    /// Full goal list, sent once by each agent.
    pub known_goals: Option<Vec<Point>>,
}

impl StatePayload {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// The reported goal cell, if this step reports one.
    pub fn reported_goal(&self) -> Option<Point> {
        self.goal_found.then(|| Point::new(self.goal_x, self.goal_y))
    }
}

/// Move issued by the coordination service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandPayload {
    pub agent_id: AgentId,
    #[serde(rename = "move")]
    pub mv: Move,
    pub finished: bool,
    pub note: String,
}

/// Tagged message union. Dispatch with `match`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Hello(HelloPayload),
    State(StatePayload),
    Command(CommandPayload),
    Finished { note: String },
}

impl Envelope {
    pub fn hello(agent_id: AgentId, start: Point) -> Self {
        Envelope::Hello(HelloPayload {
            agent_id,
            start_x: start.x,
            start_y: start.y,
        })
    }

    /// Step command for one agent.
    pub fn command(agent_id: AgentId, mv: Move, note: &str) -> Self {
        Envelope::Command(CommandPayload {
            agent_id,
            mv,
            finished: false,
            note: note.to_string(),
        })
    }

    /// Terminal command, folded into `Command` with `finished` set.
    pub fn finish(agent_id: AgentId) -> Self {
        Envelope::Command(CommandPayload {
            agent_id,
            mv: Move::STAY,
            finished: true,
            note: NOTE_FINISH.to_string(),
        })
    }

    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Hello(_) => "hello",
            Envelope::State(_) => "state",
            Envelope::Command(_) => "command",
            Envelope::Finished { .. } => "finished",
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize and wrap in a length-prefixed frame.
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        Ok(encode_frame(&self.to_bytes()?)?)
    }
}
