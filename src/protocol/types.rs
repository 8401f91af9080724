//! Grid and move value types shared by every participant.

use serde::{Deserialize, Serialize};

/// Agent identity as given on the command line.
pub type AgentId = u32;

/// Grid coordinate. `x` grows to the right, `y` grows downward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The point reached by applying `mv`.
    pub fn step(self, mv: Move) -> Self {
        Self::new(self.x + mv.dx, self.y + mv.dy)
    }

    /// Like [`Point::step`], but `None` when a coordinate would overflow.
    pub fn checked_step(self, mv: Move) -> Option<Self> {
        Some(Self::new(
            self.x.checked_add(mv.dx)?,
            self.y.checked_add(mv.dy)?,
        ))
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Kind of a maze cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Start,
    Wall,
    Goal,
    Path,
}

/// One maze cell as seen by an agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cell {
    pub kind: FieldType,
    pub occupied: bool,
}

impl Cell {
    pub const fn new(kind: FieldType) -> Self {
        Self {
            kind,
            occupied: false,
        }
    }

    /// Synthetic cell used for everything outside the maze bounds.
    pub const fn outside() -> Self {
        Self::new(FieldType::Wall)
    }

    pub fn is_wall(&self) -> bool {
        self.kind == FieldType::Wall
    }
}

/// 3×3 window of cells, row-major, centered on the querying agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Neighborhood {
    pub cells: [[Cell; 3]; 3],
}

impl Neighborhood {
    /// Cell at offset `(dx, dy)` from the center, each in `-1..=1`.
    pub fn at(&self, dx: i32, dy: i32) -> Option<&Cell> {
        if !(-1..=1).contains(&dx) || !(-1..=1).contains(&dy) {
            return None;
        }
        Some(&self.cells[(dy + 1) as usize][(dx + 1) as usize])
    }

    pub fn center(&self) -> &Cell {
        &self.cells[1][1]
    }
}

impl Default for Neighborhood {
    fn default() -> Self {
        Self {
            cells: [[Cell::new(FieldType::Path); 3]; 3],
        }
    }
}

/// Unit step on the grid. `(0,0)` means "stay".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct Move {
    pub dx: i32,
    pub dy: i32,
}

impl Move {
    pub const STAY: Move = Move::new(0, 0);
    pub const RIGHT: Move = Move::new(1, 0);
    pub const LEFT: Move = Move::new(-1, 0);
    pub const DOWN: Move = Move::new(0, 1);
    pub const UP: Move = Move::new(0, -1);

    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    /// Move that takes `from` to `to`. Only meaningful for adjacent points.
    pub fn between(from: Point, to: Point) -> Self {
        Self::new(to.x.saturating_sub(from.x), to.y.saturating_sub(from.y))
    }

    pub fn is_stay(&self) -> bool {
        *self == Self::STAY
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.dx, self.dy)
    }
}

/// Datagram sent by an agent to the perception service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PerceptionQuery {
    pub agent_id: AgentId,
    pub x: i32,
    pub y: i32,
}

/// Datagram returned by the perception service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PerceptionResponse {
    pub neighborhood: Neighborhood,
    pub is_goal_here: bool,
    /// Every goal in the maze, sent on each reply.
    pub goals: Vec<Point>,
}

impl PerceptionQuery {
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

impl PerceptionResponse {
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
