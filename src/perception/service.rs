//! Local-window queries and occupancy bookkeeping.

use std::collections::HashMap;

use crate::protocol::{AgentId, Cell, Neighborhood, PerceptionResponse, Point};

use super::maze::Maze;

/// Owns the maze and the last reported position of every agent.
///
/// All mutation goes through [`PerceptionService::query`], which the server
/// loop calls one datagram at a time.
#[derive(Debug)]
pub struct PerceptionService {
    maze: Maze,
    positions: HashMap<AgentId, Point>,
    occupants: HashMap<Point, u32>,
    queries: u64,
}

impl PerceptionService {
    pub fn new(maze: Maze) -> Self {
        Self {
            maze,
            positions: HashMap::new(),
            occupants: HashMap::new(),
            queries: 0,
        }
    }

    pub fn maze(&self) -> &Maze {
        &self.maze
    }

    /// Last position each agent queried from, including off-grid ones.
    pub fn positions(&self) -> &HashMap<AgentId, Point> {
        &self.positions
    }

    /// Number of queries answered so far.
    pub fn query_count(&self) -> u64 {
        self.queries
    }

    /// Cell currently marked for `agent_id`, if it stands on the grid.
    pub fn occupied_cell(&self, agent_id: AgentId) -> Option<Point> {
        self.positions
            .get(&agent_id)
            .copied()
            .filter(|p| self.maze.is_traversable(*p))
    }

    /// Answer one query: move the agent's occupancy mark, then build the
    /// window around `(x, y)`.
    pub fn query(&mut self, agent_id: AgentId, x: i32, y: i32) -> PerceptionResponse {
        let pos = Point::new(x, y);
        self.queries += 1;
        self.update_occupancy(agent_id, pos);

        PerceptionResponse {
            neighborhood: self.neighborhood(pos),
            is_goal_here: self.maze.is_goal(pos),
            goals: self.maze.goals().to_vec(),
        }
    }

    /// 3×3 window around `center`; anything off the grid reads as a wall.
    pub fn neighborhood(&self, center: Point) -> Neighborhood {
        let mut window = Neighborhood::default();
        for dy in -1..=1 {
            for dx in -1..=1 {
                let cell = match (center.x.checked_add(dx), center.y.checked_add(dy)) {
                    (Some(x), Some(y)) => self.maze.cell(Point::new(x, y)).copied(),
                    _ => None,
                };
                window.cells[(dy + 1) as usize][(dx + 1) as usize] =
                    cell.unwrap_or_else(Cell::outside);
            }
        }
        window
    }

    fn update_occupancy(&mut self, agent_id: AgentId, pos: Point) {
        if let Some(old) = self.positions.insert(agent_id, pos) {
            if self.maze.is_traversable(old) {
                self.release(old);
            }
        }

        if self.maze.is_traversable(pos) {
            self.claim(pos);
        }
    }

    fn claim(&mut self, p: Point) {
        *self.occupants.entry(p).or_insert(0) += 1;
        if let Some(cell) = self.maze.cell_mut(p) {
            cell.occupied = true;
        }
    }

    // A cell stays marked while any other agent still stands on it.
    fn release(&mut self, p: Point) {
        let remaining = match self.occupants.get_mut(&p) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            self.occupants.remove(&p);
            if let Some(cell) = self.maze.cell_mut(p) {
                cell.occupied = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FieldType;

    fn service() -> PerceptionService {
        PerceptionService::new(Maze::default_layout().unwrap())
    }

    fn marked_cells(svc: &PerceptionService) -> Vec<Point> {
        let maze = svc.maze();
        let mut out = Vec::new();
        for y in 0..maze.height() {
            for x in 0..maze.width() {
                let p = Point::new(x, y);
                if maze.cell(p).unwrap().occupied {
                    out.push(p);
                }
            }
        }
        out
    }

    #[test]
    fn test_corner_window_synthesizes_walls() {
        let mut svc = service();
        let resp = svc.query(1, 0, 0);
        let n = resp.neighborhood;

        for dx in -1..=1 {
            assert!(n.at(dx, -1).unwrap().is_wall());
        }
        assert!(n.at(-1, 0).unwrap().is_wall());
        assert!(n.at(-1, 1).unwrap().is_wall());
        assert_eq!(n.center().kind, FieldType::Start);
        assert!(n.center().occupied);
        assert_eq!(n.at(1, 0).unwrap().kind, FieldType::Path);
        assert!(!resp.is_goal_here);
    }

    #[test]
    fn test_goal_list_sent_unconditionally() {
        let mut svc = service();
        let resp = svc.query(1, 5, 8);
        assert_eq!(resp.goals.len(), 4);
        assert!(!resp.is_goal_here);

        let resp = svc.query(1, 7, 2);
        assert!(resp.is_goal_here);
        assert_eq!(resp.goals.len(), 4);
    }

    #[test]
    fn test_off_grid_query_is_never_goal() {
        let mut svc = service();
        let resp = svc.query(1, -3, 40);
        assert!(!resp.is_goal_here);
        assert!(resp.neighborhood.center().is_wall());
        assert!(marked_cells(&svc).is_empty());
    }

    #[test]
    fn test_query_at_coordinate_limits_reads_walls() {
        let mut svc = service();
        for (x, y) in [(i32::MAX, 0), (i32::MIN, i32::MAX), (0, i32::MIN)] {
            let resp = svc.query(1, x, y);
            assert!(!resp.is_goal_here);
            for dy in -1..=1 {
                for dx in -1..=1 {
                    assert!(resp.neighborhood.at(dx, dy).unwrap().is_wall());
                }
            }
        }
        assert!(marked_cells(&svc).is_empty());
    }

    #[test]
    fn test_occupancy_follows_latest_position() {
        let mut svc = service();
        let path = [
            Point::new(0, 0),
            Point::new(1, 0),
            Point::new(6, 2), // wall: no mark, old mark cleared
            Point::new(2, 0),
            Point::new(-1, 0), // off grid
            Point::new(2, 1),
            Point::new(2, 1),
        ];

        for p in path {
            svc.query(9, p.x, p.y);
            let marked = marked_cells(&svc);
            assert!(marked.len() <= 1, "agent marked twice: {:?}", marked);
            let expected = svc.maze().is_traversable(p).then_some(p);
            assert_eq!(marked.first().copied(), expected);
            assert_eq!(svc.occupied_cell(9), expected);
        }
    }

    #[test]
    fn test_shared_cell_stays_marked_until_last_agent_leaves() {
        let mut svc = service();
        svc.query(1, 4, 4);
        svc.query(2, 4, 4);
        svc.query(1, 5, 4);

        let n = svc.neighborhood(Point::new(4, 4));
        assert!(n.center().occupied);
        assert!(n.at(1, 0).unwrap().occupied);

        svc.query(2, 3, 4);
        assert!(!svc.neighborhood(Point::new(4, 4)).center().occupied);
        assert_eq!(marked_cells(&svc).len(), 2);
    }

    #[test]
    fn test_other_agent_shows_in_window() {
        let mut svc = service();
        svc.query(1, 1, 0);
        let resp = svc.query(2, 0, 0);
        assert!(resp.neighborhood.at(1, 0).unwrap().occupied);
        assert_eq!(svc.query_count(), 2);
    }
}
