//! Per-agent depth-first exploration with backtracking.

use std::collections::HashSet;

use crate::protocol::{Move, Point};

/// Neighbor priority: +x, +y, -x, -y.
pub const DIRECTION_ORDER: [Move; 4] = [Move::RIGHT, Move::DOWN, Move::LEFT, Move::UP];

/// DFS state for one agent.
///
/// `visited` only grows. The top of `stack` is the cell the explorer
/// believes the agent stands on; [`Explorer::sync_to`] forces it back in
/// line with the agent's own report before every decision.
#[derive(Debug, Clone)]
pub struct Explorer {
    stack: Vec<Point>,
    visited: HashSet<Point>,
}

impl Explorer {
    pub fn new(start: Point) -> Self {
        let mut explorer = Self {
            stack: Vec::new(),
            visited: HashSet::new(),
        };
        explorer.stack.push(start);
        explorer.visited.insert(start);
        explorer
    }

    pub fn stack(&self) -> &[Point] {
        &self.stack
    }

    pub fn visited(&self) -> &HashSet<Point> {
        &self.visited
    }

    pub fn has_visited(&self, p: Point) -> bool {
        self.visited.contains(&p)
    }

    /// Pop frames until the top equals `pos`. If that empties the stack,
    /// restart it at `pos`.
    pub fn sync_to(&mut self, pos: Point) {
        while let Some(top) = self.stack.last() {
            if *top == pos {
                return;
            }
            self.stack.pop();
        }
        self.stack.push(pos);
        self.visited.insert(pos);
    }

    /// Pick the next move from `pos`, restricted to `allowed`.
    ///
    /// Expects the stack to be synced to `pos` already.
    pub fn choose_move(&mut self, pos: Point, allowed: &[Move]) -> Move {
        if allowed.is_empty() {
            return Move::STAY;
        }

        for dir in DIRECTION_ORDER {
            if !allowed.contains(&dir) {
                continue;
            }
            // no neighbor past the edge of the coordinate space
            let Some(next) = pos.checked_step(dir) else {
                continue;
            };
            if self.visited.insert(next) {
                self.stack.push(next);
                return dir;
            }
        }

        if self.stack.len() > 1 {
            if let Some(current) = self.stack.pop() {
                if let Some(&previous) = self.stack.last() {
                    let back = Move::between(current, previous);
                    if allowed.contains(&back) {
                        return back;
                    }
                }
                self.stack.push(current);
            }
        }

        Move::STAY
    }
}
