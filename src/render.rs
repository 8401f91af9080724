//! Console views of the maze and of the coordination status.
//!
//! Purely observational: both functions only read state.

use std::fmt::Write as _;
use std::io::Write as _;

use crate::coordination::Coordinator;
use crate::perception::PerceptionService;
use crate::protocol::{AgentId, FieldType, Point};

/// Letter used to draw an agent on the grid: 1 -> A, 2 -> B, ...
pub fn agent_letter(id: AgentId) -> char {
    let offset = (id as i64 - 1).rem_euclid(26) as u8;
    (b'A' + offset) as char
}

/// Grid view: `#` wall, `.` path, `X` goal, letters for agents.
pub fn render_maze(service: &PerceptionService) -> String {
    let maze = service.maze();
    let mut grid: Vec<Vec<char>> = (0..maze.height())
        .map(|y| {
            (0..maze.width())
                .map(|x| match maze.cell(Point::new(x, y)).map(|c| c.kind) {
                    Some(FieldType::Wall) => '#',
                    Some(FieldType::Goal) => 'X',
                    _ => '.',
                })
                .collect()
        })
        .collect();

    let mut agents: Vec<_> = service.positions().iter().collect();
    agents.sort_by_key(|(id, _)| **id);
    for (id, pos) in agents {
        if maze.is_traversable(*pos) {
            grid[pos.y as usize][pos.x as usize] = agent_letter(*id);
        }
    }

    let mut out = String::from("[perception] Maze (# wall, . path, X goal, A/B/... agents)\n");
    for row in grid {
        out.extend(row);
        out.push('\n');
    }
    let _ = writeln!(out, "queries answered: {}", service.query_count());
    out
}

/// Status table: connections, goal progress, one line per session.
pub fn render_status(coordinator: &Coordinator) -> String {
    let mut out = String::new();
    let known = coordinator.expected_goals().map_or(0, |g| g.len());

    let _ = writeln!(
        out,
        "[coordinator] Status @ {}",
        chrono::Local::now().format("%H:%M:%S")
    );
    let _ = writeln!(
        out,
        "Connected: {} | GoalsKnown: {} | Found: {} | Finished: {}",
        coordinator.sessions().len(),
        known,
        coordinator.reported_count(),
        coordinator.is_finished()
    );
    out.push('\n');

    for session in coordinator.sessions().values() {
        let id = session
            .agent_id
            .map(|id| format!("Agent#{}", id))
            .unwrap_or_else(|| "Agent#?".to_string());
        let _ = writeln!(out, "{} pos={} cmd={}", id, session.position, session.last_move);
    }

    if let Some(goals) = coordinator.expected_goals() {
        out.push('\n');
        out.push_str("Found goals:\n");
        for goal in goals {
            let who = coordinator
                .found_by(*goal)
                .map(|a| format!("Agent#{}", a))
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(out, "  {} -> {}", goal, who);
        }
    }
    out
}

/// Redraw `frame` from the top-left corner of the terminal.
pub fn redraw(frame: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = write!(stdout, "\x1B[2J\x1B[H{}", frame);
    let _ = stdout.flush();
}
