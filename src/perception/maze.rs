//! Ground-truth maze grid.

use crate::error::{Error, Result};
use crate::protocol::{Cell, FieldType, Point};

/// Layout served by `mazeswarm perception`: 10×10, start in the top-left
/// corner, four goals, one horizontal and one vertical wall.
pub const DEFAULT_LAYOUT: [&str; 10] = [
    "S.........",
    "......#...",
    "......#G..",
    "..######..",
    "......#...",
    "....G.#.G.",
    "......#...",
    "..........",
    "..........",
    "G.........",
];

/// Goal order announced for [`DEFAULT_LAYOUT`].
pub const DEFAULT_GOALS: [Point; 4] = [
    Point::new(7, 2),
    Point::new(0, 9),
    Point::new(4, 5),
    Point::new(8, 5),
];

/// Rectangular grid of cells plus the goal list in declaration order.
#[derive(Debug, Clone)]
pub struct Maze {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
    start: Point,
    goals: Vec<Point>,
}

impl Maze {
    /// Parse a layout, one string per row.
    ///
    /// `#` wall, `.` path, `S` start, `G` goal. Goals are listed in
    /// row-major order of appearance.
    pub fn parse(rows: &[&str]) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map(|r| r.chars().count()).unwrap_or(0);
        if width == 0 || height == 0 {
            return Err(Error::Config("maze layout is empty".to_string()));
        }

        let mut cells = Vec::with_capacity(width * height);
        let mut start = None;
        let mut goals = Vec::new();

        for (y, row) in rows.iter().enumerate() {
            if row.chars().count() != width {
                return Err(Error::Config(format!(
                    "maze row {} has {} columns, expected {}",
                    y,
                    row.chars().count(),
                    width
                )));
            }
            for (x, ch) in row.chars().enumerate() {
                let p = Point::new(x as i32, y as i32);
                let kind = match ch {
                    '#' => FieldType::Wall,
                    '.' => FieldType::Path,
                    'S' => {
                        start = Some(p);
                        FieldType::Start
                    }
                    'G' => {
                        goals.push(p);
                        FieldType::Goal
                    }
                    other => {
                        return Err(Error::Config(format!(
                            "unknown maze symbol '{}' at {}",
                            other, p
                        )))
                    }
                };
                cells.push(Cell::new(kind));
            }
        }

        Ok(Self {
            width: width as i32,
            height: height as i32,
            cells,
            start: start.unwrap_or_default(),
            goals,
        })
    }

    pub fn default_layout() -> Result<Self> {
        Self::parse(&DEFAULT_LAYOUT)?.with_goal_order(&DEFAULT_GOALS)
    }

    /// Re-declare the goal list in `order`, which must name every goal cell
    /// exactly once.
    pub fn with_goal_order(mut self, order: &[Point]) -> Result<Self> {
        let mut expected = self.goals.clone();
        let mut given = order.to_vec();
        expected.sort_by_key(|p| (p.y, p.x));
        given.sort_by_key(|p| (p.y, p.x));
        if expected != given {
            return Err(Error::Config(format!(
                "goal order lists {} cells, layout has goals {:?}",
                order.len(),
                self.goals
            )));
        }

        self.goals = order.to_vec();
        Ok(self)
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn start(&self) -> Point {
        self.start
    }

    pub fn goals(&self) -> &[Point] {
        &self.goals
    }

    pub fn in_bounds(&self, p: Point) -> bool {
        p.x >= 0 && p.x < self.width && p.y >= 0 && p.y < self.height
    }

    /// Cell at `p`, or `None` outside the grid.
    pub fn cell(&self, p: Point) -> Option<&Cell> {
        self.index(p).map(|i| &self.cells[i])
    }

    pub(crate) fn cell_mut(&mut self, p: Point) -> Option<&mut Cell> {
        self.index(p).map(move |i| &mut self.cells[i])
    }

    /// In bounds and not a wall.
    pub fn is_traversable(&self, p: Point) -> bool {
        self.cell(p).map_or(false, |c| !c.is_wall())
    }

    pub fn is_goal(&self, p: Point) -> bool {
        self.cell(p).map_or(false, |c| c.kind == FieldType::Goal)
    }

    fn index(&self, p: Point) -> Option<usize> {
        if self.in_bounds(p) {
            Some((p.y * self.width + p.x) as usize)
        } else {
            None
        }
    }
}
