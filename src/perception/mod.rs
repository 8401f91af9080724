//! Perception service - owns the ground-truth maze.
//!
//! - Maze grid and the default layout
//! - Local 3×3 window queries with occupancy bookkeeping
//! - UDP server loop

pub mod maze;
pub mod server;
pub mod service;

pub use maze::Maze;
pub use server::PerceptionServer;
pub use service::PerceptionService;
