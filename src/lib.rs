//! mazeswarm library root.

pub mod agent;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod error;
pub mod launcher;
pub mod logging;
pub mod perception;
pub mod protocol;
pub mod render;

pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use coordination::{CoordinationServer, Coordinator, Explorer};
pub use error::{Error, Result};
pub use perception::{Maze, PerceptionServer, PerceptionService};
