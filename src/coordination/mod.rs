//! Coordination service - drives every agent's exploration.
//!
//! - Per-agent depth-first explorer with backtracking
//! - Session state machine, goal ledger and finish latch
//! - TCP server loop

pub mod coordinator;
pub mod explorer;
pub mod server;

pub use coordinator::{ConnId, Coordinator, Outbound, Session};
pub use explorer::Explorer;
pub use server::CoordinationServer;
