//! Error types for mazeswarm.

use thiserror::Error;

use crate::protocol::framing::FrameError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Launch error: {0}")]
    Launch(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,
}
