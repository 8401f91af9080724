//! Wire protocol shared by the perception service, the coordination service
//! and the agents:
//! - Length-prefixed framing for the coordination stream
//! - Tagged envelopes (hello, state, command, finished)
//! - Grid, move and perception datagram types

pub mod envelope;
pub mod framing;
pub mod types;

pub use envelope::{CommandPayload, Envelope, HelloPayload, StatePayload};
pub use framing::{encode_frame, FrameBuffer, FrameError, MAX_FRAME_LEN};
pub use types::{
    AgentId, Cell, FieldType, Move, Neighborhood, PerceptionQuery, PerceptionResponse, Point,
};
