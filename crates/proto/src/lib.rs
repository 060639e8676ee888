//! Wire protocol between the sync engine and the remote agent.
//!
//! The engine writes [`Rpc`] requests to the agent's stdin and reads
//! [`Response`]s from its stdout. Framing is one JSON object per line in
//! both directions; chunk payloads travel base64-encoded so a frame is
//! always valid UTF-8. The agent applies requests idempotently (mkdir if
//! absent, delete if present, write at explicit offset) and acknowledges
//! each one in order.

mod codec;
mod error;
mod message;

pub use codec::{read_frame, write_frame};
pub use error::ProtoError;
pub use message::{Response, Rpc};
