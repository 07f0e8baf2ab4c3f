//! Wire protocol spoken between the coordinator and its workers
//!
//! One TCP connection per worker carries two kinds of traffic: plain text
//! commands and length-prefixed frames for bulk file transfer. Both ends use
//! the same codec.

pub mod codec;
pub mod connection;
pub mod message;

pub use codec::{
    Frame, FrameAction, FrameHeader, FrameLimits, MessageKind, classify_prefix, peek_message_kind, read_frame,
    write_frame
};
pub use connection::{Liveness, WorkerConnection, WorkerLink};
pub use message::{ControlMessage, Handshake};
