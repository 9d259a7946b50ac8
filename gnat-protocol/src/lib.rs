//! gnat-protocol: Wire definitions for the gnat messaging client
//!
//! This crate defines the CRLF frame codec, the outbound operation type,
//! inbound frame classification, and the JSON handshake bodies exchanged
//! with the server.

pub mod codec;
pub mod frames;
pub mod types;

// Re-export main types at crate root
pub use codec::{FrameCodec, ProtocolError, MAX_FRAME_SIZE, SEPARATOR};
pub use frames::{classify, ClientOp, MsgHeader, ServerFrame};
pub use types::{ConnectInfo, ServerInfo};

/// Reserved subject namespace for ephemeral reply inboxes
pub const INBOX_PREFIX: &str = "INBOX.";
