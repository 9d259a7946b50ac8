//! gnat-client: A publish/subscribe messaging client
//!
//! [`Client`] speaks a text-framed protocol over one persistent TCP
//! connection: publish byte payloads on named subjects, subscribe to
//! subjects, and perform blocking request/response exchanges built on an
//! ephemeral reply inbox.
//!
//! A background connection task owns all protocol state: it decodes the
//! wire stream into frames, answers keepalives, performs the handshake,
//! and routes deliveries into the sinks the facade reads from.

pub mod client;
pub mod delivery;

mod connection;
mod router;

// Re-export main types at crate root
pub use client::{Client, ClientOptions, ConnectionState};
pub use delivery::{Delivery, Message, Request, Response};
pub use gnat_protocol::ServerInfo;
pub use gnat_utils::{GnatError, Result};
