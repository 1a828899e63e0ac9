//! dgg-chat: a client for the destiny.gg chat protocol.
//!
//! Opens a persistent WebSocket session, decodes the pushed frames into
//! typed events, keeps the room membership in sync and sends moderation
//! and chat commands back.

pub mod commands;
pub mod config;
pub mod decode;
pub mod error;
pub mod events;
pub mod frame;
pub mod handlers;
pub mod membership;
pub mod reconnect;
pub mod session;
pub mod transport;

// Re-export commonly used types for convenience
pub use commands::Command;
pub use error::{ChatError, DecodeError, Result};
pub use events::{Event, EventKind, User};
pub use handlers::HandlerRegistry;
pub use membership::{Membership, UserLookup};
pub use reconnect::ReconnectPolicy;
pub use session::{
    ConnectionState, FrameOutcome, Session, SessionBuilder, DEFAULT_ORIGIN, DEFAULT_URL,
};
pub use transport::{Connection, FrameSink, FrameSource, Transport, WsTransport};
