//! Transport layer for web and TUI front-ends.
//!
//! Provides:
//! - Wire protocol (JSON)
//! - `ShellHandler` and the session loop shared by all front-ends
//! - WebSocket transport (feature: websocket)
//! - TUI transport bridge (feature: tui)

pub mod handler;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "tui")]
pub mod tui;

pub use handler::{ShellHandler, TransportError, run_shell};
pub use protocol::{ClientMessage, ServerMessage};
