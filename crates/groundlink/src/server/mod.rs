//! WebSocket Server
//!
//! Provides a WebSocket API for dashboards to read unit state, receive
//! real-time changes and issue unit commands.

mod handler;
mod protocol;
mod renderer;
mod router;
mod state;

pub use handler::*;
pub use protocol::*;
pub use renderer::*;
pub use router::*;
pub use state::*;
