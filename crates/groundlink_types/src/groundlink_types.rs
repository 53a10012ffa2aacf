//! Groundlink Types - Data model and wire formats for the field unit dashboard
//!
//! This crate holds the plain data shared by the reconciliation core, the
//! WebSocket surface and the dashboard front-end (via generated TypeScript
//! bindings). It performs no I/O.

mod change;
mod command;
mod event;
mod lenient;
mod schedule;
mod unit;

pub use change::*;
pub use command::*;
pub use event::*;
pub use schedule::*;
pub use unit::*;
