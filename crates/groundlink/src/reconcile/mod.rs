//! Reconciliation
//!
//! Applies push-channel events to the entity store and schedule cache and
//! reports the minimal change set to render adapters.

mod reconciler;
mod routes;

pub use reconciler::{Reconciler, ReconcilerStats};
pub use routes::TopicRoutes;
