//! Groundlink - Field unit operations dashboard core
//!
//! This crate provides the client-side state reconciliation engine and the
//! thin hosting layers around it:
//! - Entity store and schedule cache
//! - Reconciler applying push-channel events with per-kind merge policy
//! - Session loop owning the stores (single writer)
//! - Line-oriented event feed and one-way command dispatch
//! - Satellite catalog lookup
//! - WebSocket render surface for dashboards

// Re-export the shared data model
pub use groundlink_types as types;

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod reconcile;
pub mod render;
pub mod server;
pub mod session;
pub mod store;

pub use error::{Error, Result};
