//! Outreach sequencer web frontend
//!
//! HTTP API over the sequence and enrollment stores, plus the periodic tick
//! loop that drives the engine. The API and the engine share the same store
//! handles, so writes from one side are immediately visible to the other.

pub mod error;
pub mod state;
pub mod web;

// Re-export main types
pub use error::{WebServerError, WebServerResult};
pub use state::AppState;
