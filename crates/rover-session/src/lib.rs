//! Keep-alive session tracking for the Rover event pipeline.
//!
//! Provides:
//! - `Session` - Active-time accounting with a keep-alive window
//! - `SessionTracker` - Named sessions that emit an event when they end

pub mod session;
pub mod tracker;

pub use session::{Session, SessionState};
pub use tracker::SessionTracker;
