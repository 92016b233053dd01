//! Durable batching event queue for the Rover event pipeline.
//!
//! Provides:
//! - `EventQueue` - Bounded, persisted, size/time-triggered batching queue
//! - Storage implementations (memory, JSON file)

pub mod queue;
pub mod storage;

pub use queue::{EventQueue, FlushOutcome, SkipReason};
