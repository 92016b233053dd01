//! Wire transport for the Rover event pipeline.
//!
//! Provides:
//! - Wire protocol (JSON:API batches and response mapping)
//! - `JsonApiClient`, an `EventsClient` over any `EventsEndpoint`

pub mod client;
pub mod protocol;

pub use client::{EventsEndpoint, JsonApiClient};
pub use protocol::{EventsPayload, ProtocolError, decode_response, encode_events};
