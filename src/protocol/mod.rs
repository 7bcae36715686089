//! Wire-level types: topics, resolved payloads and outbound publishes
//!
//! Everything here is free of I/O so addressing and serialization rules can be
//! tested without a broker.

pub mod messages;
pub mod payload;
pub mod topics;

pub use messages::*;
pub use payload::*;
pub use topics::*;
