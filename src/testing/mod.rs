//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for exercising the dispatcher
//! without an MQTT broker or a live host.

pub mod mocks;

pub use mocks::*;
