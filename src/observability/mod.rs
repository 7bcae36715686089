//! Observability for the bridge
//!
//! Structured logging and the span macros used around broker and dispatch work.

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, with_verbosity, LogFormat};
pub use logging::{mqtt_span, task_span};
