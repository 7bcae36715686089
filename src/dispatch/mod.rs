//! Task dispatching: inbound request to outbound publishes

pub mod dispatcher;

pub use dispatcher::{DispatchError, DispatchOutcome, DispatchSettings, Request, TaskDispatcher};
