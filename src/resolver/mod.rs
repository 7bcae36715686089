//! Value resolution
//!
//! A [`ValueResolver`] turns a task name such as `virtual_memory/percent` into a
//! [`Payload`]. The dispatcher treats it as an opaque, synchronous service.

use crate::protocol::Payload;
use thiserror::Error;

pub mod system;

pub use system::SystemResolver;

/// Resolution failures reported back to the requester
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolveError {
    #[error("Unknown task '{0}'")]
    UnknownTask(String),
    /// Resolution fault; displays as the bare message
    #[error("{0}")]
    Fault(String),
}

impl ResolveError {
    pub fn unknown_task<S: Into<String>>(task: S) -> Self {
        Self::UnknownTask(task.into())
    }

    pub fn fault<S: Into<String>>(message: S) -> Self {
        Self::Fault(message.into())
    }
}

/// Resolve a task name into a value
pub trait ValueResolver {
    fn resolve(&self, task: &str) -> Result<Payload, ResolveError>;
}

impl<R: ValueResolver + ?Sized> ValueResolver for Box<R> {
    fn resolve(&self, task: &str) -> Result<Payload, ResolveError> {
        (**self).resolve(task)
    }
}

impl<R: ValueResolver + ?Sized> ValueResolver for std::sync::Arc<R> {
    fn resolve(&self, task: &str) -> Result<Payload, ResolveError> {
        (**self).resolve(task)
    }
}
