//! Top-level error type for the bridge binary
//!
//! Each layer has its own error enum; [`BridgeError`] gathers them for the
//! startup path and the CLI commands.

use crate::config::ConfigError;
use crate::dispatch::DispatchError;
use crate::protocol::TopicError;
use crate::transport::MqttError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("MQTT error: {0}")]
    Transport(#[from] MqttError),

    #[error("Topic error: {0}")]
    Topic(#[from] TopicError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
