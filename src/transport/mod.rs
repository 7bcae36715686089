//! Transport layer for the bridge
//!
//! The dispatcher only needs somewhere to hand publish commands to. That seam is
//! the [`Publisher`] trait; the MQTT session implements it, tests and the
//! `query` command use their own implementations.

use crate::protocol::PublishCommand;

pub mod mqtt;

pub use mqtt::MqttError;

/// Outbound capability used by the dispatcher
///
/// Publishing is a hand-off: implementations may wait for room in their
/// outbound buffer but must not wait for broker acknowledgment.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, command: PublishCommand) -> Result<(), MqttError>;
}

#[async_trait::async_trait]
impl<P: Publisher + ?Sized> Publisher for &P {
    async fn publish(&self, command: PublishCommand) -> Result<(), MqttError> {
        (**self).publish(command).await
    }
}
