//! Pure routing of rumqttc events into session events
//!
//! The transport pump turns every polled [`rumqttc::Event`] into at most one
//! [`BrokerEvent`]; the session consumes those events one at a time.

use rumqttc::{ConnectReturnCode, Event, Packet};
use tracing::debug;

/// Event delivered to the single session consumer
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// CONNACK accepted by the broker
    Connected,
    /// Connection dropped by the broker or the network
    Disconnected { reason: String },
    /// Inbound PUBLISH on a subscribed topic
    MessageArrived { topic: String, payload: Vec<u8> },
    /// Reconnect cooldown window `generation` has elapsed
    CooldownElapsed { generation: u64 },
    /// A [`SessionHandle`](super::client::SessionHandle) asked for a reconnect
    ReconnectRequested,
}

impl BrokerEvent {
    /// Events after which the transport stops polling
    pub fn ends_connection(&self) -> bool {
        matches!(self, BrokerEvent::Disconnected { .. })
    }
}

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route an MQTT event, dropping infrastructure traffic
    pub fn route_mqtt_event(event: &Event) -> Option<BrokerEvent> {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    Some(BrokerEvent::Connected)
                } else {
                    Some(BrokerEvent::Disconnected {
                        reason: format!("Connection refused: {:?}", ack.code),
                    })
                }
            }
            Event::Incoming(Packet::Publish(publish)) => Some(BrokerEvent::MessageArrived {
                topic: publish.topic.clone(),
                payload: publish.payload.to_vec(),
            }),
            Event::Incoming(Packet::Disconnect) => Some(BrokerEvent::Disconnected {
                reason: "Broker sent DISCONNECT".to_string(),
            }),
            Event::Incoming(Packet::SubAck(suback)) => {
                debug!(
                    target: "mqtt_transport",
                    "Subscription confirmed: {:?}",
                    suback.return_codes
                );
                None
            }
            Event::Incoming(other) => {
                debug!(target: "mqtt_transport", "MQTT event: {:?}", other);
                None
            }
            Event::Outgoing(_) => None,
        }
    }
}
