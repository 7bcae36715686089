//! Pure connection state management for the MQTT session
//!
//! This module contains the connection states, transport errors and the
//! construction of broker options. Nothing here performs I/O.

use crate::config::MqttSection;
use rumqttc::{LastWill, MqttOptions, QoS, Transport as RumqttcTransport};
use std::time::Duration;
use thiserror::Error;

/// Conventional port of MQTT over TLS
pub const SECURE_MQTT_PORT: u16 = 8883;

/// Payload of the last-will message
pub const LAST_WILL_PAYLOAD: &str = "offline";

/// Connection state of the session
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Constructed, no connect requested yet
    Idle,
    /// Connect requested, waiting for CONNACK
    Connecting,
    /// CONNACK received, subscription issued
    Connected,
    /// Lost the connection, with reason
    Disconnected(String),
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected(_) => "disconnected",
        }
    }
}

/// MQTT transport and session errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("A session already exists in this process")]
    SessionAlreadyClaimed,
    #[error("Reconnect refused during cooldown, {remaining:?} remaining")]
    CooldownActive { remaining: Duration },
    #[error("Connect not allowed while {}", .state.name())]
    InvalidState { state: ConnectionState },
    #[error("Not connected - current state: {}", .state.name())]
    NotConnected { state: ConnectionState },
    #[error("Session event loop has stopped")]
    SessionStopped,
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Where and as whom to connect
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
}

impl BrokerEndpoint {
    pub fn new(host: &str, port: u16, username: &str, password: Option<&str>) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.map(str::to_string),
        }
    }

    /// TLS is required on the secure port
    pub fn requires_tls(&self) -> bool {
        self.port == SECURE_MQTT_PORT
    }
}

/// Build the last-will topic announcing that `client_id` went offline
pub fn last_will_topic(client_id: &str) -> String {
    format!("clients/{client_id}")
}

/// Build the single subscription covering every request topic.
///
/// Returns `None` when no request prefix is configured.
pub fn request_subscription(request_prefix: &str) -> Option<String> {
    if request_prefix.is_empty() {
        None
    } else {
        Some(format!("{request_prefix}#"))
    }
}

/// Pure function to configure MQTT options for one connect attempt
pub fn configure_mqtt_options(config: &MqttSection, endpoint: &BrokerEndpoint) -> MqttOptions {
    let mut mqtt_options = MqttOptions::new(&config.client_id, &endpoint.host, endpoint.port);

    // Server certificate verification against the platform roots is mandatory
    if endpoint.requires_tls() {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if !endpoint.username.is_empty() {
        let password = endpoint.password.as_deref().unwrap_or_default();
        mqtt_options.set_credentials(&endpoint.username, password);
    }

    mqtt_options.set_clean_session(config.clean_session);
    mqtt_options.set_keep_alive(config.keep_alive());

    let lwt = LastWill::new(
        last_will_topic(&config.client_id),
        LAST_WILL_PAYLOAD,
        QoS::AtMostOnce,
        false,
    );
    mqtt_options.set_last_will(lwt);

    mqtt_options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;

    fn test_mqtt_config() -> MqttSection {
        BridgeConfig::test_config().mqtt
    }

    #[test]
    fn test_connection_state_equality() {
        assert_eq!(ConnectionState::Connected, ConnectionState::Connected);
        assert_eq!(
            ConnectionState::Disconnected("test".to_string()),
            ConnectionState::Disconnected("test".to_string())
        );
        assert_ne!(
            ConnectionState::Connected,
            ConnectionState::Disconnected("test".to_string())
        );
    }

    #[test]
    fn test_connection_state_names() {
        assert_eq!(ConnectionState::Idle.name(), "idle");
        assert_eq!(ConnectionState::Connecting.name(), "connecting");
        assert_eq!(ConnectionState::Connected.name(), "connected");
        assert_eq!(
            ConnectionState::Disconnected("gone".to_string()).name(),
            "disconnected"
        );
    }

    #[test]
    fn test_requires_tls_only_on_secure_port() {
        assert!(BrokerEndpoint::new("broker", 8883, "", None).requires_tls());
        assert!(!BrokerEndpoint::new("broker", 1883, "", None).requires_tls());
        assert!(!BrokerEndpoint::new("broker", 8884, "", None).requires_tls());
    }

    #[test]
    fn test_request_subscription() {
        assert_eq!(
            request_subscription("host/request/"),
            Some("host/request/#".to_string())
        );
        assert_eq!(request_subscription(""), None);
    }

    #[test]
    fn test_last_will_topic() {
        assert_eq!(last_will_topic("hostmqtt"), "clients/hostmqtt");
    }

    #[test]
    fn test_configure_mqtt_options() {
        let mut config = test_mqtt_config();
        config.clean_session = true;
        let endpoint = BrokerEndpoint::new("broker.local", 1883, "monitor", Some("secret"));

        let options = configure_mqtt_options(&config, &endpoint);

        assert_eq!(options.client_id(), "hostmqtt");
        assert_eq!(
            options.broker_address(),
            ("broker.local".to_string(), 1883)
        );
        assert!(options.clean_session());
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
        assert_eq!(
            options.credentials(),
            Some(("monitor".to_string(), "secret".to_string()))
        );

        let will = options.last_will().expect("last will should be set");
        assert_eq!(will.topic, "clients/hostmqtt");
        assert_eq!(&will.message[..], LAST_WILL_PAYLOAD.as_bytes());
        assert_eq!(will.qos, QoS::AtMostOnce);
        assert!(!will.retain);
    }

    #[test]
    fn test_configure_mqtt_options_without_credentials() {
        let config = test_mqtt_config();
        let endpoint = BrokerEndpoint::new("broker.local", 1883, "", Some("ignored"));

        let options = configure_mqtt_options(&config, &endpoint);
        assert_eq!(options.credentials(), None);
    }

    #[test]
    fn test_configure_mqtt_options_missing_password() {
        let config = test_mqtt_config();
        let endpoint = BrokerEndpoint::new("broker.local", 1883, "monitor", None);

        let options = configure_mqtt_options(&config, &endpoint);
        assert_eq!(
            options.credentials(),
            Some(("monitor".to_string(), String::new()))
        );
    }

    #[test]
    fn test_mqtt_error_display() {
        let errors = vec![
            MqttError::SessionAlreadyClaimed,
            MqttError::CooldownActive {
                remaining: Duration::from_secs(3),
            },
            MqttError::InvalidState {
                state: ConnectionState::Connected,
            },
            MqttError::NotConnected {
                state: ConnectionState::Idle,
            },
            MqttError::SessionStopped,
            MqttError::PublishFailed("test".to_string().into()),
            MqttError::SubscriptionFailed("test".to_string().into()),
        ];

        for error in errors {
            let error_string = error.to_string();
            assert!(!error_string.is_empty());
        }
    }

    #[test]
    fn test_state_errors_name_the_state() {
        let refused = MqttError::InvalidState {
            state: ConnectionState::Connecting,
        };
        assert_eq!(refused.to_string(), "Connect not allowed while connecting");

        let offline = MqttError::NotConnected {
            state: ConnectionState::Disconnected("network down".to_string()),
        };
        assert_eq!(
            offline.to_string(),
            "Not connected - current state: disconnected"
        );
    }
}
