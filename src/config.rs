//! Bridge configuration loaded from TOML
//!
//! ```toml
//! [mqtt]
//! broker_host = "localhost"
//! broker_port = 1883
//! client_id = "hostmqtt"
//! username_env = "MQTT_USERNAME"
//! password_env = "MQTT_PASSWORD"
//! qos = 1
//!
//! [topics]
//! prefix = "hostmqtt/"
//! request_prefix = "hostmqtt/request/"
//! ```

use crate::protocol::{qos_from_level, TopicPolicy, DEFAULT_ERROR_SEGMENT, DEFAULT_WILDCARD};
use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    pub mqtt: MqttSection,
    #[serde(default)]
    pub topics: TopicsSection,
}

/// Broker connection and session settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    pub broker_host: String,
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub clean_session: bool,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// QoS level (0, 1 or 2) applied to the subscription and every publish
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Time after a disconnect during which connect attempts are refused
    #[serde(default = "default_reconnect_cooldown")]
    pub reconnect_cooldown_secs: u64,
    /// Reconnect automatically once the cooldown has elapsed
    #[serde(default = "default_true")]
    pub reconnect_after_cooldown: bool,
    /// Capacity of the outbound request buffer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_broker_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "hostmqtt".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_reconnect_cooldown() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    64
}

/// Topic layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicsSection {
    /// Prefix of every published topic
    #[serde(default = "default_topic_prefix")]
    pub prefix: String,
    /// Prefix of request topics; empty disables the subscription
    #[serde(default = "default_request_prefix")]
    pub request_prefix: String,
    #[serde(default = "default_wildcard")]
    pub wildcard: char,
    #[serde(default = "default_error_segment")]
    pub error_segment: String,
}

impl Default for TopicsSection {
    fn default() -> Self {
        Self {
            prefix: default_topic_prefix(),
            request_prefix: default_request_prefix(),
            wildcard: default_wildcard(),
            error_segment: default_error_segment(),
        }
    }
}

fn default_topic_prefix() -> String {
    "hostmqtt/".to_string()
}

fn default_request_prefix() -> String {
    "hostmqtt/request/".to_string()
}

fn default_wildcard() -> char {
    DEFAULT_WILDCARD
}

fn default_error_segment() -> String {
    DEFAULT_ERROR_SEGMENT.to_string()
}

impl TopicsSection {
    pub fn policy(&self) -> TopicPolicy {
        TopicPolicy {
            wildcard: self.wildcard,
            error_segment: self.error_segment.clone(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Load configuration from TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mqtt.validate()?;
        self.topics.validate()
    }

    /// Get MQTT username from environment variable
    pub fn get_mqtt_username(&self) -> Option<String> {
        get_env_var_optional(self.mqtt.username_env.as_ref())
    }

    /// Get MQTT password from environment variable
    pub fn get_mqtt_password(&self) -> Option<String> {
        get_env_var_optional(self.mqtt.password_env.as_ref())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[mqtt]
broker_host = "localhost"

[topics]
prefix = "host/"
request_prefix = "host/request/"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
    env_var_name.and_then(|name| std::env::var(name).ok())
}

impl MqttSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.broker_host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "mqtt.broker_host cannot be empty".to_string(),
            ));
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "mqtt.client_id cannot be empty".to_string(),
            ));
        }
        if qos_from_level(self.qos).is_none() {
            return Err(ConfigError::InvalidConfig(format!(
                "mqtt.qos must be 0, 1 or 2, got {}",
                self.qos
            )));
        }
        if self.reconnect_cooldown_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.reconnect_cooldown_secs must be greater than zero".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.channel_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured QoS; falls back to QoS 0 for an unvalidated level
    pub fn qos(&self) -> QoS {
        qos_from_level(self.qos).unwrap_or(QoS::AtMostOnce)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reconnect_cooldown(&self) -> Duration {
        Duration::from_secs(self.reconnect_cooldown_secs)
    }
}

impl TopicsSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if matches!(self.wildcard, '+' | '#' | '/') {
            return Err(ConfigError::InvalidConfig(format!(
                "topics.wildcard '{}' is reserved by MQTT",
                self.wildcard
            )));
        }
        if self.error_segment.is_empty() || self.error_segment.contains('/') {
            return Err(ConfigError::InvalidConfig(
                "topics.error_segment must be a single non-empty segment".to_string(),
            ));
        }
        let has_mqtt_wildcard = |prefix: &str| prefix.contains(&['+', '#'][..]);
        if has_mqtt_wildcard(&self.request_prefix) || has_mqtt_wildcard(&self.prefix) {
            return Err(ConfigError::InvalidConfig(
                "topic prefixes cannot contain MQTT wildcards".to_string(),
            ));
        }
        Ok(())
    }
}
