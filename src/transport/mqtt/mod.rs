//! MQTT session for the bridge
//!
//! This module separates pure decisions from I/O so the state machine can be
//! tested without a broker.
//!
//! # Architecture
//!
//! - [`connection`] - Connection states, errors and broker option construction
//! - [`lifecycle`] - Pure state transitions and the reconnect cooldown
//! - [`message_handler`] - Pure routing of rumqttc events into session events
//! - [`client`] - The session itself: connect, event loop, publishing
//!
//! # Usage
//!
//! ```rust,no_run
//! use hostmqtt::config::BridgeConfig;
//! use hostmqtt::dispatch::{DispatchSettings, TaskDispatcher};
//! use hostmqtt::resolver::SystemResolver;
//! use hostmqtt::transport::mqtt::Session;
//!
//! # tokio_test::block_on(async {
//! let config = BridgeConfig::from_toml_str("[mqtt]\nbroker_host = \"localhost\"\n")?;
//! let settings = DispatchSettings::from_config(&config);
//! let dispatcher = TaskDispatcher::new(SystemResolver::with_wildcard('*'), settings);
//!
//! let (mut session, events) = Session::new(config)?;
//! session.connect("localhost", 1883, "", None)?;
//! session.run(events, dispatcher).await;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod lifecycle;
pub mod message_handler;

// Re-export public types for convenience
pub use client::{Session, SessionHandle};
pub use connection::{
    BrokerEndpoint, ConnectionState, MqttError, LAST_WILL_PAYLOAD, SECURE_MQTT_PORT,
};
pub use lifecycle::{Cooldown, LifecycleEvent, LifecycleMonitor};
pub use message_handler::{BrokerEvent, MessageHandler};
