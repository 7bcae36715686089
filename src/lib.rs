//! hostmqtt - host metrics over MQTT
//!
//! A bridge that answers requests published under a request prefix with values
//! read from the host, publishing them under a topic prefix.
//!
//! # Overview
//!
//! - [`protocol`] - Topic addressing, payload model and serialization
//! - [`resolver`] - The value resolver contract and the `sysinfo` resolver
//! - [`dispatch`] - Turning one request into publishes, fanning out over wildcards
//! - [`transport`] - The single MQTT session, its state machine and cooldown
//! - [`config`] - TOML configuration
//!
//! # Quick Start
//!
//! ```rust
//! use hostmqtt::protocol::{payload_as_string, Payload, Topic};
//!
//! let topic = Topic::parse("disk/*/usage", "host/").unwrap();
//! assert_eq!(topic.subtopic("sda"), "host/disk/sda/usage");
//!
//! let value = Payload::mapping([("sda", Payload::integer(10))]);
//! assert_eq!(payload_as_string(&value).unwrap(), r#"{"sda": 10}"#);
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod resolver;
pub mod testing;
pub mod transport;

pub use config::{BridgeConfig, ConfigError};
pub use dispatch::{DispatchError, DispatchOutcome, TaskDispatcher};
pub use error::{BridgeError, BridgeResult};
pub use protocol::*;
pub use resolver::{ResolveError, SystemResolver, ValueResolver};
pub use transport::mqtt::{Session, SessionHandle};
pub use transport::{MqttError, Publisher};
