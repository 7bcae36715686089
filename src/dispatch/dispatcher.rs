//! Request dispatching
//!
//! One inbound request topic becomes zero, one or many publishes:
//!
//! 1. topics outside the request prefix are ignored
//! 2. the task name is the topic minus the request prefix (and the topic prefix)
//! 3. the resolver produces a [`Payload`]
//! 4. sequences and mappings fan out over the wildcard of the output topic
//! 5. any failure is published once to the error topic

use crate::config::BridgeConfig;
use crate::protocol::{payload_as_string, Payload, PublishCommand, Topic, TopicPolicy};
use crate::resolver::{ResolveError, ValueResolver};
use crate::task_span;
use crate::transport::Publisher;
use rumqttc::QoS;
use thiserror::Error;
use tracing::{debug, error, info, warn, Instrument};

/// Per-message failures, reported on the error topic
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Task '{task}' returned several values but topic '{topic}' has no '{wildcard}'")]
    MultiValuedOnScalarTopic {
        task: String,
        topic: String,
        wildcard: char,
    },

    #[error("Failed to serialize result of task '{task}': {source}")]
    Serialization {
        task: String,
        #[source]
        source: serde_json::Error,
    },
}

/// What happened to one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a request topic, or no task name
    Ignored,
    /// Number of data publishes the publisher accepted
    Published(usize),
    /// The request failed and the error topic was published
    ErrorReported,
}

/// Topic layout and publish options used by the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub request_prefix: String,
    pub topic_prefix: String,
    pub policy: TopicPolicy,
    pub qos: QoS,
    pub retain: bool,
}

impl DispatchSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            request_prefix: config.topics.request_prefix.clone(),
            topic_prefix: config.topics.prefix.clone(),
            policy: config.topics.policy(),
            qos: config.mqtt.qos(),
            retain: config.mqtt.retain,
        }
    }
}

/// Request parsed from an inbound topic
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Name handed to the resolver
    pub task: String,
    /// Where results are published
    pub topic: Topic,
}

/// Turns inbound request messages into publishes
pub struct TaskDispatcher<R> {
    resolver: R,
    settings: DispatchSettings,
}

impl<R: ValueResolver> TaskDispatcher<R> {
    pub fn new(resolver: R, settings: DispatchSettings) -> Self {
        Self { resolver, settings }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Extract the task and output topic from an inbound topic.
    ///
    /// Returns `None` for topics outside the request prefix and for requests
    /// without a task name.
    pub fn parse_request(&self, inbound_topic: &str) -> Option<Request> {
        let name = inbound_topic.strip_prefix(self.settings.request_prefix.as_str())?;
        let task = name
            .strip_prefix(self.settings.topic_prefix.as_str())
            .unwrap_or(name);
        if task.is_empty() {
            return None;
        }

        let topic =
            Topic::parse_with_policy(name, &self.settings.topic_prefix, &self.settings.policy)
                .ok()?;

        Some(Request {
            task: task.to_string(),
            topic,
        })
    }

    /// Handle one inbound message, publishing results or the error report
    pub async fn dispatch<P: Publisher + ?Sized>(
        &self,
        inbound_topic: &str,
        raw_message: &[u8],
        publisher: &P,
    ) -> DispatchOutcome {
        debug!(
            "Inbound message on {}: {}",
            inbound_topic,
            String::from_utf8_lossy(raw_message)
        );

        if !inbound_topic.starts_with(self.settings.request_prefix.as_str()) {
            warn!("Unknown topic: {}", inbound_topic);
            return DispatchOutcome::Ignored;
        }

        let Some(request) = self.parse_request(inbound_topic) else {
            warn!("Request without task name on topic: {}", inbound_topic);
            return DispatchOutcome::Ignored;
        };

        let span = task_span!(task = %request.task, topic = %request.topic);
        self.serve(&request, publisher).instrument(span).await
    }

    async fn serve<P: Publisher + ?Sized>(
        &self,
        request: &Request,
        publisher: &P,
    ) -> DispatchOutcome {
        match self.plan(request) {
            Ok(commands) => {
                let mut accepted = 0;
                for command in commands {
                    if self.hand_off(publisher, command).await {
                        accepted += 1;
                    }
                }
                DispatchOutcome::Published(accepted)
            }
            Err(e) => {
                error!(
                    task = %request.task,
                    error_topic = %request.topic.error_topic(),
                    "Task failed: {:?}",
                    e
                );
                let report = PublishCommand::new(
                    request.topic.error_topic(),
                    e.to_string(),
                    self.settings.qos,
                    self.settings.retain,
                );
                self.hand_off(publisher, report).await;
                DispatchOutcome::ErrorReported
            }
        }
    }

    /// Resolve a request and compute every publish it produces.
    ///
    /// Nothing is published here, so a failing request never emits a partial
    /// fan-out.
    pub fn plan(&self, request: &Request) -> Result<Vec<PublishCommand>, DispatchError> {
        let payload = self.resolver.resolve(&request.task)?;

        if payload.is_multi_valued() && !request.topic.is_multi_valued() {
            return Err(DispatchError::MultiValuedOnScalarTopic {
                task: request.task.clone(),
                topic: request.topic.base_topic(),
                wildcard: self.settings.policy.wildcard,
            });
        }

        let serialize = |value: &Payload| {
            payload_as_string(value).map_err(|source| DispatchError::Serialization {
                task: request.task.clone(),
                source,
            })
        };

        match &payload {
            Payload::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| -> Result<PublishCommand, DispatchError> {
                    let subtopic = request.topic.subtopic(&index.to_string());
                    Ok(self.command(subtopic, serialize(item)?))
                })
                .collect(),
            Payload::Mapping(entries) => entries
                .iter()
                .map(|(key, value)| -> Result<PublishCommand, DispatchError> {
                    Ok(self.command(request.topic.subtopic(key), serialize(value)?))
                })
                .collect(),
            Payload::Scalar(_) => Ok(vec![
                self.command(request.topic.base_topic(), serialize(&payload)?)
            ]),
        }
    }

    fn command(&self, topic: String, payload: String) -> PublishCommand {
        PublishCommand::new(topic, payload, self.settings.qos, self.settings.retain)
    }

    /// Returns whether the publisher accepted `command`
    async fn hand_off<P: Publisher + ?Sized>(
        &self,
        publisher: &P,
        command: PublishCommand,
    ) -> bool {
        info!("publish('{}', '{}')", command.topic, command.payload);
        let topic = command.topic.clone();
        match publisher.publish(command).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to publish to {}: {}", topic, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{MockPublisher, MockResolver};

    fn settings() -> DispatchSettings {
        DispatchSettings {
            request_prefix: "host/request/".to_string(),
            topic_prefix: "host/".to_string(),
            policy: TopicPolicy::default(),
            qos: QoS::AtLeastOnce,
            retain: false,
        }
    }

    fn dispatcher(resolver: MockResolver) -> TaskDispatcher<MockResolver> {
        TaskDispatcher::new(resolver, settings())
    }

    #[test]
    fn test_parse_request_strips_request_prefix() {
        let dispatcher = dispatcher(MockResolver::new());
        let request = dispatcher.parse_request("host/request/cpu/percent").unwrap();
        assert_eq!(request.task, "cpu/percent");
        assert_eq!(request.topic.base_topic(), "host/cpu/percent");
    }

    #[test]
    fn test_parse_request_strips_topic_prefix_defensively() {
        let dispatcher = dispatcher(MockResolver::new());
        let request = dispatcher
            .parse_request("host/request/host/cpu/percent")
            .unwrap();
        assert_eq!(request.task, "cpu/percent");
        assert_eq!(request.topic.base_topic(), "host/cpu/percent");
    }

    #[test]
    fn test_parse_request_rejects_foreign_topic() {
        let dispatcher = dispatcher(MockResolver::new());
        assert!(dispatcher.parse_request("other/cpu").is_none());
    }

    #[test]
    fn test_parse_request_rejects_empty_task() {
        let dispatcher = dispatcher(MockResolver::new());
        assert!(dispatcher.parse_request("host/request/").is_none());
        assert!(dispatcher.parse_request("host/request/host/").is_none());
    }

    #[tokio::test]
    async fn test_foreign_topic_is_ignored() {
        let dispatcher = dispatcher(MockResolver::new().with_value("cpu", Payload::integer(1)));
        let publisher = MockPublisher::new();

        let outcome = dispatcher.dispatch("elsewhere/cpu", b"", &publisher).await;

        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert!(publisher.published().is_empty());
        assert!(dispatcher.resolver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_scalar_publishes_base_topic() {
        let dispatcher =
            dispatcher(MockResolver::new().with_value("cpu/percent", Payload::integer(42)));
        let publisher = MockPublisher::new();

        let outcome = dispatcher.dispatch("host/request/cpu/percent", b"", &publisher).await;

        assert_eq!(outcome, DispatchOutcome::Published(1));
        assert_eq!(
            publisher.published(),
            vec![PublishCommand::new(
                "host/cpu/percent",
                "42",
                QoS::AtLeastOnce,
                false
            )]
        );
    }

    #[tokio::test]
    async fn test_sequence_fans_out_by_index() {
        let dispatcher = dispatcher(MockResolver::new().with_value(
            "cpu_percent/*",
            Payload::Sequence(vec![Payload::float(1.5), Payload::float(2.0)]),
        ));
        let publisher = MockPublisher::new();

        dispatcher.dispatch("host/request/cpu_percent/*", b"", &publisher).await;

        assert_eq!(
            publisher.topics_and_payloads(),
            vec![
                ("host/cpu_percent/0".to_string(), "1.5".to_string()),
                ("host/cpu_percent/1".to_string(), "2.0".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_sequence_on_wildcard_publishes_nothing() {
        let dispatcher =
            dispatcher(MockResolver::new().with_value("disks/*", Payload::Sequence(vec![])));
        let publisher = MockPublisher::new();

        let outcome = dispatcher.dispatch("host/request/disks/*", b"", &publisher).await;

        assert_eq!(outcome, DispatchOutcome::Published(0));
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_mapping_on_scalar_topic_reports_error() {
        let dispatcher = dispatcher(MockResolver::new().with_value(
            "virtual_memory",
            Payload::mapping([("total", Payload::integer(1))]),
        ));
        let publisher = MockPublisher::new();

        let outcome = dispatcher.dispatch("host/request/virtual_memory", b"", &publisher).await;

        assert_eq!(outcome, DispatchOutcome::ErrorReported);
        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "host/error/virtual_memory");
        assert!(published[0].payload.contains("several values"));
    }

    #[tokio::test]
    async fn test_resolver_failure_reports_error() {
        let dispatcher = dispatcher(
            MockResolver::new().with_error("disk/usage", ResolveError::fault("disk not found")),
        );
        let publisher = MockPublisher::new();

        let outcome = dispatcher.dispatch("host/request/disk/usage", b"", &publisher).await;

        assert_eq!(outcome, DispatchOutcome::ErrorReported);
        assert_eq!(
            publisher.topics_and_payloads(),
            vec![(
                "host/error/disk/usage".to_string(),
                "disk not found".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_refused_publishes_are_attempted_but_not_counted() {
        let dispatcher = dispatcher(MockResolver::new().with_value(
            "load/*",
            Payload::mapping([("one", Payload::float(0.5)), ("five", Payload::float(0.25))]),
        ));
        let publisher = MockPublisher::with_failure();

        let outcome = dispatcher.dispatch("host/request/load/*", b"", &publisher).await;

        assert_eq!(outcome, DispatchOutcome::Published(0));
        assert_eq!(publisher.attempts(), 2);
    }

    #[tokio::test]
    async fn test_publish_options_follow_settings() {
        let mut settings = settings();
        settings.qos = QoS::ExactlyOnce;
        settings.retain = true;
        let dispatcher = TaskDispatcher::new(
            MockResolver::new().with_value("uptime", Payload::integer(5)),
            settings,
        );
        let publisher = MockPublisher::new();

        dispatcher.dispatch("host/request/uptime", b"", &publisher).await;

        let published = publisher.published();
        assert_eq!(published[0].qos, QoS::ExactlyOnce);
        assert!(published[0].retain);
    }

    #[tokio::test]
    async fn test_empty_request_prefix_accepts_every_topic() {
        let mut settings = settings();
        settings.request_prefix = String::new();
        let dispatcher = TaskDispatcher::new(
            MockResolver::new().with_value("uptime", Payload::integer(5)),
            settings,
        );
        let publisher = MockPublisher::new();

        let outcome = dispatcher.dispatch("uptime", b"", &publisher).await;

        assert_eq!(outcome, DispatchOutcome::Published(1));
        assert_eq!(publisher.published()[0].topic, "host/uptime");
    }
}
