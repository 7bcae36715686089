//! Request dispatching tests
//!
//! Drive the dispatcher with a mock resolver and a mock publisher and check the
//! exact topic/payload pairs that would reach the broker.


use hostmqtt::dispatch::DispatchOutcome;
use hostmqtt::protocol::Payload;
use hostmqtt::resolver::ResolveError;
use hostmqtt::testing::{MockPublisher, MockResolver};
use rumqttc::QoS;
use test_helpers::{request_topic, test_dispatcher};

fn pair(topic: &str, payload: &str) -> (String, String) {
    (topic.to_string(), payload.to_string())
}

#[tokio::test]
async fn test_scalar_result_publishes_once() {
    let dispatcher =
        test_dispatcher(MockResolver::new().with_value("cpu/percent", Payload::integer(42)));
    let publisher = MockPublisher::new();

    let outcome = dispatcher.dispatch(&request_topic("cpu/percent"), b"", &publisher).await;

    assert_eq!(outcome, DispatchOutcome::Published(1));
    assert_eq!(
        publisher.topics_and_payloads(),
        vec![pair("host/cpu/percent", "42")]
    );
}

#[tokio::test]
async fn test_mapping_fans_out_over_wildcard() {
    let dispatcher = test_dispatcher(MockResolver::new().with_value(
        "disk/*/usage",
        Payload::mapping([("sda", Payload::integer(10)), ("sdb", Payload::integer(20))]),
    ));
    let publisher = MockPublisher::new();

    let outcome = dispatcher.dispatch(&request_topic("disk/*/usage"), b"", &publisher).await;

    assert_eq!(outcome, DispatchOutcome::Published(2));
    assert_eq!(
        publisher.topics_and_payloads(),
        vec![
            pair("host/disk/sda/usage", "10"),
            pair("host/disk/sdb/usage", "20"),
        ]
    );
}

#[tokio::test]
async fn test_resolver_fault_goes_to_error_topic() {
    let dispatcher = test_dispatcher(
        MockResolver::new().with_error("disk/usage", ResolveError::fault("disk not found")),
    );
    let publisher = MockPublisher::new();

    let outcome = dispatcher.dispatch(&request_topic("disk/usage"), b"", &publisher).await;

    assert_eq!(outcome, DispatchOutcome::ErrorReported);
    assert_eq!(
        publisher.topics_and_payloads(),
        vec![pair("host/error/disk/usage", "disk not found")]
    );
}

#[tokio::test]
async fn test_unknown_task_goes_to_error_topic() {
    let dispatcher = test_dispatcher(MockResolver::new());
    let publisher = MockPublisher::new();

    dispatcher.dispatch(&request_topic("gpu/temp"), b"", &publisher).await;

    let published = publisher.topics_and_payloads();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "host/error/gpu/temp");
    assert!(published[0].1.contains("gpu/temp"));
}

#[tokio::test]
async fn test_multi_valued_result_on_scalar_topic_only_reports_error() {
    let dispatcher = test_dispatcher(MockResolver::new().with_value(
        "memory",
        Payload::mapping([("total", Payload::integer(8)), ("free", Payload::integer(2))]),
    ));
    let publisher = MockPublisher::new();

    let outcome = dispatcher.dispatch(&request_topic("memory"), b"", &publisher).await;

    assert_eq!(outcome, DispatchOutcome::ErrorReported);
    let published = publisher.topics_and_payloads();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "host/error/memory");
}

#[tokio::test]
async fn test_single_element_sequence_still_needs_wildcard() {
    let dispatcher = test_dispatcher(
        MockResolver::new().with_value("load", Payload::Sequence(vec![Payload::float(0.5)])),
    );
    let publisher = MockPublisher::new();

    let outcome = dispatcher.dispatch(&request_topic("load"), b"", &publisher).await;

    assert_eq!(outcome, DispatchOutcome::ErrorReported);
    assert_eq!(publisher.topics_and_payloads()[0].0, "host/error/load");
}

#[tokio::test]
async fn test_nested_single_element_sequence_is_flattened() {
    let dispatcher = test_dispatcher(MockResolver::new().with_value(
        "load/*",
        Payload::mapping([("one", Payload::Sequence(vec![Payload::float(0.5)]))]),
    ));
    let publisher = MockPublisher::new();

    dispatcher.dispatch(&request_topic("load/*"), b"", &publisher).await;

    assert_eq!(publisher.topics_and_payloads(), vec![pair("host/load/one", "0.5")]);
}

#[tokio::test]
async fn test_sequence_fans_out_by_index() {
    let dispatcher = test_dispatcher(MockResolver::new().with_value(
        "cpu/*",
        Payload::Sequence(vec![Payload::float(12.5), Payload::float(3.0)]),
    ));
    let publisher = MockPublisher::new();

    dispatcher.dispatch(&request_topic("cpu/*"), b"", &publisher).await;

    assert_eq!(
        publisher.topics_and_payloads(),
        vec![pair("host/cpu/0", "12.5"), pair("host/cpu/1", "3.0")]
    );
}

#[tokio::test]
async fn test_nested_values_are_json() {
    let dispatcher = test_dispatcher(MockResolver::new().with_value(
        "net/*",
        Payload::mapping([(
            "eth0",
            Payload::mapping([("rx", Payload::integer(1)), ("up", Payload::boolean(true))]),
        )]),
    ));
    let publisher = MockPublisher::new();

    dispatcher.dispatch(&request_topic("net/*"), b"", &publisher).await;

    assert_eq!(
        publisher.topics_and_payloads(),
        vec![pair("host/net/eth0", r#"{"rx": 1, "up": true}"#)]
    );
}

#[tokio::test]
async fn test_topics_outside_request_prefix_are_ignored() {
    let resolver = MockResolver::new().with_value("cpu", Payload::integer(1));
    let dispatcher = test_dispatcher(resolver);
    let publisher = MockPublisher::new();

    assert_eq!(
        dispatcher.dispatch("other/request/cpu", b"", &publisher).await,
        DispatchOutcome::Ignored
    );
    assert_eq!(
        dispatcher.dispatch("host/request/", b"", &publisher).await,
        DispatchOutcome::Ignored
    );
    assert_eq!(publisher.attempts(), 0);
}

#[tokio::test]
async fn test_publish_options_come_from_config() {
    let dispatcher = test_dispatcher(MockResolver::new().with_value("uptime", Payload::integer(5)));
    let publisher = MockPublisher::new();

    dispatcher.dispatch(&request_topic("uptime"), b"", &publisher).await;

    let published = publisher.published();
    assert_eq!(published[0].qos, QoS::AtLeastOnce);
    assert!(!published[0].retain);
}

#[tokio::test]
async fn test_failing_publisher_does_not_stop_fan_out() {
    let dispatcher = test_dispatcher(MockResolver::new().with_value(
        "disk/*",
        Payload::mapping([("a", Payload::integer(1)), ("b", Payload::integer(2))]),
    ));
    let publisher = MockPublisher::with_failure();

    let outcome = dispatcher.dispatch(&request_topic("disk/*"), b"", &publisher).await;

    // Refused hand-offs are attempted but not counted as published
    assert_eq!(outcome, DispatchOutcome::Published(0));
    assert_eq!(publisher.attempts(), 2);
}

#[tokio::test]
async fn test_message_body_is_not_used() {
    let resolver = MockResolver::new().with_value("uptime", Payload::integer(5));
    let dispatcher = test_dispatcher(resolver);
    let publisher = MockPublisher::new();

    dispatcher.dispatch(&request_topic("uptime"), b"anything at all", &publisher).await;

    assert_eq!(publisher.topics_and_payloads(), vec![pair("host/uptime", "5")]);
}
