//! Outbound message types

use rumqttc::QoS;

/// One publish handed to the outbound channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishCommand {
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
    pub retain: bool,
}

impl PublishCommand {
    pub fn new<T: Into<String>, P: Into<String>>(
        topic: T,
        payload: P,
        qos: QoS,
        retain: bool,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        }
    }
}

/// Map a configured QoS level onto the MQTT type
pub fn qos_from_level(level: u8) -> Option<QoS> {
    match level {
        0 => Some(QoS::AtMostOnce),
        1 => Some(QoS::AtLeastOnce),
        2 => Some(QoS::ExactlyOnce),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_from_level() {
        assert_eq!(qos_from_level(0), Some(QoS::AtMostOnce));
        assert_eq!(qos_from_level(1), Some(QoS::AtLeastOnce));
        assert_eq!(qos_from_level(2), Some(QoS::ExactlyOnce));
        assert_eq!(qos_from_level(3), None);
    }

    #[test]
    fn test_publish_command_new() {
        let command = PublishCommand::new("a/b", "1", QoS::AtLeastOnce, true);
        assert_eq!(command.topic, "a/b");
        assert_eq!(command.payload, "1");
        assert_eq!(command.qos, QoS::AtLeastOnce);
        assert!(command.retain);
    }
}
