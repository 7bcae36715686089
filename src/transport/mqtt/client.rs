//! Impure I/O operations for the MQTT session
//!
//! [`Session`] owns the one broker connection of the process. A pump task polls
//! the rumqttc event loop and forwards routed [`BrokerEvent`]s over a channel;
//! [`Session::run`] consumes them one at a time, applies state transitions and
//! hands inbound messages to the dispatcher. A [`SessionHandle`] lets other
//! tasks post requests into the same event stream.

use super::connection::{
    configure_mqtt_options, request_subscription, BrokerEndpoint, ConnectionState, MqttError,
};
use super::lifecycle::{Cooldown, LifecycleEvent, LifecycleMonitor};
use super::message_handler::{BrokerEvent, MessageHandler};
use crate::config::BridgeConfig;
use crate::dispatch::TaskDispatcher;
use crate::mqtt_span;
use crate::protocol::PublishCommand;
use crate::resolver::ValueResolver;
use crate::transport::Publisher;
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

static SESSION_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Proof that this process created its one session
#[derive(Debug)]
struct SessionClaim(());

impl SessionClaim {
    fn acquire() -> Result<Self, MqttError> {
        SESSION_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| SessionClaim(()))
            .map_err(|_| MqttError::SessionAlreadyClaimed)
    }
}

/// Cloneable handle posting requests to a session's event loop
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events_tx: mpsc::UnboundedSender<BrokerEvent>,
}

impl SessionHandle {
    /// Ask the session to connect again to its last broker.
    ///
    /// The request is applied by the event loop with the same cooldown and
    /// state checks as [`Session::connect`]; refusals are logged there.
    pub fn request_reconnect(&self) -> Result<(), MqttError> {
        self.events_tx
            .send(BrokerEvent::ReconnectRequested)
            .map_err(|_| MqttError::SessionStopped)
    }
}

/// The single MQTT session of the process
///
/// A session is move-only and at most one can ever be constructed; a second
/// [`Session::new`] fails with [`MqttError::SessionAlreadyClaimed`].
///
/// Broker events travel over an unbounded channel: the pump must keep polling
/// while [`Session::run`] waits for room in the outbound request buffer.
pub struct Session {
    _claim: SessionClaim,
    config: BridgeConfig,
    state: ConnectionState,
    cooldown: Cooldown,
    endpoint: Option<BrokerEndpoint>,
    client: Option<AsyncClient>,
    events_tx: mpsc::UnboundedSender<BrokerEvent>,
    pump_handle: Option<JoinHandle<()>>,
}

impl Session {
    /// Create the process session and the receiver of its broker events
    pub fn new(
        config: BridgeConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<BrokerEvent>), MqttError> {
        let claim = SessionClaim::acquire()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cooldown = Cooldown::new(config.mqtt.reconnect_cooldown());

        info!(
            client_id = %config.mqtt.client_id,
            "Created MQTT session"
        );

        let session = Self {
            _claim: claim,
            config,
            state: ConnectionState::Idle,
            cooldown,
            endpoint: None,
            client: None,
            events_tx,
            pump_handle: None,
        };
        Ok((session, events_rx))
    }

    /// Handle for posting requests once [`Session::run`] owns the session
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            events_tx: self.events_tx.clone(),
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected)
    }

    pub fn client_id(&self) -> &str {
        &self.config.mqtt.client_id
    }

    pub fn qos(&self) -> QoS {
        self.config.mqtt.qos()
    }

    pub fn retain(&self) -> bool {
        self.config.mqtt.retain
    }

    pub fn topic_prefix(&self) -> &str {
        &self.config.topics.prefix
    }

    pub fn request_topic_prefix(&self) -> &str {
        &self.config.topics.request_prefix
    }

    /// Whether a connect attempt would pass the cooldown check now
    pub fn reconnect_permitted(&self) -> bool {
        !self.cooldown.is_active(Instant::now())
    }

    /// Start connecting to the broker.
    ///
    /// Only contract violations are returned: a connect during the cooldown or
    /// while already connecting/connected. Network failures arrive later as a
    /// [`BrokerEvent::Disconnected`].
    pub fn connect(
        &mut self,
        host: &str,
        port: u16,
        username: &str,
        password: Option<&str>,
    ) -> Result<(), MqttError> {
        self.connect_endpoint(BrokerEndpoint::new(host, port, username, password))
    }

    fn connect_endpoint(&mut self, endpoint: BrokerEndpoint) -> Result<(), MqttError> {
        let span = mqtt_span!(host = %endpoint.host, port = endpoint.port);
        let _guard = span.enter();

        if let Some(remaining) = self.cooldown.remaining(Instant::now()) {
            warn!("Connect refused, cooldown has {:?} left", remaining);
            return Err(MqttError::CooldownActive { remaining });
        }

        let next = LifecycleMonitor::determine_next_state(
            &self.state,
            &LifecycleEvent::ConnectRequested,
        )
        .ok_or_else(|| MqttError::InvalidState {
            state: self.state.clone(),
        })?;

        debug!(
            "Connecting to '{}:{}' from state {}",
            endpoint.host,
            endpoint.port,
            self.state.name()
        );
        let mqtt_options = configure_mqtt_options(&self.config.mqtt, &endpoint);
        let (client, event_loop) =
            AsyncClient::new(mqtt_options, self.config.mqtt.channel_capacity);

        if let Some(handle) = self.pump_handle.take() {
            handle.abort();
        }
        self.pump_handle = Some(tokio::spawn(pump_events(
            event_loop,
            self.events_tx.clone(),
        )));

        self.client = Some(client);
        self.endpoint = Some(endpoint);
        self.state = next;
        Ok(())
    }

    /// Apply one broker event to the session.
    ///
    /// Returns the inbound message to dispatch, if any.
    pub fn handle_event(&mut self, event: BrokerEvent) -> Option<(String, Vec<u8>)> {
        match event {
            BrokerEvent::Connected => {
                self.on_connected();
                None
            }
            BrokerEvent::Disconnected { reason } => {
                self.on_disconnected(reason);
                None
            }
            BrokerEvent::CooldownElapsed { generation } => {
                self.on_cooldown_elapsed(generation);
                None
            }
            BrokerEvent::ReconnectRequested => {
                self.reconnect("Requested reconnect");
                None
            }
            BrokerEvent::MessageArrived { topic, payload } => {
                if LifecycleMonitor::accepts_messages(&self.state) {
                    Some((topic, payload))
                } else {
                    warn!("Dropping message on {} while {}", topic, self.state.name());
                    None
                }
            }
        }
    }

    fn on_connected(&mut self) {
        let Some(next) =
            LifecycleMonitor::determine_next_state(&self.state, &LifecycleEvent::ConnAckReceived)
        else {
            return;
        };
        self.state = next;

        let Some(subscription) = request_subscription(&self.config.topics.request_prefix) else {
            debug!("No request prefix configured, not subscribing");
            return;
        };

        if let Some(client) = &self.client {
            debug!("Connected to MQTT broker, subscribing to topic {}", subscription);
            if let Err(e) = client.try_subscribe(&subscription, self.qos()) {
                error!(
                    "Failed to subscribe to {}: {}",
                    subscription,
                    MqttError::SubscriptionFailed(Box::new(e))
                );
            }
        }
    }

    fn on_disconnected(&mut self, reason: String) {
        let Some(next) = LifecycleMonitor::determine_next_state(
            &self.state,
            &LifecycleEvent::ConnectionLost(reason),
        ) else {
            return;
        };
        self.state = next;
        self.client = None;

        let generation = self.cooldown.arm(Instant::now());
        let period = self.cooldown.period();
        let events_tx = self.events_tx.clone();
        info!("Reconnect cooldown of {:?} started", period);

        tokio::spawn(async move {
            tokio::time::sleep(period).await;
            let _ = events_tx.send(BrokerEvent::CooldownElapsed { generation });
        });
    }

    fn on_cooldown_elapsed(&mut self, generation: u64) {
        if !self.cooldown.complete(generation) {
            debug!("Ignoring stale cooldown timer {}", generation);
            return;
        }
        info!("Reconnect cooldown elapsed");

        if self.config.mqtt.reconnect_after_cooldown {
            self.reconnect("Reconnect after cooldown");
        }
    }

    fn reconnect(&mut self, trigger: &str) {
        let Some(endpoint) = self.endpoint.clone() else {
            warn!("{} ignored, no broker connected before", trigger);
            return;
        };
        if let Err(e) = self.connect_endpoint(endpoint) {
            warn!("{} not started: {}", trigger, e);
        }
    }

    /// Consume broker events for the lifetime of the session.
    ///
    /// Every event, including the dispatch of an inbound message, completes
    /// before the next one is received.
    pub async fn run<R: ValueResolver>(
        mut self,
        mut events: mpsc::UnboundedReceiver<BrokerEvent>,
        dispatcher: TaskDispatcher<R>,
    ) {
        info!("MQTT session event loop started for {}", self.client_id());

        while let Some(event) = events.recv().await {
            if let Some((topic, payload)) = self.handle_event(event) {
                dispatcher.dispatch(&topic, &payload, &self).await;
            }
        }

        info!("MQTT session event loop stopped for {}", self.client_id());
    }
}

#[async_trait]
impl Publisher for Session {
    /// Queue `command` on the client, waiting for room in its request buffer
    async fn publish(&self, command: PublishCommand) -> Result<(), MqttError> {
        let client = self.client.as_ref().ok_or_else(|| MqttError::NotConnected {
            state: self.state.clone(),
        })?;

        client
            .publish(
                command.topic,
                command.qos,
                command.retain,
                command.payload.into_bytes(),
            )
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(handle) = self.pump_handle.take() {
            handle.abort();
        }
    }
}

/// Poll the rumqttc event loop and forward routed events.
///
/// Stops after the first disconnect or transport error so reconnection stays
/// under the control of the session state machine.
async fn pump_events(mut event_loop: EventLoop, events_tx: mpsc::UnboundedSender<BrokerEvent>) {
    loop {
        let event = match event_loop.poll().await {
            Ok(event) => MessageHandler::route_mqtt_event(&event),
            Err(e) => {
                error!("MQTT event loop error: {}", e);
                Some(BrokerEvent::Disconnected {
                    reason: e.to_string(),
                })
            }
        };

        let Some(event) = event else {
            continue;
        };
        let ends_connection = event.ends_connection();

        if events_tx.send(event).is_err() {
            debug!("Session event channel closed, stopping MQTT event pump");
            break;
        }
        if ends_connection {
            break;
        }
    }
}
