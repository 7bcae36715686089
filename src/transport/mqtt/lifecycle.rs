//! Pure session lifecycle logic
//!
//! State transitions and the reconnect cooldown are decided here, without
//! touching the network, so the whole state machine is testable in isolation.

use super::connection::ConnectionState;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Input to the lifecycle state machine
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// Caller asked to connect
    ConnectRequested,
    /// Broker acknowledged the connection
    ConnAckReceived,
    /// Broker or network dropped the connection
    ConnectionLost(String),
}

/// Pure lifecycle decisions
pub struct LifecycleMonitor;

impl LifecycleMonitor {
    /// Determine the next state, or `None` when `event` is not valid in `current`
    pub fn determine_next_state(
        current: &ConnectionState,
        event: &LifecycleEvent,
    ) -> Option<ConnectionState> {
        use ConnectionState::*;

        match (current, event) {
            (Idle | Disconnected(_), LifecycleEvent::ConnectRequested) => {
                info!("Connecting to MQTT broker");
                Some(Connecting)
            }
            (Connecting, LifecycleEvent::ConnAckReceived) => {
                info!("MQTT session connected");
                Some(Connected)
            }
            (Connecting | Connected | Disconnected(_), LifecycleEvent::ConnectionLost(reason)) => {
                warn!("MQTT session disconnected: {}", reason);
                Some(Disconnected(reason.clone()))
            }
            (state, event) => {
                debug!("Ignoring {:?} in state {:?}", event, state);
                None
            }
        }
    }

    /// Whether inbound messages should reach the dispatcher
    pub fn accepts_messages(state: &ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }
}

/// Reconnect throttle armed by every disconnect
#[derive(Debug, Clone)]
pub struct Cooldown {
    period: Duration,
    deadline: Option<Instant>,
    generation: u64,
}

impl Cooldown {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            deadline: None,
            generation: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start a new cooldown window and return its generation
    pub fn arm(&mut self, now: Instant) -> u64 {
        self.generation += 1;
        self.deadline = Some(now + self.period);
        self.generation
    }

    /// Time left before connect attempts are accepted again
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .filter(|deadline| *deadline > now)
            .map(|deadline| deadline - now)
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.remaining(now).is_some()
    }

    /// Clear the window if `generation` is the current one.
    ///
    /// Returns false for timers of an older window, which must be ignored.
    pub fn complete(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.deadline = None;
        true
    }
}
