//! Mock implementations for testing
//!
//! Provides a mock publisher and a mock resolver so dispatching can be tested
//! without a broker or a live host.

use crate::protocol::{Payload, PublishCommand};
use crate::resolver::{ResolveError, ValueResolver};
use crate::transport::{MqttError, Publisher};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock publisher recording every command it is handed
#[derive(Debug, Default, Clone)]
pub struct MockPublisher {
    pub published: Arc<Mutex<Vec<PublishCommand>>>,
    pub attempts: Arc<Mutex<usize>>,
    pub should_fail: bool,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publisher refusing every command, as a session without a client would
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn published(&self) -> Vec<PublishCommand> {
        self.published
            .lock()
            .map(|published| published.clone())
            .unwrap_or_default()
    }

    pub fn topics_and_payloads(&self) -> Vec<(String, String)> {
        self.published()
            .into_iter()
            .map(|command| (command.topic, command.payload))
            .collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().map(|count| *count).unwrap_or_default()
    }

    pub fn clear_history(&self) {
        if let Ok(mut published) = self.published.lock() {
            published.clear();
        }
        if let Ok(mut attempts) = self.attempts.lock() {
            *attempts = 0;
        }
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(&self, command: PublishCommand) -> Result<(), MqttError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            *attempts += 1;
        }

        if self.should_fail {
            return Err(MqttError::PublishFailed("Mock publish failure".into()));
        }

        if let Ok(mut published) = self.published.lock() {
            published.push(command);
        }
        Ok(())
    }
}

/// Mock resolver answering from a fixed table
#[derive(Debug, Default)]
pub struct MockResolver {
    answers: HashMap<String, Result<Payload, ResolveError>>,
    calls: Mutex<Vec<String>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value<S: Into<String>>(mut self, task: S, payload: Payload) -> Self {
        self.answers.insert(task.into(), Ok(payload));
        self
    }

    pub fn with_error<S: Into<String>>(mut self, task: S, error: ResolveError) -> Self {
        self.answers.insert(task.into(), Err(error));
        self
    }

    /// Tasks resolved so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl ValueResolver for MockResolver {
    fn resolve(&self, task: &str) -> Result<Payload, ResolveError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(task.to_string());
        }

        self.answers
            .get(task)
            .cloned()
            .unwrap_or_else(|| Err(ResolveError::unknown_task(task)))
    }
}
