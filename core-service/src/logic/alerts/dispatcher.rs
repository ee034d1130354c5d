//! Alert Dispatcher
//!
//! Sends one snapshot to every channel concurrently, each under its own
//! timeout, and waits for all of them. A channel that errors, panics, times
//! out, or reports failure is recorded as `false`; the others are unaffected.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::types::{AlertError, AlertOutcome};
use crate::logic::types::ForensicSnapshot;

// ============================================================================
// CHANNEL CAPABILITY
// ============================================================================

/// A notification transport
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Unique channel name, used as the key in `AlertOutcome`
    fn name(&self) -> &str;

    /// Deliver the snapshot. `Ok(false)` means the channel declined (e.g. no recipients).
    async fn send(&self, snapshot: &ForensicSnapshot) -> Result<bool, AlertError>;
}

// ============================================================================
// DISPATCHER
// ============================================================================

pub struct AlertDispatcher {
    channels: Vec<Arc<dyn AlertChannel>>,
    timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self { channels: Vec::new(), timeout }
    }

    pub fn with_channels(channels: Vec<Arc<dyn AlertChannel>>, timeout: Duration) -> Self {
        let mut dispatcher = Self::new(timeout);
        for channel in channels {
            dispatcher.add_channel(channel);
        }
        dispatcher
    }

    /// Add a channel; a channel with the same name is replaced
    pub fn add_channel(&mut self, channel: Arc<dyn AlertChannel>) {
        self.channels.retain(|c| c.name() != channel.name());
        self.channels.push(channel);
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fan out to all channels; returns once every channel has finished or timed out.
    pub async fn dispatch(&self, snapshot: &ForensicSnapshot) -> AlertOutcome {
        let shared = Arc::new(snapshot.clone());

        let tasks: Vec<_> = self
            .channels
            .iter()
            .map(|channel| {
                let channel = Arc::clone(channel);
                let snapshot = Arc::clone(&shared);
                let timeout = self.timeout;
                let name = channel.name().to_string();
                (name, tokio::spawn(async move { deliver(channel, snapshot, timeout).await }))
            })
            .collect();

        let mut outcome = AlertOutcome::default();
        for (name, task) in tasks {
            let success = match task.await {
                Ok(success) => success,
                Err(e) => {
                    log::error!("Alert channel {} crashed: {}", name, e);
                    false
                }
            };
            outcome.record(name, success);
        }

        log::info!(
            "Alert for {} dispatched: {}/{} channels delivered",
            snapshot.decoy_id(),
            outcome.delivered(),
            outcome.results.len()
        );
        outcome
    }

    /// Deliver to a single channel by name (operator "test alert")
    pub async fn send_test(&self, channel_name: &str, snapshot: &ForensicSnapshot) -> Result<bool, AlertError> {
        let channel = self
            .channels
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(channel_name))
            .cloned()
            .ok_or_else(|| AlertError::Config(format!("channel not found: {}", channel_name)))?;

        match tokio::time::timeout(self.timeout, channel.send(snapshot)).await {
            Ok(result) => result,
            Err(_) => Err(AlertError::Timeout),
        }
    }
}

async fn deliver(channel: Arc<dyn AlertChannel>, snapshot: Arc<ForensicSnapshot>, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, channel.send(&snapshot)).await {
        Ok(Ok(true)) => true,
        Ok(Ok(false)) => {
            log::warn!("Alert channel {} declined delivery", channel.name());
            false
        }
        Ok(Err(e)) => {
            log::error!("Failed to send alert via {}: {}", channel.name(), e);
            false
        }
        Err(_) => {
            log::error!("Alert channel {} timed out after {:?}", channel.name(), timeout);
            false
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
