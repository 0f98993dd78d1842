//! Service trait and shared state for chat transports.
//!
//! A [`Service`] is the uniform capability surface a bot framework uses to
//! talk to one chat network. Each transport ships one implementation; the
//! dispatcher only ever holds an `Arc<dyn Service>`.

use crate::error::ServiceResult;
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error};

/// Stream of normalized messages produced by an opened service.
pub type MessageStream = mpsc::Receiver<Message>;

/// Connection lifecycle of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceState {
    /// `open` has not been called.
    #[default]
    Unopened,
    /// Dialing or waiting for the transport handshake.
    Connecting,
    /// Handshake complete; channels joined.
    Connected,
    /// Link lost; a reconnect follows unless the retry policy is exhausted.
    Disconnected,
}

/// Service status information.
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    /// Service name.
    pub name: String,
    /// Current state.
    pub state: ServiceState,
    /// Number of messages received.
    pub messages_received: u64,
    /// Number of messages sent.
    pub messages_sent: u64,
    /// Number of times the link was lost.
    pub disconnects: u64,
    /// Last error message, if any.
    pub last_error: Option<String>,
    /// Whether the service is healthy.
    pub healthy: bool,
}

/// Trait for implementing chat transports.
#[async_trait]
pub trait Service: Send + Sync {
    /// Static transport identifier, used for routing and config scoping.
    fn name(&self) -> &str;

    /// Connect and start delivering messages.
    ///
    /// Returns the message stream right away; the connection itself is
    /// established in the background and network failures are handled by
    /// the service's reconnect logic rather than reported here.
    async fn open(&self) -> ServiceResult<MessageStream>;

    /// Send a message to a channel.
    async fn send_message(&self, channel: &str, text: &str) -> ServiceResult<()>;

    /// Delete a previously sent message.
    async fn delete_message(&self, channel: &str, message_id: &str) -> ServiceResult<()>;

    /// Remove a user from a channel. Transports without real bans may kick
    /// instead and ignore `duration`.
    async fn ban_user(&self, channel: &str, user_id: &str, duration: Duration)
    -> ServiceResult<()>;

    /// The bot's own current display name on this transport.
    fn user_name(&self) -> String;

    /// Whether the bot itself sent `msg`.
    fn is_me(&self, msg: &Message) -> bool {
        msg.user_name() == self.user_name()
    }

    /// Set the bot's "now playing" status.
    async fn set_playing(&self, game: &str) -> ServiceResult<()>;

    /// Join an additional channel at runtime.
    async fn join(&self, target: &str) -> ServiceResult<()>;

    /// Show a typing indicator in a channel.
    async fn typing(&self, channel: &str) -> ServiceResult<()>;

    /// Send a direct message to a user.
    async fn private_message(&self, user_id: &str, text: &str) -> ServiceResult<()> {
        self.send_message(user_id, text).await
    }

    /// Whether messages may contain line breaks.
    fn supports_multiline(&self) -> bool;

    /// Prefix that marks a message as a bot command.
    fn command_prefix(&self) -> &str;

    /// Whether `msg` was sent privately rather than posted to a channel.
    fn is_private(&self, msg: &Message) -> bool;

    /// Get the current service status.
    async fn status(&self) -> ServiceStatus;
}

/// Type alias for a shared service.
pub type BoxedService = Arc<dyn Service>;

/// Shared state and counters used by service implementations.
pub struct ServiceBase {
    name: String,
    state: RwLock<ServiceState>,
    stats: RwLock<ServiceStats>,
}

impl std::fmt::Debug for ServiceBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBase")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct ServiceStats {
    messages_received: u64,
    messages_sent: u64,
    disconnects: u64,
    last_error: Option<String>,
}

impl ServiceBase {
    /// Create a new service base.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(ServiceState::default()),
            stats: RwLock::new(ServiceStats::default()),
        }
    }

    /// Get the service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state.
    pub async fn state(&self) -> ServiceState {
        *self.state.read().await
    }

    /// Set the service state.
    pub async fn set_state(&self, state: ServiceState) {
        *self.state.write().await = state;
        debug!(service = %self.name, ?state, "service state changed");
    }

    /// Record a received message.
    pub async fn record_received(&self) {
        self.stats.write().await.messages_received += 1;
    }

    /// Record a sent message.
    pub async fn record_sent(&self) {
        self.stats.write().await.messages_sent += 1;
    }

    /// Record a lost link.
    pub async fn record_disconnect(&self) {
        self.stats.write().await.disconnects += 1;
    }

    /// Record an error.
    pub async fn record_error(&self, error: impl Into<String>) {
        let error = error.into();
        error!(service = %self.name, %error, "service error");
        self.stats.write().await.last_error = Some(error);
    }

    /// Forget the last error, e.g. after a successful reconnect.
    pub async fn clear_error(&self) {
        self.stats.write().await.last_error = None;
    }

    /// Build status from current state and stats.
    pub async fn build_status(&self) -> ServiceStatus {
        let state = *self.state.read().await;
        let stats = self.stats.read().await;

        ServiceStatus {
            name: self.name.clone(),
            state,
            messages_received: stats.messages_received,
            messages_sent: stats.messages_sent,
            disconnects: stats.disconnects,
            last_error: stats.last_error.clone(),
            healthy: state == ServiceState::Connected && stats.last_error.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_service_base() {
        let base = ServiceBase::new("test");
        assert_eq!(base.name(), "test");
        assert_eq!(base.state().await, ServiceState::Unopened);

        base.set_state(ServiceState::Connected).await;
        assert_eq!(base.state().await, ServiceState::Connected);

        base.record_received().await;
        base.record_sent().await;
        base.record_disconnect().await;

        let status = base.build_status().await;
        assert_eq!(status.messages_received, 1);
        assert_eq!(status.messages_sent, 1);
        assert_eq!(status.disconnects, 1);
        assert!(status.healthy);
    }

    #[tokio::test]
    async fn test_errors_mark_unhealthy_until_cleared() {
        let base = ServiceBase::new("test");
        base.set_state(ServiceState::Connected).await;

        base.record_error("connection refused").await;
        let status = base.build_status().await;
        assert_eq!(status.last_error.as_deref(), Some("connection refused"));
        assert!(!status.healthy);

        base.clear_error().await;
        assert!(base.build_status().await.healthy);
    }
}
