//! IRC service.
//!
//! [`IrcService`] adapts an IRC [`Connection`] to the [`Service`] trait.
//! A background worker owns the connection's event stream: it joins the
//! configured channels on every successful registration, reconnects after
//! every lost link and turns each PRIVMSG into a [`Message`] on the
//! service's bounded stream.
//!
//! # Example
//!
//! ```rust,ignore
//! use skein_bot::prelude::*;
//!
//! let irc = IrcService::new(IrcConfig::new("irc.libera.chat", "skein", ["#skein"]));
//! let mut messages = irc.open().await?;
//! while let Some(msg) = messages.recv().await {
//!     if !irc.is_me(&msg) && msg.message() == "!ping" {
//!         irc.send_message(msg.channel(), "pong").await?;
//!     }
//! }
//! ```

pub mod client;
pub mod connection;
pub mod line;

#[cfg(test)]
mod mock;

pub use client::{TcpConnection, TcpConnector};
pub use connection::{Connection, ConnectionEvent, Connector, EventSink, Identity};
pub use line::Line;

use crate::config::{IrcConfig, ReconnectConfig};
use crate::error::{Capability, ServiceError, ServiceResult};
use crate::message::Message;
use crate::service::{MessageStream, Service, ServiceBase, ServiceState, ServiceStatus};
use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Service name of the IRC transport.
pub const IRC_SERVICE_NAME: &str = "IRC";

/// Capacity of the queue between the connection and the worker.
const EVENT_QUEUE_CAPACITY: usize = 64;

/// IRC implementation of [`Service`].
pub struct IrcService {
    base: Arc<ServiceBase>,
    config: IrcConfig,
    connector: Arc<dyn Connector>,
    connection: OnceLock<Arc<dyn Connection>>,
}

impl std::fmt::Debug for IrcService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrcService")
            .field("base", &self.base)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl IrcService {
    /// Create an IRC service that connects over plain TCP.
    #[must_use]
    pub fn new(config: IrcConfig) -> Self {
        Self::with_connector(config, Arc::new(TcpConnector))
    }

    /// Create an IRC service using a custom connector.
    #[must_use]
    pub fn with_connector(config: IrcConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            base: Arc::new(ServiceBase::new(IRC_SERVICE_NAME)),
            config,
            connector,
            connection: OnceLock::new(),
        }
    }

    /// Get the service configuration.
    #[must_use]
    pub const fn config(&self) -> &IrcConfig {
        &self.config
    }

    fn connection(&self) -> ServiceResult<&Arc<dyn Connection>> {
        self.connection.get().ok_or(ServiceError::NotOpen)
    }

    fn identity(&self) -> Identity {
        Identity {
            nick: self.config.nick.clone(),
            user: self.config.user.clone(),
            realname: self.config.realname.clone(),
            version: self.config.version.clone(),
        }
    }

    fn check_config(&self) -> ServiceResult<()> {
        if self.config.host.trim().is_empty() {
            return Err(ServiceError::config("irc host is empty"));
        }
        if self.config.nick.is_empty() {
            return Err(ServiceError::config("irc nick is empty"));
        }
        if self.config.queue_capacity == 0 {
            return Err(ServiceError::config("queue capacity must be at least 1"));
        }
        Ok(())
    }
}

/// Translate a PRIVMSG line into a normalized message.
///
/// IRC has no avatars, message IDs or moderator flag on a plain PRIVMSG, so
/// those stay empty. The user ID is the nick.
#[must_use]
pub fn translate(line: &Line) -> Message {
    Message::new(line.target(), line.nick(), line.text())
}

#[async_trait]
impl Service for IrcService {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn open(&self) -> ServiceResult<MessageStream> {
        self.check_config()?;
        if self.connection.get().is_some() {
            return Err(ServiceError::AlreadyOpen);
        }

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let connection = self.connector.connection(self.identity(), event_tx);
        self.connection
            .set(Arc::clone(&connection))
            .map_err(|_| ServiceError::AlreadyOpen)?;

        let (message_tx, message_rx) = mpsc::channel(self.config.queue_capacity);
        self.base.set_state(ServiceState::Connecting).await;

        let worker = Worker {
            base: Arc::clone(&self.base),
            connection,
            host: self.config.host.clone(),
            channels: self.config.channels.clone(),
            reconnect: self.config.reconnect,
            messages: message_tx,
            failures: 0,
            registered: false,
        };
        tokio::spawn(worker.run(event_rx));

        info!(host = %self.config.host, nick = %self.config.nick, "irc service opened");
        Ok(message_rx)
    }

    async fn send_message(&self, channel: &str, text: &str) -> ServiceResult<()> {
        self.connection()?.privmsg(channel, text)?;
        self.base.record_sent().await;
        Ok(())
    }

    async fn delete_message(&self, _channel: &str, _message_id: &str) -> ServiceResult<()> {
        Err(ServiceError::unsupported(
            IRC_SERVICE_NAME,
            Capability::DeleteMessage,
        ))
    }

    async fn ban_user(
        &self,
        channel: &str,
        user_id: &str,
        duration: Duration,
    ) -> ServiceResult<()> {
        // No timed bans on plain IRC; a kick is the closest primitive.
        debug!(%channel, user = %user_id, ?duration, "kicking in place of ban");
        self.connection()?.kick(channel, user_id)?;
        Ok(())
    }

    fn user_name(&self) -> String {
        self.connection
            .get()
            .map_or_else(|| self.config.nick.clone(), |c| c.nick())
    }

    async fn set_playing(&self, _game: &str) -> ServiceResult<()> {
        Err(ServiceError::unsupported(
            IRC_SERVICE_NAME,
            Capability::SetPlaying,
        ))
    }

    async fn join(&self, target: &str) -> ServiceResult<()> {
        self.connection()?.join(target)?;
        Ok(())
    }

    async fn typing(&self, _channel: &str) -> ServiceResult<()> {
        Err(ServiceError::unsupported(IRC_SERVICE_NAME, Capability::Typing))
    }

    fn supports_multiline(&self) -> bool {
        false
    }

    fn command_prefix(&self) -> &str {
        "!"
    }

    fn is_private(&self, msg: &Message) -> bool {
        // A PRIVMSG addressed to us is normalized with the sender as its
        // channel. Two empty fields count as private too.
        msg.channel() == msg.user_name()
    }

    async fn status(&self) -> ServiceStatus {
        self.base.build_status().await
    }
}

/// Owns the connection's event stream for one opened service.
struct Worker {
    base: Arc<ServiceBase>,
    connection: Arc<dyn Connection>,
    host: String,
    channels: Vec<String>,
    reconnect: ReconnectConfig,
    messages: mpsc::Sender<Message>,
    /// Consecutive failed connection attempts since the last registration.
    failures: u32,
    /// Whether the current link completed registration.
    registered: bool,
}

impl Worker {
    async fn run(mut self, mut events: mpsc::Receiver<ConnectionEvent>) {
        if !self.connect().await {
            return;
        }

        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::Connected => self.on_connected().await,
                ConnectionEvent::Disconnected { reason } => {
                    warn!(host = %self.host, %reason, "irc disconnected");
                    self.base.set_state(ServiceState::Disconnected).await;
                    self.base.record_disconnect().await;
                    // A registered link retries from zero; one that never
                    // registered counts as a failed attempt.
                    if !std::mem::take(&mut self.registered) {
                        self.failures = self.failures.saturating_add(1);
                    }
                    if !self.connect().await {
                        break;
                    }
                }
                ConnectionEvent::Message(line) => self.on_message(&line).await,
            }
        }

        debug!(host = %self.host, "irc worker stopped");
    }

    async fn on_connected(&mut self) {
        self.failures = 0;
        self.registered = true;
        self.base.clear_error().await;
        self.base.set_state(ServiceState::Connected).await;
        info!(host = %self.host, nick = %self.connection.nick(), "irc connected");

        for channel in &self.channels {
            match self.connection.join(channel) {
                Ok(()) => debug!(%channel, "joining channel"),
                Err(e) => warn!(%channel, error = %e, "failed to join channel"),
            }
        }
    }

    async fn on_message(&self, line: &Line) {
        let message = translate(line);
        self.base.record_received().await;

        // Blocks while the stream is full; this is the only backpressure.
        if self.messages.send(message).await.is_err() {
            debug!("message stream receiver dropped");
        }
    }

    /// Dial until the connection is up or the retry policy gives up.
    async fn connect(&mut self) -> bool {
        loop {
            if self.reconnect.exhausted(self.failures) {
                error!(
                    host = %self.host,
                    failures = self.failures,
                    "giving up on irc connection"
                );
                self.base.set_state(ServiceState::Disconnected).await;
                return false;
            }

            let delay = self.reconnect.delay_for(self.failures);
            if !delay.is_zero() {
                info!(host = %self.host, ?delay, "waiting before reconnect");
                tokio::time::sleep(delay).await;
            }

            self.base.set_state(ServiceState::Connecting).await;
            match self.connection.connect(&self.host).await {
                Ok(()) => return true,
                Err(e) => {
                    self.failures = self.failures.saturating_add(1);
                    self.base
                        .record_error(format!("connect to {} failed: {e}", self.host))
                        .await;
                }
            }
        }
    }
}
