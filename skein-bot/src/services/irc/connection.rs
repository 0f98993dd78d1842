//! The wire-level connection the IRC service drives.
//!
//! [`IrcService`](super::IrcService) never speaks the protocol itself. It
//! asks a [`Connector`] for a [`Connection`], hands it an event sink and
//! then only reacts to [`ConnectionEvent`]s and forwards actions.

use super::line::Line;
use crate::error::TransportResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Events a connection reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Registration with the server completed.
    Connected,
    /// The link was lost.
    Disconnected {
        /// Why the link went down.
        reason: String,
    },
    /// A PRIVMSG arrived.
    Message(Line),
}

/// Sender half used by a connection to report events.
///
/// Bounded: a connection blocks when its owner stops draining events.
pub type EventSink = mpsc::Sender<ConnectionEvent>;

/// Who the bot claims to be when registering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Desired nickname.
    pub nick: String,
    /// Username (ident).
    pub user: String,
    /// Real name.
    pub realname: String,
    /// Reply sent to CTCP VERSION requests.
    pub version: String,
}

/// A connection to one IRC server.
///
/// Must tolerate action calls from any task while its own reader loop runs.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Dial `host` and start registration.
    ///
    /// Returns once the socket is up. [`ConnectionEvent::Connected`]
    /// follows when the server accepts the registration.
    async fn connect(&self, host: &str) -> TransportResult<()>;

    /// Join a channel.
    fn join(&self, channel: &str) -> TransportResult<()>;

    /// Send a message to a channel or nick.
    fn privmsg(&self, target: &str, text: &str) -> TransportResult<()>;

    /// Kick a nick from a channel.
    fn kick(&self, channel: &str, nick: &str) -> TransportResult<()>;

    /// Our current nick as the server knows it.
    fn nick(&self) -> String;
}

/// Creates connections. One connection is created per opened service.
pub trait Connector: Send + Sync {
    /// Build an unconnected connection reporting to `events`.
    fn connection(&self, identity: Identity, events: EventSink) -> Arc<dyn Connection>;
}
