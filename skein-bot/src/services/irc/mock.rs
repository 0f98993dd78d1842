//! In-memory connection used by the service tests.

use super::connection::{Connection, ConnectionEvent, Connector, EventSink, Identity};
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A recorded action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(String),
    Join(String),
    Privmsg(String, String),
    Kick(String, String),
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    events: Option<EventSink>,
    nick: String,
    failing_connects: usize,
    offline: bool,
}

/// Connector and connection in one; clones share state.
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<Mutex<State>>,
}

impl MockConnector {
    pub fn new(nick: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                nick: nick.to_string(),
                ..State::default()
            })),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn set_nick(&self, nick: &str) {
        self.state.lock().nick = nick.to_string();
    }

    pub fn fail_next_connects(&self, n: usize) {
        self.state.lock().failing_connects = n;
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Push an event as the connection's reader would.
    pub async fn emit(&self, event: ConnectionEvent) {
        let sink = self.state.lock().events.clone().expect("service not opened");
        sink.send(event).await.expect("worker stopped");
    }

    /// Wait until at least `n` calls were recorded.
    pub async fn wait_for_calls(&self, n: usize, limit: Duration) {
        tokio::time::timeout(limit, async {
            while self.state.lock().calls.len() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {n} calls, got {:?}", self.calls()));
    }

    fn record(&self, call: Call) -> TransportResult<()> {
        let mut state = self.state.lock();
        if state.offline {
            return Err(TransportError::NotConnected);
        }
        state.calls.push(call);
        Ok(())
    }
}

impl Connector for MockConnector {
    fn connection(&self, _identity: Identity, events: EventSink) -> Arc<dyn Connection> {
        self.state.lock().events = Some(events);
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Connection for MockConnector {
    async fn connect(&self, host: &str) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Connect(host.to_string()));
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(TransportError::Connect(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )));
        }
        Ok(())
    }

    fn join(&self, channel: &str) -> TransportResult<()> {
        self.record(Call::Join(channel.to_string()))
    }

    fn privmsg(&self, target: &str, text: &str) -> TransportResult<()> {
        self.record(Call::Privmsg(target.to_string(), text.to_string()))
    }

    fn kick(&self, channel: &str, nick: &str) -> TransportResult<()> {
        self.record(Call::Kick(channel.to_string(), nick.to_string()))
    }

    fn nick(&self) -> String {
        self.state.lock().nick.clone()
    }
}
