//! Plain TCP IRC connection.
//!
//! Handles registration (NICK/USER), PING/PONG, nick collisions during
//! registration, CTCP VERSION and keepalive. Everything else that arrives
//! as PRIVMSG is reported to the owner as a [`ConnectionEvent::Message`].
//!
//! Writes are queued on an unbounded channel and flushed by a writer task,
//! so action calls never wait on the socket.

use super::connection::{Connection, ConnectionEvent, Connector, EventSink, Identity};
use super::line::Line;
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tracing::{debug, info, trace, warn};

/// Port used when the host does not name one.
pub const DEFAULT_PORT: u16 = 6667;

/// Silence after which a keepalive PING is sent. Twice this is a timeout.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(180);

/// Longest line a server may send, tags included.
const MAX_READ_LINE: usize = 8192;

/// Longest line we send, CRLF included.
const MAX_WRITE_LINE: usize = 512;

/// Longest text chunk carried by one PRIVMSG.
const SPLIT_LEN: usize = 450;

/// Alternative nicks tried when ours is taken during registration.
const MAX_NICK_RETRIES: u32 = 3;

/// Connector producing [`TcpConnection`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connection(&self, identity: Identity, events: EventSink) -> Arc<dyn Connection> {
        Arc::new(TcpConnection::new(identity, events))
    }
}

/// IRC connection over plain TCP.
pub struct TcpConnection {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("identity", &self.shared.identity)
            .field("nick", &*self.shared.nick.read())
            .finish_non_exhaustive()
    }
}

struct Shared {
    identity: Identity,
    events: EventSink,
    nick: RwLock<String>,
    /// Line queue of the live socket; `None` while disconnected.
    writer: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl Shared {
    fn send_raw(&self, line: String) -> TransportResult<()> {
        let writer = self.writer.lock();
        let tx = writer.as_ref().ok_or(TransportError::NotConnected)?;
        trace!(%line, "irc send");
        tx.send(line).map_err(|_| TransportError::NotConnected)
    }

    fn current_nick(&self) -> String {
        self.nick.read().clone()
    }

    async fn emit(&self, event: ConnectionEvent) -> Result<(), String> {
        self.events
            .send(event)
            .await
            .map_err(|_| "event receiver dropped".to_string())
    }
}

impl TcpConnection {
    /// Create an unconnected connection.
    #[must_use]
    pub fn new(identity: Identity, events: EventSink) -> Self {
        Self {
            shared: Arc::new(Shared {
                nick: RwLock::new(identity.nick.clone()),
                identity,
                events,
                writer: Mutex::new(None),
            }),
        }
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn connect(&self, host: &str) -> TransportResult<()> {
        let addr = with_default_port(host);
        debug!(%addr, "dialing irc server");
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(TransportError::Connect)?;
        let (read_half, write_half) = stream.into_split();

        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.nick.write() = self.shared.identity.nick.clone();
        *self.shared.writer.lock() = Some(tx.clone());

        let identity = &self.shared.identity;
        self.shared.send_raw(format!("NICK {}", identity.nick))?;
        self.shared.send_raw(format!(
            "USER {} 0 * :{}",
            identity.user, identity.realname
        ))?;

        tokio::spawn(write_loop(write_half, rx));
        tokio::spawn(read_loop(Arc::clone(&self.shared), read_half, tx));

        info!(%addr, "irc socket open");
        Ok(())
    }

    fn join(&self, channel: &str) -> TransportResult<()> {
        check_param(channel)?;
        self.shared.send_raw(format!("JOIN {channel}"))
    }

    fn privmsg(&self, target: &str, text: &str) -> TransportResult<()> {
        check_param(target)?;
        if text.contains('\0') {
            return Err(TransportError::InvalidParam(text.to_string()));
        }
        let budget = MAX_WRITE_LINE
            .checked_sub("PRIVMSG  :\r\n".len() + target.len())
            .map_or(0, |room| room.min(SPLIT_LEN));
        // Room for at least one character of any width.
        if budget < 4 {
            return Err(TransportError::InvalidParam(target.to_string()));
        }

        // One PRIVMSG per line; a raw newline would end the command.
        for line in text.split('\n').map(|l| l.trim_end_matches('\r')) {
            for chunk in split_text(line, budget) {
                self.shared.send_raw(format!("PRIVMSG {target} :{chunk}"))?;
            }
        }
        Ok(())
    }

    fn kick(&self, channel: &str, nick: &str) -> TransportResult<()> {
        check_param(channel)?;
        check_param(nick)?;
        self.shared.send_raw(format!("KICK {channel} {nick}"))
    }

    fn nick(&self) -> String {
        self.shared.current_nick()
    }
}

/// Reject values that would break a command's framing.
fn check_param(value: &str) -> TransportResult<()> {
    if value.is_empty() || value.contains([' ', '\r', '\n', '\0']) {
        return Err(TransportError::InvalidParam(value.to_string()));
    }
    Ok(())
}

/// Split `text` into chunks of at most `max` bytes on character boundaries.
///
/// `max` must be at least 4.
fn split_text(text: &str, max: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > max {
        let mut at = max;
        while !rest.is_char_boundary(at) {
            at -= 1;
        }
        let (head, tail) = rest.split_at(at);
        chunks.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}

/// Append [`DEFAULT_PORT`] unless `host` already carries a port.
fn with_default_port(host: &str) -> String {
    if host.starts_with('[') {
        return if host.contains("]:") {
            host.to_string()
        } else {
            format!("{host}:{DEFAULT_PORT}")
        };
    }
    match host.matches(':').count() {
        0 => format!("{host}:{DEFAULT_PORT}"),
        1 => host.to_string(),
        // Bare IPv6 address.
        _ => format!("[{host}]:{DEFAULT_PORT}"),
    }
}

async fn write_loop(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        let mut bytes = line.into_bytes();
        bytes.extend_from_slice(b"\r\n");
        if let Err(e) = write_half.write_all(&bytes).await {
            warn!(error = %e, "irc write failed");
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

async fn read_loop(
    shared: Arc<Shared>,
    read_half: OwnedReadHalf,
    own_writer: mpsc::UnboundedSender<String>,
) {
    let reason = read_lines(&shared, read_half).await;

    {
        let mut writer = shared.writer.lock();
        if writer.as_ref().is_some_and(|w| w.same_channel(&own_writer)) {
            *writer = None;
        }
    }
    drop(own_writer);

    info!(%reason, "irc connection closed");
    let _ = shared
        .emit(ConnectionEvent::Disconnected { reason })
        .await;
}

/// Registration progress of one link.
#[derive(Debug, Default)]
struct Registration {
    done: bool,
    nick_retries: u32,
}

/// Process lines until the link ends; returns the reason it ended.
async fn read_lines(shared: &Shared, read_half: OwnedReadHalf) -> String {
    let codec =
        AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\r\n".to_vec(), MAX_READ_LINE);
    let mut frames = FramedRead::new(read_half, codec);
    let mut registration = Registration::default();
    let mut last_activity = Instant::now();
    let mut keepalive =
        tokio::time::interval_at(Instant::now() + KEEPALIVE_INTERVAL, KEEPALIVE_INTERVAL);

    loop {
        tokio::select! {
            frame = frames.next() => {
                let bytes = match frame {
                    Some(Ok(bytes)) => bytes,
                    None => return "connection closed by server".to_string(),
                    Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                        return format!("line longer than {MAX_READ_LINE} bytes");
                    }
                    Some(Err(e)) => return format!("read error: {e}"),
                };
                last_activity = Instant::now();
                let raw = String::from_utf8_lossy(&bytes);
                trace!(line = %raw.trim_end(), "irc recv");
                let Some(line) = Line::parse(&raw) else {
                    continue;
                };
                if let Err(reason) = handle_line(shared, line, &mut registration).await {
                    return reason;
                }
            }
            _ = keepalive.tick() => {
                let idle = last_activity.elapsed();
                if idle >= KEEPALIVE_INTERVAL * 2 {
                    return "ping timeout".to_string();
                }
                if idle >= KEEPALIVE_INTERVAL {
                    let _ = shared.send_raw("PING :keepalive".to_string());
                }
            }
        }
    }
}

async fn handle_line(
    shared: &Shared,
    line: Line,
    registration: &mut Registration,
) -> Result<(), String> {
    let command = line.command.clone();
    match command.as_str() {
        "PING" => {
            let _ = shared.send_raw(format!("PONG :{}", line.text()));
        }
        // RPL_WELCOME
        "001" => {
            if let Some(nick) = line.params.first() {
                *shared.nick.write() = nick.clone();
            }
            registration.done = true;
            info!(nick = %shared.current_nick(), "irc registration complete");
            return shared.emit(ConnectionEvent::Connected).await;
        }
        // ERR_ERRONEUSNICKNAME
        "432" if !registration.done => {
            return Err(format!(
                "nickname {} rejected: {}",
                shared.current_nick(),
                line.text()
            ));
        }
        // ERR_NICKNAMEINUSE
        "433" if !registration.done => {
            if registration.nick_retries >= MAX_NICK_RETRIES {
                return Err(format!(
                    "no free nickname after {MAX_NICK_RETRIES} alternatives"
                ));
            }
            registration.nick_retries += 1;
            let alt = format!("{}_", shared.current_nick());
            warn!(nick = %alt, "nickname in use, trying alternative");
            *shared.nick.write() = alt.clone();
            let _ = shared.send_raw(format!("NICK {alt}"));
        }
        "NICK" => {
            if line.nick().eq_ignore_ascii_case(&shared.current_nick()) {
                let new_nick = line.text().to_string();
                debug!(nick = %new_nick, "own nick changed");
                *shared.nick.write() = new_nick;
            }
        }
        "PRIVMSG" => {
            if let Some((command, _)) = line.ctcp() {
                if command.eq_ignore_ascii_case("VERSION") {
                    let _ = shared.send_raw(format!(
                        "NOTICE {} :\x01VERSION {}\x01",
                        line.nick(),
                        shared.identity.version
                    ));
                }
                return Ok(());
            }
            return shared.emit(ConnectionEvent::Message(line)).await;
        }
        "ERROR" => return Err(format!("server error: {}", line.text())),
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader, Lines};
    use tokio::net::TcpListener;

    const STEP: Duration = Duration::from_secs(5);

    fn identity() -> Identity {
        Identity {
            nick: "skein".to_string(),
            user: "skein".to_string(),
            realname: "Skein".to_string(),
            version: "Skein test".to_string(),
        }
    }

    async fn next_line(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> String {
        tokio::time::timeout(STEP, lines.next_line())
            .await
            .expect("server timed out waiting for a line")
            .unwrap()
            .expect("client closed the connection")
    }

    async fn next_event(events: &mut mpsc::Receiver<ConnectionEvent>) -> ConnectionEvent {
        tokio::time::timeout(STEP, events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event stream closed")
    }

    #[test]
    fn test_default_port() {
        assert_eq!(with_default_port("irc.example.net"), "irc.example.net:6667");
        assert_eq!(with_default_port("irc.example.net:6697"), "irc.example.net:6697");
        assert_eq!(with_default_port("::1"), "[::1]:6667");
        assert_eq!(with_default_port("[::1]:7000"), "[::1]:7000");
        assert_eq!(with_default_port("[::1]"), "[::1]:6667");
    }

    #[test]
    fn test_split_text() {
        assert_eq!(split_text("", 10), Vec::<&str>::new());
        assert_eq!(split_text("short", 10), vec!["short"]);
        assert_eq!(split_text("abcdefghij", 5), vec!["abcde", "fghij"]);

        // Two-byte characters never straddle a chunk.
        let text = "é".repeat(5);
        let chunks = split_text(&text, 5);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_actions_before_connect() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = TcpConnection::new(identity(), tx);
        assert!(matches!(conn.join("#a"), Err(TransportError::NotConnected)));
        assert!(matches!(
            conn.privmsg("#a", "hi"),
            Err(TransportError::NotConnected)
        ));
        assert_eq!(conn.nick(), "skein");
    }

    #[test]
    fn test_invalid_params_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = TcpConnection::new(identity(), tx);
        assert!(matches!(
            conn.join("#a\r\nQUIT"),
            Err(TransportError::InvalidParam(_))
        ));
        assert!(matches!(
            conn.kick("#a", "two words"),
            Err(TransportError::InvalidParam(_))
        ));
        assert!(matches!(
            conn.privmsg("", "hi"),
            Err(TransportError::InvalidParam(_))
        ));
    }

    #[tokio::test]
    async fn test_session_against_fake_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let (events_tx, mut events) = mpsc::channel(16);
        let conn = TcpConnector.connection(identity(), events_tx);
        conn.connect(&addr).await.unwrap();

        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();

        // Registration with a nick collision.
        assert_eq!(next_line(&mut lines).await, "NICK skein");
        assert_eq!(next_line(&mut lines).await, "USER skein 0 * :Skein");
        write
            .write_all(b":srv 433 * skein :Nickname is already in use\r\n")
            .await
            .unwrap();
        assert_eq!(next_line(&mut lines).await, "NICK skein_");
        write.write_all(b":srv 001 skein_ :Welcome\r\n").await.unwrap();
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
        assert_eq!(conn.nick(), "skein_");

        // Keepalive from the server.
        write.write_all(b"PING :srv-token\r\n").await.unwrap();
        assert_eq!(next_line(&mut lines).await, "PONG :srv-token");

        // CTCP VERSION is answered and not reported.
        write
            .write_all(b":ferris!f@h PRIVMSG skein_ :\x01VERSION\x01\r\n")
            .await
            .unwrap();
        assert_eq!(
            next_line(&mut lines).await,
            "NOTICE ferris :\x01VERSION Skein test\x01"
        );

        write
            .write_all(b":ferris!f@h PRIVMSG #rust :hi there\r\n")
            .await
            .unwrap();
        match next_event(&mut events).await {
            ConnectionEvent::Message(line) => {
                assert_eq!(line.nick(), "ferris");
                assert_eq!(line.target(), "#rust");
                assert_eq!(line.text(), "hi there");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // Outbound actions.
        conn.join("#more").unwrap();
        conn.privmsg("#rust", "one\r\n\ntwo").unwrap();
        conn.kick("#rust", "troll").unwrap();
        assert_eq!(next_line(&mut lines).await, "JOIN #more");
        assert_eq!(next_line(&mut lines).await, "PRIVMSG #rust :one");
        assert_eq!(next_line(&mut lines).await, "PRIVMSG #rust :two");
        assert_eq!(next_line(&mut lines).await, "KICK #rust troll");

        // Server-side nick change for us.
        write.write_all(b":skein_!s@h NICK :skein2\r\n").await.unwrap();
        write.write_all(b"PING :sync\r\n").await.unwrap();
        assert_eq!(next_line(&mut lines).await, "PONG :sync");
        assert_eq!(conn.nick(), "skein2");

        // Closing the socket reports a disconnect and stops writes.
        drop(write);
        drop(lines);
        assert!(matches!(
            next_event(&mut events).await,
            ConnectionEvent::Disconnected { .. }
        ));
        assert!(matches!(
            conn.privmsg("#rust", "anyone?"),
            Err(TransportError::NotConnected)
        ));
    }

    async fn accept(
        listener: &TcpListener,
    ) -> (Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf) {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, write) = socket.into_split();
        (BufReader::new(read).lines(), write)
    }

    #[tokio::test]
    async fn test_long_messages_are_split() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (events_tx, _events) = mpsc::channel(16);
        let conn = TcpConnector.connection(identity(), events_tx);
        conn.connect(&addr).await.unwrap();
        let (mut lines, _write) = accept(&listener).await;
        next_line(&mut lines).await;
        next_line(&mut lines).await;

        for text in ["x".repeat(1000), "日本語".repeat(100)] {
            conn.privmsg("#rust", &text).unwrap();
            let mut sent = String::new();
            while sent.len() < text.len() {
                let line = next_line(&mut lines).await;
                assert!(line.len() + 2 <= MAX_WRITE_LINE, "{} bytes", line.len());
                sent.push_str(line.strip_prefix("PRIVMSG #rust :").unwrap());
            }
            assert_eq!(sent, text);
        }

        assert!(matches!(
            conn.privmsg(&format!("#{}", "a".repeat(500)), "hi"),
            Err(TransportError::InvalidParam(_))
        ));
    }

    #[tokio::test]
    async fn test_overlong_server_line_ends_link() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (events_tx, mut events) = mpsc::channel(16);
        let conn = TcpConnector.connection(identity(), events_tx);
        conn.connect(&addr).await.unwrap();
        let (_lines, mut write) = accept(&listener).await;

        write
            .write_all(&vec![b'a'; MAX_READ_LINE * 2])
            .await
            .unwrap();
        match next_event(&mut events).await {
            ConnectionEvent::Disconnected { reason } => {
                assert!(reason.contains("longer than"), "{reason}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_nick_retries_are_bounded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (events_tx, mut events) = mpsc::channel(16);
        let conn = TcpConnector.connection(identity(), events_tx);
        conn.connect(&addr).await.unwrap();
        let (mut lines, mut write) = accept(&listener).await;
        assert_eq!(next_line(&mut lines).await, "NICK skein");
        next_line(&mut lines).await;

        let mut nick = "skein".to_string();
        for _ in 0..MAX_NICK_RETRIES {
            write
                .write_all(format!(":srv 433 * {nick} :in use\r\n").as_bytes())
                .await
                .unwrap();
            nick.push('_');
            assert_eq!(next_line(&mut lines).await, format!("NICK {nick}"));
        }
        write
            .write_all(format!(":srv 433 * {nick} :in use\r\n").as_bytes())
            .await
            .unwrap();
        match next_event(&mut events).await {
            ConnectionEvent::Disconnected { reason } => {
                assert!(reason.contains("no free nickname"), "{reason}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_erroneous_nick_ends_registration() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (events_tx, mut events) = mpsc::channel(16);
        let conn = TcpConnector.connection(identity(), events_tx);
        conn.connect(&addr).await.unwrap();
        let (mut lines, mut write) = accept(&listener).await;
        next_line(&mut lines).await;
        next_line(&mut lines).await;

        write
            .write_all(b":srv 432 * skein :Erroneous nickname\r\n")
            .await
            .unwrap();
        match next_event(&mut events).await {
            ConnectionEvent::Disconnected { reason } => {
                assert!(reason.contains("rejected"), "{reason}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let (tx, _rx) = mpsc::channel(1);
        let conn = TcpConnection::new(identity(), tx);
        assert!(matches!(
            conn.connect(&addr).await,
            Err(TransportError::Connect(_))
        ));
    }
}
