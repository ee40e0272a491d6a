//! A single server connection.
//!
//! [`Connection`] owns the socket tasks, the local identity, and the
//! `Disconnected → Connecting → Connected → Disconnected` lifecycle. Inbound
//! lines and lifecycle changes are reported as [`ConnectionEvent`]s on a
//! channel supplied by the owner; nothing here blocks the caller.

use crate::irc::codec::IrcLineCodec;
use crate::irc::message::{is_middle_param, Message, Outbound};
use crate::session::SessionId;
use futures::{SinkExt, StreamExt};
use std::fmt;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

pub const DEFAULT_PORT: u16 = 6667;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("no host given")]
    EmptyHost,
    #[error("invalid port {0:?}")]
    InvalidPort(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("not connected")]
    NotConnected,
    #[error("connection failure: {0}")]
    Failure(String),
}

/// `host[:port]` of an IRC server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        Self::parse_with_default(input, DEFAULT_PORT)
    }

    /// Parse `host` or `host:port`, using `default_port` when none is given.
    /// IPv6 literals need brackets when a port is present (`[::1]:6667`).
    pub fn parse_with_default(input: &str, default_port: u16) -> Result<Self, AddressError> {
        let input = input.trim();
        let (host, port) = if let Some(bracketed) = input.strip_prefix('[') {
            match bracketed.split_once(']') {
                Some((host, rest)) => (host, rest.strip_prefix(':')),
                None => (input, None),
            }
        } else {
            match input.rsplit_once(':') {
                Some((host, port)) if !host.contains(':') => (host, Some(port)),
                _ => (input, None),
            }
        };

        if host.is_empty() {
            return Err(AddressError::EmptyHost);
        }
        let port = match port {
            Some(p) => match p.parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => return Err(AddressError::InvalidPort(p.to_string())),
            },
            None => default_port,
        };
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Canonical identity of the server: lowercase host plus port.
    pub fn key(&self) -> String {
        format!("{}:{}", self.host.to_ascii_lowercase(), self.port)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Who we claim to be during registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub nickname: String,
    pub username: String,
    pub realname: String,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} {value:?} must be a single word not starting with ':'")]
pub struct IdentityError {
    pub field: &'static str,
    pub value: String,
}

impl Identity {
    /// Check that the registration words can go on the wire as middle
    /// parameters. The real name is sent as trailing text and is not checked.
    pub fn validate(&self) -> Result<(), IdentityError> {
        let words = [
            ("nickname", &self.nickname),
            ("username", &self.username),
            ("mode", &self.mode),
        ];
        match words.into_iter().find(|(_, value)| !is_middle_param(value)) {
            Some((field, value)) => Err(IdentityError {
                field,
                value: value.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Reports from the dial, read, and write tasks of a connection.
///
/// `generation` identifies the socket the event belongs to; events whose
/// generation no longer matches [`Connection::generation`] are stale.
#[derive(Debug)]
pub enum ConnectionEvent {
    Established {
        session: SessionId,
        generation: u64,
        stream: TcpStream,
    },
    Failed {
        session: SessionId,
        generation: u64,
        error: String,
    },
    Received {
        session: SessionId,
        generation: u64,
        message: Message,
    },
    Closed {
        session: SessionId,
        generation: u64,
        reason: String,
    },
}

impl ConnectionEvent {
    pub fn session(&self) -> SessionId {
        match self {
            ConnectionEvent::Established { session, .. }
            | ConnectionEvent::Failed { session, .. }
            | ConnectionEvent::Received { session, .. }
            | ConnectionEvent::Closed { session, .. } => *session,
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            ConnectionEvent::Established { generation, .. }
            | ConnectionEvent::Failed { generation, .. }
            | ConnectionEvent::Received { generation, .. }
            | ConnectionEvent::Closed { generation, .. } => *generation,
        }
    }
}

pub struct Connection {
    session: SessionId,
    address: ServerAddress,
    identity: Identity,
    status: ConnectionStatus,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    cancel: Option<CancellationToken>,
}

impl Connection {
    pub fn new(session: SessionId, address: ServerAddress, identity: Identity) -> Self {
        Self {
            session,
            address,
            identity,
            status: ConnectionStatus::Disconnected,
            generation: 0,
            outbound: None,
            cancel: None,
        }
    }

    /// Extract the server address from `/server host[:port]`,
    /// `/connect host[:port]`, or a bare `host[:port]`.
    pub fn parse(input: &str) -> Result<ServerAddress, AddressError> {
        let input = input.trim();
        let rest = match input.split_once(' ') {
            Some((verb, rest)) if is_connect_verb(verb) => rest,
            None if is_connect_verb(input) => "",
            _ => input,
        };
        ServerAddress::parse(rest)
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn nickname(&self) -> &str {
        &self.identity.nickname
    }

    pub fn set_nickname(&mut self, nickname: &str) {
        self.identity.nickname = nickname.to_string();
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn key(&self) -> String {
        self.address.key()
    }

    /// Start dialling the server. The outcome arrives on `events` as
    /// [`ConnectionEvent::Established`] or [`ConnectionEvent::Failed`].
    /// Does nothing unless the connection is disconnected.
    pub fn begin_connect(&mut self, events: mpsc::UnboundedSender<ConnectionEvent>) {
        if self.status != ConnectionStatus::Disconnected {
            return;
        }
        self.generation += 1;
        self.status = ConnectionStatus::Connecting;

        let session = self.session;
        let generation = self.generation;
        let host = self.address.host.clone();
        let port = self.address.port;
        info!(session, %host, port, "connecting");

        tokio::spawn(async move {
            let event = match TcpStream::connect((host.as_str(), port)).await {
                Ok(stream) => ConnectionEvent::Established {
                    session,
                    generation,
                    stream,
                },
                Err(e) => ConnectionEvent::Failed {
                    session,
                    generation,
                    error: e.to_string(),
                },
            };
            let _ = events.send(event);
        });
    }

    /// Take over an established stream: start the read and write tasks,
    /// enter `Connected`, and queue the registration handshake.
    pub fn attach<S>(&mut self, stream: S, events: mpsc::UnboundedSender<ConnectionEvent>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let outbound = self.attach_queue();
        let (reader, writer) = tokio::io::split(stream);
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        tokio::spawn(read_loop(
            reader,
            self.session,
            self.generation,
            cancel,
            events.clone(),
        ));
        tokio::spawn(write_loop(
            writer,
            outbound,
            self.session,
            self.generation,
            events,
        ));
        info!(session = self.session, address = %self.address, "connected");
    }

    /// Enter `Connected` with the outbound queue handed back to the caller
    /// rather than drained into a socket.
    pub(crate) fn attach_queue(&mut self) -> mpsc::UnboundedReceiver<Message> {
        self.shutdown_tasks();
        if self.status == ConnectionStatus::Disconnected {
            self.generation += 1;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);
        self.status = ConnectionStatus::Connected;

        let handshake = [
            Outbound::Nick {
                nickname: self.identity.nickname.clone(),
            },
            Outbound::User {
                username: self.identity.username.clone(),
                mode: self.identity.mode.clone(),
                realname: self.identity.realname.clone(),
            },
        ];
        for outbound in handshake {
            // The queue was created above, so this cannot fail.
            let _ = self.enqueue(outbound.into());
        }
        rx
    }

    /// Queue a message for the writer task.
    pub fn enqueue(&self, message: Message) -> Result<(), ConnectionError> {
        if self.status != ConnectionStatus::Connected {
            return Err(ConnectionError::NotConnected);
        }
        let tx = self.outbound.as_ref().ok_or(ConnectionError::NotConnected)?;
        tx.send(message)
            .map_err(|_| ConnectionError::Failure("writer has stopped".to_string()))
    }

    /// Close the connection. Already-queued messages are still flushed before
    /// the socket is shut down. Closing a closed connection is a no-op.
    pub fn close(&mut self) {
        if self.status == ConnectionStatus::Disconnected {
            return;
        }
        self.shutdown_tasks();
        self.status = ConnectionStatus::Disconnected;
        // Anything still in flight from the old socket is now stale.
        self.generation += 1;
        info!(session = self.session, address = %self.address, "disconnected");
    }

    fn shutdown_tasks(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        // Dropping the sender lets the writer drain and shut down.
        self.outbound = None;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown_tasks();
    }
}

fn is_connect_verb(word: &str) -> bool {
    word.eq_ignore_ascii_case("/server") || word.eq_ignore_ascii_case("/connect")
}

async fn read_loop<R>(
    reader: R,
    session: SessionId,
    generation: u64,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, IrcLineCodec::new());

    let reason = loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = frames.next() => frame,
        };
        match frame {
            Some(Ok(message)) => {
                trace!(session, %message, "received");
                let event = ConnectionEvent::Received {
                    session,
                    generation,
                    message,
                };
                if events.send(event).is_err() {
                    return;
                }
            }
            Some(Err(e)) => {
                warn!(session, error = %e, "read failed");
                break e.to_string();
            }
            None => break "connection closed by remote host".to_string(),
        }
    };

    let _ = events.send(ConnectionEvent::Closed {
        session,
        generation,
        reason,
    });
}

async fn write_loop<W>(
    writer: W,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    session: SessionId,
    generation: u64,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, IrcLineCodec::new());
    while let Some(message) = outbound.recv().await {
        trace!(session, %message, "sending");
        if let Err(e) = sink.send(message).await {
            warn!(session, error = %e, "write failed");
            let _ = events.send(ConnectionEvent::Closed {
                session,
                generation,
                reason: format!("write failed: {}", e),
            });
            return;
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irc::codec::MAX_LINE_LENGTH;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

    fn identity() -> Identity {
        Identity {
            nickname: "crab".into(),
            username: "crabuser".into(),
            realname: "Crab Chat".into(),
            mode: "0".into(),
        }
    }

    #[test]
    fn test_parse_address_forms() {
        let addr = Connection::parse("/server irc.example.com").unwrap();
        assert_eq!(addr.host, "irc.example.com");
        assert_eq!(addr.port, 6667);

        let addr = Connection::parse("/connect irc.example.com:6697").unwrap();
        assert_eq!(addr.port, 6697);

        let addr = Connection::parse("irc.libera.chat").unwrap();
        assert_eq!(addr.port, DEFAULT_PORT);

        let addr = ServerAddress::parse("[::1]:7000").unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.port, 7000);
        assert_eq!(addr.to_string(), "[::1]:7000");
    }

    #[test]
    fn test_parse_address_errors() {
        assert_eq!(Connection::parse("/server"), Err(AddressError::EmptyHost));
        assert_eq!(ServerAddress::parse(""), Err(AddressError::EmptyHost));
        assert_eq!(ServerAddress::parse(":6667"), Err(AddressError::EmptyHost));
        assert_eq!(
            ServerAddress::parse("irc.example.com:abc"),
            Err(AddressError::InvalidPort("abc".into()))
        );
        assert_eq!(
            ServerAddress::parse("irc.example.com:0"),
            Err(AddressError::InvalidPort("0".into()))
        );
    }

    #[test]
    fn test_key_is_case_insensitive() {
        let a = ServerAddress::parse("IRC.Example.com").unwrap();
        let b = ServerAddress::parse("irc.example.COM:6667").unwrap();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key(), "irc.example.com:6667");
    }

    #[test]
    fn test_identity_validation() {
        assert_eq!(identity().validate(), Ok(()));

        let mut empty_user = identity();
        empty_user.username.clear();
        assert_eq!(
            empty_user.validate(),
            Err(IdentityError { field: "username", value: String::new() })
        );

        let mut colon_nick = identity();
        colon_nick.nickname = ":crab".into();
        assert_eq!(colon_nick.validate().unwrap_err().field, "nickname");

        let mut spaced_realname = identity();
        spaced_realname.realname = ":Crab Chat".into();
        assert_eq!(spaced_realname.validate(), Ok(()));
    }

    #[test]
    fn test_enqueue_requires_connected() {
        let conn = Connection::new(0, ServerAddress::parse("localhost").unwrap(), identity());
        assert!(!conn.is_connected());
        assert_eq!(
            conn.enqueue(Outbound::List.into()),
            Err(ConnectionError::NotConnected)
        );
    }

    #[test]
    fn test_attach_queue_sends_handshake() {
        let mut conn = Connection::new(0, ServerAddress::parse("localhost").unwrap(), identity());
        let mut rx = conn.attach_queue();
        assert!(conn.is_connected());
        assert_eq!(rx.try_recv().unwrap().to_string(), "NICK crab");
        assert_eq!(rx.try_recv().unwrap().to_string(), "USER crabuser 0 * :Crab Chat");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut conn = Connection::new(0, ServerAddress::parse("localhost").unwrap(), identity());
        conn.close();
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);

        let _rx = conn.attach_queue();
        let generation = conn.generation();
        conn.close();
        conn.close();
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);
        assert_eq!(conn.generation(), generation + 1);
        assert_eq!(
            conn.enqueue(Outbound::List.into()),
            Err(ConnectionError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_read_loop_reassembles_partial_lines() {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, mut server_write) = tokio::io::split(server);
        let mut server_lines = tokio::io::BufReader::new(server_read).lines();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut conn = Connection::new(7, ServerAddress::parse("localhost").unwrap(), identity());
        conn.attach(client, tx);
        assert_eq!(server_lines.next_line().await.unwrap().as_deref(), Some("NICK crab"));
        assert_eq!(
            server_lines.next_line().await.unwrap().as_deref(),
            Some("USER crabuser 0 * :Crab Chat")
        );

        for chunk in [":srv PI", "NG :tok\r\n:a!b@c JO", "IN #c\r\n\r\n", "!!bad\r\n:x 001 crab :hi\r\n"] {
            server_write.write_all(chunk.as_bytes()).await.unwrap();
            server_write.flush().await.unwrap();
        }

        let mut commands = Vec::new();
        for _ in 0..3 {
            match rx.recv().await.unwrap() {
                ConnectionEvent::Received {
                    session, message, ..
                } => {
                    assert_eq!(session, 7);
                    commands.push(message.command);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(commands, vec!["PING", "JOIN", "001"]);

        conn.enqueue(Outbound::Pong { token: "tok".into() }.into()).unwrap();
        assert_eq!(server_lines.next_line().await.unwrap().as_deref(), Some("PONG :tok"));

        drop(server_write);
        drop(server_lines);
        match rx.recv().await.unwrap() {
            ConnectionEvent::Closed { generation, .. } => assert_eq!(generation, conn.generation()),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_flushes_queue_and_stops_reader() {
        let (client, server) = tokio::io::duplex(4096);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut conn = Connection::new(1, ServerAddress::parse("localhost").unwrap(), identity());
        conn.attach(client, tx);
        conn.enqueue(Outbound::Quit { reason: Some("bye".into()) }.into())
            .unwrap();
        conn.close();
        conn.close();

        let mut server_lines = tokio::io::BufReader::new(server).lines();
        let mut received = Vec::new();
        while let Some(line) = server_lines.next_line().await.unwrap() {
            received.push(line);
        }
        assert_eq!(received.last().map(String::as_str), Some("QUIT :bye"));
        // The reader was cancelled, so no Closed event is reported.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_oversized_line_closes_connection() {
        let (client, server) = tokio::io::duplex(4096);
        let (_server_read, mut server_write) = tokio::io::split(server);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut conn = Connection::new(2, ServerAddress::parse("localhost").unwrap(), identity());
        conn.attach(client, tx);

        tokio::spawn(async move {
            let mut line = b":s PRIVMSG #a :".to_vec();
            line.extend(std::iter::repeat(b'x').take(MAX_LINE_LENGTH * 2));
            line.extend_from_slice(b"\r\n");
            let _ = server_write.write_all(&line).await;
        });

        match rx.recv().await.unwrap() {
            ConnectionEvent::Closed { session, reason, .. } => {
                assert_eq!(session, 2);
                assert!(reason.contains("exceeds"), "{}", reason);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
