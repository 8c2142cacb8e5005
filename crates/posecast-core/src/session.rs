//! Client sessions.
//!
//! A session is one live client connection. The registry owns sessions; the
//! transport layer feeds each session's outbound queue into its socket.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::message::Message;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique session identifier. Ids increase with registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate the next session id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Errors when delivering a message to a session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The session's connection is gone.
    #[error("Session closed")]
    Closed,

    /// The session did not accept the message in time.
    #[error("Send timed out after {0:?}")]
    Timeout(Duration),

    /// The transport reported a failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Outbound side of a session.
#[async_trait]
pub trait SessionSink: Send + Sync {
    /// Deliver one message.
    async fn send(&self, message: Message) -> Result<(), SendError>;

    /// Whether the sink can no longer deliver.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Sink backed by a bounded queue drained by a connection writer task.
///
/// A send waits at most `timeout` for queue space, so a stalled client only
/// holds up its own delivery.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Message>,
    timeout: Duration,
}

impl ChannelSink {
    /// Create a sink and the receiver its writer task drains.
    #[must_use]
    pub fn new(capacity: usize, timeout: Duration) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, timeout }, rx)
    }
}

#[async_trait]
impl SessionSink for ChannelSink {
    async fn send(&self, message: Message) -> Result<(), SendError> {
        match tokio::time::timeout(self.timeout, self.tx.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SendError::Closed),
            Err(_) => Err(SendError::Timeout(self.timeout)),
        }
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One connected client.
pub struct ClientSession {
    id: SessionId,
    sink: Box<dyn SessionSink>,
    alive: AtomicBool,
    connected_at: Instant,
    remote_addr: Option<String>,
}

impl ClientSession {
    /// Create a session with a fresh id.
    #[must_use]
    pub fn new(sink: impl SessionSink + 'static) -> Self {
        Self {
            id: SessionId::next(),
            sink: Box::new(sink),
            alive: AtomicBool::new(true),
            connected_at: Instant::now(),
            remote_addr: None,
        }
    }

    /// Record the peer address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    /// Deliver a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the session was marked dead or the sink fails.
    pub async fn send(&self, message: Message) -> Result<(), SendError> {
        if !self.is_alive() {
            return Err(SendError::Closed);
        }
        self.sink.send(message).await
    }

    /// Whether the session is still considered deliverable.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire) && !self.sink.is_closed()
    }

    /// Mark the session dead. Returns `true` if it was alive.
    pub fn mark_dead(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// Time since the session connected.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}
