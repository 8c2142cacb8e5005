//! Messages exchanged with client sessions.
//!
//! Payloads are reference counted so one encoded tick is shared by every
//! recipient of a fan-out without copying.

use bytes::Bytes;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::session::SessionId;

/// Seconds since the Unix epoch, as used in the JSON `time` field.
#[must_use]
pub fn unix_time_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 text frame.
    Text(Arc<str>),
    /// Binary frame.
    Binary(Bytes),
}

impl Payload {
    /// Size of the payload in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(data) => data.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The payload as text, if it is a text frame.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text.into())
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.into())
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Payload::Binary(data)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::Binary(data.into())
    }
}

/// A message routed to client sessions.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message body.
    pub payload: Payload,
    /// Session that sent the message, for relayed messages.
    pub source: Option<SessionId>,
}

impl Message {
    /// Create a new message.
    #[must_use]
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self {
            payload: payload.into(),
            source: None,
        }
    }

    /// Create a text message.
    #[must_use]
    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Self::new(Payload::Text(text.into()))
    }

    /// Attach the originating session.
    #[must_use]
    pub fn with_source(mut self, source: SessionId) -> Self {
        self.source = Some(source);
        self
    }

    /// Get the payload size in bytes.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}
