//! Client-to-client relay.
//!
//! Inbound messages are forwarded verbatim to every other session. There is
//! no tick in relay mode; delivery is driven by inbound traffic alone.

use crate::broadcaster::{BroadcastReport, Broadcaster};
use crate::message::{Message, Payload};
use crate::session::SessionId;
use thiserror::Error;
use tracing::{debug, warn};

/// Relay errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The message was dropped. The sender stays connected.
    #[error("Malformed client message: {0}")]
    Malformed(&'static str),
}

/// Forwards client messages to all other clients.
#[derive(Debug, Clone)]
pub struct Relay {
    broadcaster: Broadcaster,
    max_message_size: usize,
}

impl Relay {
    #[must_use]
    pub fn new(broadcaster: Broadcaster, max_message_size: usize) -> Self {
        Self {
            broadcaster,
            max_message_size,
        }
    }

    /// Check that a payload may be relayed.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Malformed`] for empty or oversized payloads.
    pub fn validate(&self, payload: &Payload) -> Result<(), RelayError> {
        if payload.is_empty() {
            return Err(RelayError::Malformed("empty message"));
        }
        if payload.len() > self.max_message_size {
            return Err(RelayError::Malformed("message too large"));
        }
        Ok(())
    }

    /// Forward `payload` from `from` to every other registered session.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Malformed`] if the payload is rejected; nothing
    /// is sent in that case.
    pub async fn forward(&self, from: SessionId, payload: Payload) -> Result<BroadcastReport, RelayError> {
        if let Err(e) = self.validate(&payload) {
            warn!(session = %from, size = payload.len(), error = %e, "Dropping client message");
            return Err(e);
        }

        let message = Message::new(payload).with_source(from);
        let report = self.broadcaster.broadcast_except(&message, from).await;
        debug!(
            session = %from,
            recipients = report.recipients,
            delivered = report.delivered,
            "Relayed message"
        );
        Ok(report)
    }
}
