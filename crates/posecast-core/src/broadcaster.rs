//! Fan-out of one message to every registered session.

use crate::message::Message;
use crate::registry::ClientRegistry;
use crate::session::{SendError, SessionId};
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{trace, warn};

/// Outcome of one fan-out pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions the message was addressed to.
    pub recipients: usize,
    /// Sessions that accepted the message.
    pub delivered: usize,
    /// Sessions this pass removed from the registry after a failed send.
    /// A session that had already unregistered itself is not listed.
    pub failed: Vec<SessionId>,
}

impl BroadcastReport {
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.failed.len()
    }
}

/// Delivers messages to the sessions of a [`ClientRegistry`].
///
/// Sends within a pass run concurrently, so a slow session delays only
/// itself. A session whose send fails is unregistered; the rest of the pass
/// is unaffected and nothing is retried.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<ClientRegistry>,
}

impl Broadcaster {
    #[must_use]
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Send a message to every registered session.
    pub async fn broadcast(&self, message: &Message) -> BroadcastReport {
        self.fan_out(message, None).await
    }

    /// Send a message to every registered session except `exclude`.
    pub async fn broadcast_except(&self, message: &Message, exclude: SessionId) -> BroadcastReport {
        self.fan_out(message, Some(exclude)).await
    }

    async fn fan_out(&self, message: &Message, exclude: Option<SessionId>) -> BroadcastReport {
        let targets: Vec<_> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|session| Some(session.id()) != exclude)
            .collect();

        let sends = targets.iter().map(|session| {
            let message = message.clone();
            async move { (session.id(), session.send(message).await) }
        });
        let results = join_all(sends).await;

        let mut report = BroadcastReport {
            recipients: targets.len(),
            ..BroadcastReport::default()
        };
        for (id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    if self.drop_session(id, &error) {
                        report.failed.push(id);
                    }
                }
            }
        }

        trace!(
            recipients = report.recipients,
            delivered = report.delivered,
            dropped = report.dropped(),
            "Broadcast complete"
        );
        report
    }

    /// Returns false if the session was already gone.
    fn drop_session(&self, id: SessionId, error: &SendError) -> bool {
        let Some(session) = self.registry.unregister(id) else {
            return false;
        };
        session.mark_dead();
        warn!(session = %id, error = %error, "Dropping session after failed send");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ChannelSink, ClientSession, SessionSink};
    use async_trait::async_trait;
    use std::sync::OnceLock;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct BrokenSink;

    #[async_trait]
    impl SessionSink for BrokenSink {
        async fn send(&self, _message: Message) -> Result<(), SendError> {
            Err(SendError::Transport("connection reset".into()))
        }
    }

    /// Unregisters its own session mid-send, like a client that closed cleanly.
    struct HungUpSink {
        registry: Arc<ClientRegistry>,
        id: Arc<OnceLock<SessionId>>,
    }

    #[async_trait]
    impl SessionSink for HungUpSink {
        async fn send(&self, _message: Message) -> Result<(), SendError> {
            if let Some(id) = self.id.get() {
                self.registry.unregister(*id);
            }
            Err(SendError::Closed)
        }
    }

    fn add_session(registry: &ClientRegistry) -> (SessionId, mpsc::Receiver<Message>) {
        let (sink, rx) = ChannelSink::new(8, Duration::from_millis(100));
        let session = Arc::new(ClientSession::new(sink));
        let id = session.id();
        registry.register(session);
        (id, rx)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_sessions() {
        let registry = Arc::new(ClientRegistry::new());
        let mut receivers: Vec<_> = (0..3).map(|_| add_session(&registry).1).collect();
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        let report = broadcaster.broadcast(&Message::text("tick")).await;
        assert_eq!(report.recipients, 3);
        assert_eq!(report.delivered, 3);
        assert!(report.failed.is_empty());

        for rx in &mut receivers {
            assert_eq!(rx.try_recv().unwrap().payload.as_text(), Some("tick"));
        }
    }

    #[tokio::test]
    async fn test_failing_session_is_isolated() {
        let registry = Arc::new(ClientRegistry::new());
        let (id1, mut rx1) = add_session(&registry);
        let (id2, mut rx2) = add_session(&registry);
        let broken = Arc::new(ClientSession::new(BrokenSink));
        let id3 = broken.id();
        registry.register(broken);
        let (id4, mut rx4) = add_session(&registry);
        let (id5, mut rx5) = add_session(&registry);

        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let report = broadcaster.broadcast(&Message::text("pose")).await;

        assert_eq!(report.recipients, 5);
        assert_eq!(report.delivered, 4);
        assert_eq!(report.failed, vec![id3]);

        for rx in [&mut rx1, &mut rx2, &mut rx4, &mut rx5] {
            assert_eq!(rx.try_recv().unwrap().payload.as_text(), Some("pose"));
        }
        let remaining: Vec<_> = registry.snapshot().iter().map(|s| s.id()).collect();
        assert_eq!(remaining, vec![id1, id2, id4, id5]);

        // The next pass no longer sees the dropped session.
        let report = broadcaster.broadcast(&Message::text("pose")).await;
        assert_eq!(report.recipients, 4);
        assert_eq!(report.delivered, 4);
    }

    #[tokio::test]
    async fn test_already_unregistered_session_not_counted_as_dropped() {
        let registry = Arc::new(ClientRegistry::new());
        let (_, mut rx) = add_session(&registry);
        let id = Arc::new(OnceLock::new());
        let closing = Arc::new(ClientSession::new(HungUpSink {
            registry: Arc::clone(&registry),
            id: Arc::clone(&id),
        }));
        id.set(closing.id()).unwrap();
        registry.register(closing);

        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let report = broadcaster.broadcast(&Message::text("pose")).await;

        assert_eq!(report.recipients, 2);
        assert_eq!(report.delivered, 1);
        assert!(report.failed.is_empty());
        assert_eq!(report.dropped(), 0);
        assert_eq!(registry.len(), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_session_times_out_without_blocking_others() {
        let registry = Arc::new(ClientRegistry::new());
        let (sink, _stalled_rx) = ChannelSink::new(1, Duration::from_millis(50));
        let stalled = Arc::new(ClientSession::new(sink));
        let stalled_id = stalled.id();
        registry.register(stalled);
        let (_, mut rx) = add_session(&registry);

        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let first = broadcaster.broadcast(&Message::text("1")).await;
        assert_eq!(first.delivered, 2);

        // The stalled queue is full now; its send times out.
        let second = broadcaster.broadcast(&Message::text("2")).await;
        assert_eq!(second.delivered, 1);
        assert_eq!(second.failed, vec![stalled_id]);

        assert_eq!(rx.try_recv().unwrap().payload.as_text(), Some("1"));
        assert_eq!(rx.try_recv().unwrap().payload.as_text(), Some("2"));
        assert!(!registry.contains(stalled_id));
    }

    #[tokio::test]
    async fn test_broadcast_except_skips_sender() {
        let registry = Arc::new(ClientRegistry::new());
        let (sender, mut sender_rx) = add_session(&registry);
        let (_, mut other_rx) = add_session(&registry);

        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let report = broadcaster
            .broadcast_except(&Message::text("hi"), sender)
            .await;

        assert_eq!(report.recipients, 1);
        assert!(other_rx.try_recv().is_ok());
        assert!(sender_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_registry() {
        let broadcaster = Broadcaster::new(Arc::new(ClientRegistry::new()));
        let report = broadcaster.broadcast(&Message::text("nobody")).await;
        assert_eq!(report, BroadcastReport::default());
    }
}
