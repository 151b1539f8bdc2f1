//! Broadcast of discrete sync notifications.

use crate::connection::ConnectionStatus;
use crate::endpoint::SubscriptionKey;
use log::debug;
use tokio::sync::broadcast;

/// Notification raised by a subscription. State itself is published through
/// the subscription's snapshot watch; events carry what a listener would
/// otherwise miss between snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    StatusChanged {
        key: SubscriptionKey,
        status: ConnectionStatus,
    },
    /// The transport failed.
    TransportError {
        key: SubscriptionKey,
        message: String,
    },
    /// The server sent an `error` frame.
    ServerError {
        key: SubscriptionKey,
        message: String,
    },
    /// A feature changed server-side; feature listings should be refetched.
    FeatureUpdated {
        key: SubscriptionKey,
        feature_id: Option<i64>,
        passes: Option<bool>,
    },
}

impl SyncEvent {
    pub fn key(&self) -> &SubscriptionKey {
        match self {
            SyncEvent::StatusChanged { key, .. }
            | SyncEvent::TransportError { key, .. }
            | SyncEvent::ServerError { key, .. }
            | SyncEvent::FeatureUpdated { key, .. } => key,
        }
    }
}

/// Receiver side of sync notifications.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SyncEvent);
}

/// Broadcast-backed event bus shared by every subscription of a client.
#[derive(Clone, Debug)]
pub struct SyncEventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl SyncEventBus {
    /// Create a new event bus with the given channel buffer size.
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        debug!("sync event bus initialized (buffer={})", buffer);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for SyncEventBus {
    /// Publish an event; dropped silently when nobody listens.
    fn emit(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Channel;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = SyncEventBus::new(8);
        let mut receiver = bus.subscribe();
        let key = SubscriptionKey::new(Channel::Project, "shop");

        bus.emit(SyncEvent::StatusChanged {
            key: key.clone(),
            status: ConnectionStatus::Connecting,
        });
        bus.emit(SyncEvent::ServerError {
            key: key.clone(),
            message: "boom".to_string(),
        });

        let first = receiver.recv().await.expect("first");
        assert_eq!(first.key(), &key);
        assert!(matches!(
            receiver.recv().await.expect("second"),
            SyncEvent::ServerError { .. }
        ));
    }

    #[test]
    fn emit_without_subscribers_is_harmless() {
        let bus = SyncEventBus::new(1);
        bus.emit(SyncEvent::FeatureUpdated {
            key: SubscriptionKey::new(Channel::Project, "shop"),
            feature_id: Some(3),
            passes: Some(true),
        });
    }
}
