use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{MessageId, NotificationKind, QueueStatus, Role, Timestamp};

/// Default capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything the delivery core tells the presentation layer about.
///
/// Events are published after the state change they describe has been
/// applied, so a subscriber reading state in response sees the new value.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ClientEvent {
    // =========================================================================
    // Conversation Events
    // =========================================================================
    /// A message was inserted into a conversation.
    MessageAdded {
        agent_id: String,
        message_id: MessageId,
        role: Role,
        timestamp: Timestamp,
    },

    /// A message was edited, reacted to, or changed delivery status.
    MessageUpdated {
        agent_id: String,
        message_id: MessageId,
        timestamp: Timestamp,
    },

    /// A message was deleted by the user.
    MessageDeleted {
        agent_id: String,
        message_id: MessageId,
        timestamp: Timestamp,
    },

    /// All messages of a conversation were removed.
    ConversationCleared {
        agent_id: String,
        removed: usize,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Queue Events
    // =========================================================================
    /// A queue item moved to a new status.
    QueueStatusChanged {
        queue_id: String,
        message_id: Option<MessageId>,
        status: QueueStatus,
        timestamp: Timestamp,
    },

    /// A processing pass finished.
    QueueProcessed {
        succeeded: usize,
        failed: usize,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Notification Events
    // =========================================================================
    NotificationShown {
        id: u64,
        kind: NotificationKind,
        message: String,
        timestamp: Timestamp,
    },

    NotificationDismissed { id: u64, timestamp: Timestamp },

    // =========================================================================
    // Environment Events
    // =========================================================================
    ConnectivityChanged { online: bool, timestamp: Timestamp },

    /// Speech output was disabled or restored.
    TextOnlyModeChanged { enabled: bool, timestamp: Timestamp },
}

impl ClientEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            ClientEvent::MessageAdded { timestamp, .. }
            | ClientEvent::MessageUpdated { timestamp, .. }
            | ClientEvent::MessageDeleted { timestamp, .. }
            | ClientEvent::ConversationCleared { timestamp, .. }
            | ClientEvent::QueueStatusChanged { timestamp, .. }
            | ClientEvent::QueueProcessed { timestamp, .. }
            | ClientEvent::NotificationShown { timestamp, .. }
            | ClientEvent::NotificationDismissed { timestamp, .. }
            | ClientEvent::ConnectivityChanged { timestamp, .. }
            | ClientEvent::TextOnlyModeChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a human-readable event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientEvent::MessageAdded { .. } => "message_added",
            ClientEvent::MessageUpdated { .. } => "message_updated",
            ClientEvent::MessageDeleted { .. } => "message_deleted",
            ClientEvent::ConversationCleared { .. } => "conversation_cleared",
            ClientEvent::QueueStatusChanged { .. } => "queue_status_changed",
            ClientEvent::QueueProcessed { .. } => "queue_processed",
            ClientEvent::NotificationShown { .. } => "notification_shown",
            ClientEvent::NotificationDismissed { .. } => "notification_dismissed",
            ClientEvent::ConnectivityChanged { .. } => "connectivity_changed",
            ClientEvent::TextOnlyModeChanged { .. } => "text_only_mode_changed",
        }
    }
}

/// Cloneable handle to the shared event broadcast channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ClientEvent) {
        tracing::trace!(event = event.event_name(), "Client event published");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_timestamp() {
        let ts = Timestamp::now();
        let event = ClientEvent::ConnectivityChanged {
            online: true,
            timestamp: ts,
        };
        assert_eq!(event.timestamp(), ts);
    }

    #[test]
    fn test_event_name() {
        let event = ClientEvent::QueueProcessed {
            succeeded: 2,
            failed: 1,
            timestamp: Timestamp::now(),
        };
        assert_eq!(event.event_name(), "queue_processed");
    }

    #[test]
    fn test_event_serialization() {
        let event = ClientEvent::QueueStatusChanged {
            queue_id: "q1".into(),
            message_id: None,
            status: QueueStatus::Sending,
            timestamp: Timestamp(1),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("QueueStatusChanged"));
        assert!(json.contains("sending"));
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(ClientEvent::TextOnlyModeChanged {
            enabled: true,
            timestamp: Timestamp::now(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(ClientEvent::NotificationDismissed {
            id: 7,
            timestamp: Timestamp::now(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_name(), "notification_dismissed");
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let bus = EventBus::with_capacity(0);
        let _rx = bus.subscribe();
        bus.publish(ClientEvent::ConnectivityChanged {
            online: false,
            timestamp: Timestamp::now(),
        });
    }
}
