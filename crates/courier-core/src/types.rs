use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Author of a conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Agent => write!(f, "agent"),
        }
    }
}

/// Delivery status of a queued outbound message.
///
/// `Sent` doubles as "delivered" on the matching conversation message once
/// the queue item has been removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Pending => write!(f, "pending"),
            QueueStatus::Sending => write!(f, "sending"),
            QueueStatus::Sent => write!(f, "sent"),
            QueueStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Severity of a user-visible notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::Info => write!(f, "info"),
            NotificationKind::Success => write!(f, "success"),
            NotificationKind::Warning => write!(f, "warning"),
            NotificationKind::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Newtype Wrappers
// =============================================================================

/// Milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }
}

/// Reserved prefix of locally generated message ids.
pub const PROVISIONAL_ID_PREFIX: &str = "local-";

/// Identifier of a conversation message.
///
/// Either issued by the server or generated locally for an optimistic
/// message; the latter always starts with [`PROVISIONAL_ID_PREFIX`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a fresh provisional id.
    pub fn provisional() -> Self {
        Self(format!("{}{}", PROVISIONAL_ID_PREFIX, Uuid::new_v4().simple()))
    }

    /// Generate an id for a message confirmed by the server.
    pub fn durable() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Domain Entities
// =============================================================================

/// A single entry in a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<String>,
    /// Mirrors the status of the queue item delivering this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_status: Option<QueueStatus>,
}

impl Message {
    /// An optimistic user message with a provisional id, stamped now.
    pub fn provisional_user(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::provisional(),
            role: Role::User,
            content: content.into(),
            timestamp: Timestamp::now(),
            edited: false,
            edited_at: None,
            reaction: None,
            queue_status: None,
        }
    }

    /// A confirmed agent reply.
    pub fn agent_reply(content: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            id: MessageId::durable(),
            role: Role::Agent,
            content: content.into(),
            timestamp,
            edited: false,
            edited_at: None,
            reaction: None,
            queue_status: None,
        }
    }
}

/// A durable record of one not-yet-confirmed outbound message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub agent_id: String,
    pub message: String,
    pub timestamp: Timestamp,
    pub status: QueueStatus,
    pub retry_count: u32,
    /// Optimistic conversation message this item reconciles, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
}

impl QueueItem {
    pub fn new(
        agent_id: impl Into<String>,
        message: impl Into<String>,
        message_id: Option<MessageId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            message: message.into(),
            timestamp: Timestamp::now(),
            status: QueueStatus::Pending,
            retry_count: 0,
            message_id,
        }
    }
}

/// A remote agent the user can talk to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

// =============================================================================
// Wire Types
// =============================================================================

/// Body of `POST /api/chat`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub agent_id: String,
    pub message: String,
}

/// Successful reply of `POST /api/chat`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub message: String,
    pub agent_id: String,
    #[serde(deserialize_with = "deserialize_flexible_timestamp")]
    pub timestamp: Timestamp,
}

/// Body of `GET /api/agents`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentsResponse {
    pub agents: Vec<Agent>,
}

/// Accepts epoch milliseconds or an RFC 3339 string.
fn deserialize_flexible_timestamp<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => Ok(Timestamp(ms)),
        Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| Timestamp::from_datetime(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisional_ids_are_distinguishable() {
        let local = MessageId::provisional();
        let durable = MessageId::durable();
        assert!(local.is_provisional());
        assert!(!durable.is_provisional());
        assert_ne!(local, MessageId::provisional());
    }

    #[test]
    fn test_provisional_user_message() {
        let msg = Message::provisional_user("hello there");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "hello there");
        assert!(msg.id.is_provisional());
        assert!(msg.queue_status.is_none());
        assert!(!msg.edited);
    }

    #[test]
    fn test_message_serializes_camel_case_and_skips_empty() {
        let mut msg = Message::agent_reply("hi", Timestamp(1_700_000_000_000));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "agent");
        assert_eq!(json["timestamp"], 1_700_000_000_000i64);
        assert!(json.get("queueStatus").is_none());
        assert!(json.get("edited").is_none());

        msg.queue_status = Some(QueueStatus::Pending);
        msg.edited = true;
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["queueStatus"], "pending");
        assert_eq!(json["edited"], true);
    }

    #[test]
    fn test_queue_item_new_is_pending() {
        let item = QueueItem::new("agent-1", "ping", None);
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.retry_count, 0);
        assert!(!item.id.is_empty());
    }

    #[test]
    fn test_queue_item_json_shape() {
        let item = QueueItem::new("agent-1", "ping", Some(MessageId::from("local-abc")));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["agentId"], "agent-1");
        assert_eq!(json["retryCount"], 0);
        assert_eq!(json["status"], "pending");
        assert_eq!(json["messageId"], "local-abc");
    }

    #[test]
    fn test_queue_item_without_message_id_still_parses() {
        let raw = r#"{"id":"q1","agentId":"a","message":"m","timestamp":5,"status":"failed","retryCount":2}"#;
        let item: QueueItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.status, QueueStatus::Failed);
        assert_eq!(item.retry_count, 2);
        assert!(item.message_id.is_none());
    }

    #[test]
    fn test_chat_reply_accepts_millis() {
        let raw = r#"{"message":"hey","agentId":"a1","timestamp":1700000000000}"#;
        let reply: ChatReply = serde_json::from_str(raw).unwrap();
        assert_eq!(reply.timestamp, Timestamp(1_700_000_000_000));
    }

    #[test]
    fn test_chat_reply_accepts_rfc3339() {
        let raw = r#"{"message":"hey","agentId":"a1","timestamp":"2023-11-14T22:13:20Z"}"#;
        let reply: ChatReply = serde_json::from_str(raw).unwrap();
        assert_eq!(reply.timestamp, Timestamp(1_700_000_000_000));
    }

    #[test]
    fn test_chat_reply_rejects_garbage_timestamp() {
        let raw = r#"{"message":"hey","agentId":"a1","timestamp":"yesterday"}"#;
        assert!(serde_json::from_str::<ChatReply>(raw).is_err());
    }

    #[test]
    fn test_timestamp_datetime_conversion() {
        let ts = Timestamp(1_700_000_000_123);
        assert_eq!(Timestamp::from_datetime(ts.to_datetime()), ts);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(QueueStatus::Sending.to_string(), "sending");
        assert_eq!(NotificationKind::Warning.to_string(), "warning");
        assert_eq!(Role::User.to_string(), "user");
    }
}
