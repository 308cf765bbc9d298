//! Error types for the delivery pipeline.

use courier_core::error::CourierError;
use courier_core::types::MessageId;

/// Errors from conversation and queue management.
///
/// Delivery failures themselves are `DeliveryError`s and end up as
/// notifications; these are the local, caller-facing failures.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),
    #[error("only user messages can be edited: {0}")]
    NotEditable(MessageId),
    #[error("queue item not found: {0}")]
    QueueItemNotFound(String),
    #[error("import error: {0}")]
    Import(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<CourierError> for ChatError {
    fn from(err: CourierError) -> Self {
        ChatError::StorageError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(ChatError::EmptyMessage.to_string(), "message cannot be empty");

        let err = ChatError::MessageNotFound(MessageId::from("local-1"));
        assert_eq!(err.to_string(), "message not found: local-1");

        let err = ChatError::NotEditable(MessageId::from("srv-9"));
        assert_eq!(err.to_string(), "only user messages can be edited: srv-9");

        let err = ChatError::QueueItemNotFound("q-1".into());
        assert_eq!(err.to_string(), "queue item not found: q-1");

        let err = ChatError::Import("bad json".into());
        assert_eq!(err.to_string(), "import error: bad json");
    }

    #[test]
    fn test_chat_error_from_courier_error() {
        let err: ChatError = CourierError::Storage("disk full".into()).into();
        assert!(matches!(err, ChatError::StorageError(_)));
        assert!(err.to_string().contains("disk full"));
    }
}
