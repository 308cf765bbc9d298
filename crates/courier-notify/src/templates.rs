//! Canonical user-facing copy for the delivery taxonomy.

use courier_core::error::{ApiError, DeliveryError};

/// Message shown for a failed delivery.
pub fn describe(error: &DeliveryError) -> String {
    match error {
        DeliveryError::Api(ApiError::NetworkError { message }) => format!(
            "Unable to reach the server. Check your connection and try again. ({})",
            message
        ),
        DeliveryError::Api(ApiError::Timeout { duration_ms }) => format!(
            "The server took too long to respond (over {} seconds). Please try again.",
            duration_ms / 1000
        ),
        DeliveryError::Api(ApiError::ServerError { status, details }) => {
            format!("The server rejected the message ({}): {}", status, details)
        }
        DeliveryError::QueueFull { capacity } => format!(
            "Offline queue is full ({} messages). Retry or clear queued messages before sending more.",
            capacity
        ),
        DeliveryError::SpeechFailed(reason) => format!("Voice playback failed: {}", reason),
    }
}

pub fn queue_nearly_full(len: usize, capacity: usize) -> String {
    format!(
        "Offline queue is almost full ({}/{} messages). New messages will be rejected at capacity.",
        len, capacity
    )
}

pub fn queued_offline() -> String {
    "You are offline. Your message was queued and will be sent when the connection returns."
        .to_string()
}

pub fn queue_sent(count: usize) -> String {
    if count == 1 {
        "Sent 1 queued message.".to_string()
    } else {
        format!("Sent {} queued messages.", count)
    }
}

pub fn queue_failed(count: usize) -> String {
    if count == 1 {
        "1 queued message failed to send.".to_string()
    } else {
        format!("{} queued messages failed to send.", count)
    }
}

pub fn text_only_enabled() -> String {
    "Voice playback keeps failing. Switched to text-only mode.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_variant_has_distinct_copy() {
        let errors = vec![
            DeliveryError::Api(ApiError::NetworkError {
                message: "refused".into(),
            }),
            DeliveryError::Api(ApiError::Timeout { duration_ms: 30_000 }),
            DeliveryError::Api(ApiError::ServerError {
                status: 500,
                details: "db down".into(),
            }),
            DeliveryError::QueueFull { capacity: 50 },
            DeliveryError::SpeechFailed("no voice".into()),
        ];
        let copies: Vec<String> = errors.iter().map(describe).collect();
        for (i, a) in copies.iter().enumerate() {
            for b in copies.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_timeout_copy_uses_seconds() {
        let copy = describe(&DeliveryError::Api(ApiError::Timeout { duration_ms: 30_000 }));
        assert!(copy.contains("30 seconds"));
    }

    #[test]
    fn test_server_error_copy_includes_status_and_details() {
        let copy = describe(&DeliveryError::Api(ApiError::ServerError {
            status: 422,
            details: "message too long".into(),
        }));
        assert!(copy.contains("422"));
        assert!(copy.contains("message too long"));
    }

    #[test]
    fn test_queue_full_copy_includes_capacity() {
        assert!(describe(&DeliveryError::QueueFull { capacity: 50 }).contains("50"));
    }

    #[test]
    fn test_plural_summaries() {
        assert_eq!(queue_sent(1), "Sent 1 queued message.");
        assert_eq!(queue_sent(3), "Sent 3 queued messages.");
        assert_eq!(queue_failed(1), "1 queued message failed to send.");
        assert_eq!(queue_failed(2), "2 queued messages failed to send.");
    }

    #[test]
    fn test_nearly_full_copy() {
        assert!(queue_nearly_full(45, 50).contains("45/50"));
    }
}
