//! Retrying client for the reply service.
//!
//! Every call ends in exactly one of: a decoded reply, or one `ApiError`.
//! Only transport failures are retried. A timed-out attempt or a non-2xx
//! answer is final.

use std::sync::Arc;
use std::time::Duration;

use courier_core::config::NetworkConfig;
use courier_core::error::ApiError;
use courier_core::types::{Agent, AgentsResponse, ChatReply, ChatRequest};
use serde::de::DeserializeOwned;

use crate::transport::{ChatTransport, TransportError, TransportResponse};

/// Attempt budget, backoff and per-attempt timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            timeout: config.timeout(),
        }
    }

    /// Delay before the attempt following attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exponent)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&NetworkConfig::default())
    }
}

enum Call<'a> {
    Chat(&'a ChatRequest),
    Agents,
}

impl Call<'_> {
    fn label(&self) -> &'static str {
        match self {
            Call::Chat(_) => "POST /api/chat",
            Call::Agents => "GET /api/agents",
        }
    }
}

pub struct NetworkClient {
    transport: Arc<dyn ChatTransport>,
    policy: RetryPolicy,
}

impl NetworkClient {
    pub fn new(transport: Arc<dyn ChatTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send one chat message and return the agent's reply.
    pub async fn send(&self, agent_id: &str, message: &str) -> Result<ChatReply, ApiError> {
        let request = ChatRequest {
            agent_id: agent_id.to_string(),
            message: message.to_string(),
        };
        let response = self.execute(Call::Chat(&request)).await?;
        decode(response)
    }

    /// Fetch the agents the service exposes.
    pub async fn list_agents(&self) -> Result<Vec<Agent>, ApiError> {
        let response = self.execute(Call::Agents).await?;
        decode::<AgentsResponse>(response).map(|r| r.agents)
    }

    async fn attempt(&self, call: &Call<'_>) -> Result<TransportResponse, TransportError> {
        match call {
            Call::Chat(request) => self.transport.post_chat(request).await,
            Call::Agents => self.transport.get_agents().await,
        }
    }

    async fn execute(&self, call: Call<'_>) -> Result<TransportResponse, ApiError> {
        let max_attempts = self.policy.attempts();
        let mut attempt = 1;
        loop {
            tracing::debug!(
                call = call.label(),
                attempt,
                max_attempts,
                "Sending request"
            );

            match tokio::time::timeout(self.policy.timeout, self.attempt(&call)).await {
                Err(_) => {
                    let duration_ms = self.policy.timeout.as_millis() as u64;
                    tracing::warn!(call = call.label(), attempt, duration_ms, "Request timed out");
                    return Err(ApiError::Timeout { duration_ms });
                }
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(err)) => {
                    if attempt >= max_attempts {
                        tracing::warn!(
                            call = call.label(),
                            attempts = attempt,
                            error = %err,
                            "Request failed, giving up"
                        );
                        return Err(ApiError::NetworkError {
                            message: err.to_string(),
                        });
                    }
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(
                        call = call.label(),
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Request failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

fn decode<T: DeserializeOwned>(response: TransportResponse) -> Result<T, ApiError> {
    if !response.is_success() {
        return Err(ApiError::ServerError {
            status: response.status,
            details: error_details(&response),
        });
    }
    serde_json::from_str(&response.body).map_err(|e| ApiError::ServerError {
        status: response.status,
        details: format!("invalid response body: {}", e),
    })
}

/// Pull a human-readable reason out of an error body.
///
/// Accepts `{"error": "..."}` and `{"error": {"message": "..."}}`; anything
/// else falls back to the status line.
fn error_details(response: &TransportResponse) -> String {
    let structured = serde_json::from_str::<serde_json::Value>(&response.body)
        .ok()
        .and_then(|body| match body.get("error") {
            Some(serde_json::Value::String(text)) => Some(text.clone()),
            Some(serde_json::Value::Object(obj)) => obj
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string),
            _ => None,
        })
        .filter(|text| !text.trim().is_empty());

    structured.unwrap_or_else(|| {
        format!("{} {}", response.status, response.reason)
            .trim()
            .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockStep, MockTransport};

    fn client(mock: &Arc<MockTransport>) -> NetworkClient {
        NetworkClient::new(mock.clone(), RetryPolicy::default())
    }

    /// Paused-clock timers fire on millisecond ticks.
    fn assert_close(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(5),
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    // =========================================================================
    // Policy
    // =========================================================================

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.attempts(), 1);
    }

    // =========================================================================
    // Retry behaviour
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let mock = Arc::new(MockTransport::new());
        let reply = client(&mock).send("tutor", "hello").await.unwrap();
        assert_eq!(reply.message, "echo: hello");
        assert_eq!(mock.chat_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_retried_with_backoff() {
        let mock = Arc::new(MockTransport::new());
        mock.push_failure("refused");
        mock.push_failure("refused");

        let reply = client(&mock).send("tutor", "hello").await.unwrap();
        assert_eq!(reply.message, "echo: hello");

        let times = mock.call_times();
        assert_eq!(times.len(), 3);
        assert_close(times[1] - times[0], Duration::from_secs(1));
        assert_close(times[2] - times[1], Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_yield_network_error() {
        let mock = Arc::new(MockTransport::new());
        mock.set_fallback(MockStep::Fail("connection refused".into()));

        let err = client(&mock).send("tutor", "hello").await.unwrap_err();
        assert_eq!(mock.chat_calls(), 3);
        match err {
            ApiError::NetworkError { message } => assert!(message.contains("connection refused")),
            other => panic!("expected NetworkError, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_not_retried() {
        let mock = Arc::new(MockTransport::new());
        mock.set_fallback(MockStep::Hang(Duration::from_secs(60)));

        let start = tokio::time::Instant::now();
        let err = client(&mock).send("tutor", "hello").await.unwrap_err();
        assert_eq!(err, ApiError::Timeout { duration_ms: 30_000 });
        assert_eq!(mock.chat_calls(), 1);
        assert_close(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_not_retried() {
        let mock = Arc::new(MockTransport::new());
        mock.push_status(500, "Internal Server Error", r#"{"error":"model unavailable"}"#);

        let err = client(&mock).send("tutor", "hello").await.unwrap_err();
        assert_eq!(
            err,
            ApiError::ServerError {
                status: 500,
                details: "model unavailable".into()
            }
        );
        assert_eq!(mock.chat_calls(), 1);
    }

    // =========================================================================
    // Error details
    // =========================================================================

    #[test]
    fn test_error_details_nested_message() {
        let response = TransportResponse::new(
            422,
            "Unprocessable Entity",
            r#"{"error":{"message":"too long","code":"E1"}}"#,
        );
        assert_eq!(error_details(&response), "too long");
    }

    #[test]
    fn test_error_details_fallback_to_status_line() {
        let response = TransportResponse::new(502, "Bad Gateway", "<html>oops</html>");
        assert_eq!(error_details(&response), "502 Bad Gateway");

        let response = TransportResponse::new(599, "", "");
        assert_eq!(error_details(&response), "599");
    }

    #[test]
    fn test_invalid_success_body_is_server_error() {
        let response = TransportResponse::new(200, "OK", "not json");
        let err = decode::<ChatReply>(response).unwrap_err();
        match err {
            ApiError::ServerError { status, details } => {
                assert_eq!(status, 200);
                assert!(details.starts_with("invalid response body"));
            }
            other => panic!("expected ServerError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_agents() {
        let mock = Arc::new(MockTransport::new());
        mock.set_agents(vec![Agent {
            id: "chef".into(),
            name: "Chef".into(),
            description: Some("Cooking help".into()),
            voice_id: None,
            language: Some("fr-FR".into()),
        }]);
        let agents = client(&mock).list_agents().await.unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].id, "chef");
    }
}
