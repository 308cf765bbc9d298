//! Transport seam between the network client and the reply service.
//!
//! The client owns retry, timeout and error classification; a transport
//! only performs one raw exchange and reports what came back.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::types::{Agent, AgentsResponse, ChatReply, ChatRequest, Timestamp};

use crate::error::ChatError;

/// Raw HTTP answer: status line plus undecoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, reason: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The exchange never produced a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
}

/// One request/response exchange with the reply service.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// `POST /api/chat` with a JSON body.
    async fn post_chat(&self, request: &ChatRequest) -> Result<TransportResponse, TransportError>;

    /// `GET /api/agents`.
    async fn get_agents(&self) -> Result<TransportResponse, TransportError>;
}

// =============================================================================
// HTTP
// =============================================================================

/// reqwest-backed transport.
///
/// The client applies its own per-attempt timeout, so none is configured
/// here.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ChatError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read(response: reqwest::Response) -> Result<TransportResponse, TransportError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Request(format!("Failed to read body: {}", e)))?;
        Ok(TransportResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn post_chat(&self, request: &ChatRequest) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(request)
            .send()
            .await
            .map_err(classify)?;
        Self::read(response).await
    }

    async fn get_agents(&self) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .get(self.url("/api/agents"))
            .send()
            .await
            .map_err(classify)?;
        Self::read(response).await
    }
}

// =============================================================================
// Mock implementation
// =============================================================================

/// Scripted behaviour for one `post_chat` call.
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Reply `200` with `echo: <message>`.
    Echo,
    /// Return this response verbatim.
    Respond(TransportResponse),
    /// Fail at the transport level.
    Fail(String),
    /// Wait, then echo. Used to trip the client timeout.
    Hang(Duration),
}

/// In-process transport for tests and offline demos.
///
/// `post_chat` consumes scripted steps in order and falls back to the
/// default step once the script runs out.
#[derive(Debug)]
pub struct MockTransport {
    script: Mutex<VecDeque<MockStep>>,
    fallback: Mutex<MockStep>,
    requests: Mutex<Vec<(tokio::time::Instant, ChatRequest)>>,
    agents: Mutex<Vec<Agent>>,
    agent_calls: Mutex<usize>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(MockStep::Echo),
            requests: Mutex::new(Vec::new()),
            agents: Mutex::new(Vec::new()),
            agent_calls: Mutex::new(0),
        }
    }

    pub fn push(&self, step: MockStep) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(step);
        }
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.push(MockStep::Fail(message.into()));
    }

    pub fn push_status(&self, status: u16, reason: &str, body: &str) {
        self.push(MockStep::Respond(TransportResponse::new(status, reason, body)));
    }

    /// Step used once the script is exhausted.
    pub fn set_fallback(&self, step: MockStep) {
        if let Ok(mut fallback) = self.fallback.lock() {
            *fallback = step;
        }
    }

    pub fn set_agents(&self, agents: Vec<Agent>) {
        if let Ok(mut slot) = self.agents.lock() {
            *slot = agents;
        }
    }

    /// Number of `post_chat` calls seen so far.
    pub fn chat_calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|(_, req)| req.clone()).collect())
            .unwrap_or_default()
    }

    /// Instants at which each `post_chat` call started.
    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|(at, _)| *at).collect())
            .unwrap_or_default()
    }

    pub fn agent_calls(&self) -> usize {
        self.agent_calls.lock().map(|n| *n).unwrap_or(0)
    }

    fn next_step(&self) -> MockStep {
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match scripted {
            Some(step) => step,
            None => self
                .fallback
                .lock()
                .map(|f| f.clone())
                .unwrap_or(MockStep::Echo),
        }
    }

    fn echo(request: &ChatRequest) -> TransportResponse {
        let reply = ChatReply {
            message: format!("echo: {}", request.message),
            agent_id: request.agent_id.clone(),
            timestamp: Timestamp::now(),
        };
        let body = serde_json::to_string(&reply).unwrap_or_default();
        TransportResponse::new(200, "OK", body)
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn post_chat(&self, request: &ChatRequest) -> Result<TransportResponse, TransportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((tokio::time::Instant::now(), request.clone()));
        }
        match self.next_step() {
            MockStep::Echo => Ok(Self::echo(request)),
            MockStep::Respond(response) => Ok(response),
            MockStep::Fail(message) => Err(TransportError::Connect(message)),
            MockStep::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Ok(Self::echo(request))
            }
        }
    }

    async fn get_agents(&self) -> Result<TransportResponse, TransportError> {
        if let Ok(mut calls) = self.agent_calls.lock() {
            *calls += 1;
        }
        let agents = self.agents.lock().map(|a| a.clone()).unwrap_or_default();
        let body = serde_json::to_string(&AgentsResponse { agents })
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(TransportResponse::new(200, "OK", body))
    }
}
