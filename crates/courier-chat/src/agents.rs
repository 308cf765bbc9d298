//! Cached agent listing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier_core::error::ApiError;
use courier_core::types::Agent;
use tokio::time::Instant;

use crate::client::NetworkClient;

struct Cached {
    fetched_at: Instant,
    agents: Vec<Agent>,
}

/// Fetches `/api/agents` at most once per TTL.
pub struct AgentDirectory {
    client: Arc<NetworkClient>,
    ttl: Duration,
    cache: Mutex<Option<Cached>>,
}

impl AgentDirectory {
    pub fn new(client: Arc<NetworkClient>, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            cache: Mutex::new(None),
        }
    }

    /// Cached agents if still fresh.
    pub fn cached(&self) -> Option<Vec<Agent>> {
        let cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        cache
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| c.agents.clone())
    }

    pub async fn agents(&self) -> Result<Vec<Agent>, ApiError> {
        if let Some(agents) = self.cached() {
            return Ok(agents);
        }
        let agents = self.client.list_agents().await?;
        tracing::debug!(count = agents.len(), "Agent list refreshed");
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        *cache = Some(Cached {
            fetched_at: Instant::now(),
            agents: agents.clone(),
        });
        Ok(agents)
    }

    pub async fn find(&self, agent_id: &str) -> Result<Option<Agent>, ApiError> {
        Ok(self.agents().await?.into_iter().find(|a| a.id == agent_id))
    }

    pub fn invalidate(&self) {
        *self.cache.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}
