//! In-memory conversation state, one ordered message list per agent.
//!
//! Lists are kept sorted by timestamp. Messages with equal timestamps stay
//! in insertion order, so an optimistic user message always precedes the
//! reply it produced.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use courier_core::events::{ClientEvent, EventBus};
use courier_core::types::{Message, MessageId, QueueStatus, Role, Timestamp};

use crate::error::ChatError;

pub struct ConversationState {
    conversations: Mutex<HashMap<String, Vec<Message>>>,
    events: EventBus,
}

impl ConversationState {
    pub fn new(events: EventBus) -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Message>>> {
        // A panic mid-update leaves at worst one half-applied message; the
        // map itself stays usable.
        self.conversations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Insert a message at its timestamp position.
    pub fn insert(&self, agent_id: &str, message: Message) -> MessageId {
        let id = message.id.clone();
        let role = message.role;
        let timestamp = message.timestamp;
        {
            let mut conversations = self.lock();
            let list = conversations.entry(agent_id.to_string()).or_default();
            let pos = list.partition_point(|m| m.timestamp <= timestamp);
            list.insert(pos, message);
        }
        self.events.publish(ClientEvent::MessageAdded {
            agent_id: agent_id.to_string(),
            message_id: id.clone(),
            role,
            timestamp,
        });
        id
    }

    /// Insert a confirmed agent reply.
    pub fn append_reply(
        &self,
        agent_id: &str,
        content: impl Into<String>,
        timestamp: Timestamp,
    ) -> MessageId {
        self.insert(agent_id, Message::agent_reply(content, timestamp))
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    fn update<F>(&self, agent_id: &str, id: &MessageId, f: F) -> Result<(), ChatError>
    where
        F: FnOnce(&mut Message) -> Result<(), ChatError>,
    {
        {
            let mut conversations = self.lock();
            let message = conversations
                .get_mut(agent_id)
                .and_then(|list| list.iter_mut().find(|m| &m.id == id))
                .ok_or_else(|| ChatError::MessageNotFound(id.clone()))?;
            f(message)?;
        }
        self.events.publish(ClientEvent::MessageUpdated {
            agent_id: agent_id.to_string(),
            message_id: id.clone(),
            timestamp: Timestamp::now(),
        });
        Ok(())
    }

    /// Mirror a queue item's status onto its message. `None` clears it.
    pub fn set_queue_status(
        &self,
        agent_id: &str,
        id: &MessageId,
        status: Option<QueueStatus>,
    ) -> Result<(), ChatError> {
        self.update(agent_id, id, |message| {
            message.queue_status = status;
            Ok(())
        })
    }

    /// Replace the text of a user message.
    pub fn edit(&self, agent_id: &str, id: &MessageId, content: &str) -> Result<(), ChatError> {
        if content.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        self.update(agent_id, id, |message| {
            if message.role != Role::User {
                return Err(ChatError::NotEditable(message.id.clone()));
            }
            message.content = content.to_string();
            message.edited = true;
            message.edited_at = Some(Timestamp::now());
            Ok(())
        })
    }

    /// Set or clear the reaction on a message.
    pub fn react(
        &self,
        agent_id: &str,
        id: &MessageId,
        reaction: Option<String>,
    ) -> Result<(), ChatError> {
        self.update(agent_id, id, |message| {
            message.reaction = reaction;
            Ok(())
        })
    }

    pub fn delete(&self, agent_id: &str, id: &MessageId) -> Result<Message, ChatError> {
        let removed = {
            let mut conversations = self.lock();
            let list = conversations
                .get_mut(agent_id)
                .ok_or_else(|| ChatError::MessageNotFound(id.clone()))?;
            let pos = list
                .iter()
                .position(|m| &m.id == id)
                .ok_or_else(|| ChatError::MessageNotFound(id.clone()))?;
            list.remove(pos)
        };
        self.events.publish(ClientEvent::MessageDeleted {
            agent_id: agent_id.to_string(),
            message_id: id.clone(),
            timestamp: Timestamp::now(),
        });
        Ok(removed)
    }

    /// Drop every message of one conversation. Returns how many were removed.
    pub fn clear(&self, agent_id: &str) -> usize {
        let removed = self
            .lock()
            .remove(agent_id)
            .map(|list| list.len())
            .unwrap_or(0);
        self.events.publish(ClientEvent::ConversationCleared {
            agent_id: agent_id.to_string(),
            removed,
            timestamp: Timestamp::now(),
        });
        removed
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn messages(&self, agent_id: &str) -> Vec<Message> {
        self.lock().get(agent_id).cloned().unwrap_or_default()
    }

    pub fn get(&self, agent_id: &str, id: &MessageId) -> Option<Message> {
        self.lock()
            .get(agent_id)
            .and_then(|list| list.iter().find(|m| &m.id == id).cloned())
    }

    pub fn len(&self, agent_id: &str) -> usize {
        self.lock().get(agent_id).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self, agent_id: &str) -> bool {
        self.len(agent_id) == 0
    }

    /// Agents with at least one message, sorted.
    pub fn agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(agent, _)| agent.clone())
            .collect();
        agents.sort();
        agents
    }

    // =========================================================================
    // Export / Import
    // =========================================================================

    /// Serialize one conversation as a JSON array of messages.
    pub fn export(&self, agent_id: &str) -> Result<String, ChatError> {
        serde_json::to_string_pretty(&self.messages(agent_id))
            .map_err(|e| ChatError::Import(format!("Failed to export conversation: {}", e)))
    }

    /// Merge an exported conversation. Messages whose id already exists are
    /// skipped. Returns the number imported.
    pub fn import(&self, agent_id: &str, json: &str) -> Result<usize, ChatError> {
        let incoming: Vec<Message> = serde_json::from_str(json)
            .map_err(|e| ChatError::Import(format!("Invalid conversation export: {}", e)))?;

        let added: Vec<Message> = {
            let mut conversations = self.lock();
            let list = conversations.entry(agent_id.to_string()).or_default();
            let mut added = Vec::new();
            for message in incoming {
                if list.iter().any(|m| m.id == message.id) {
                    continue;
                }
                let pos = list.partition_point(|m| m.timestamp <= message.timestamp);
                list.insert(pos, message.clone());
                added.push(message);
            }
            added
        };

        for message in &added {
            self.events.publish(ClientEvent::MessageAdded {
                agent_id: agent_id.to_string(),
                message_id: message.id.clone(),
                role: message.role,
                timestamp: message.timestamp,
            });
        }
        tracing::info!(agent_id, imported = added.len(), "Conversation imported");
        Ok(added.len())
    }
}
