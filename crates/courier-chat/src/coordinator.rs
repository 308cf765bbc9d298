//! Optimistic delivery of user messages.
//!
//! `submit` inserts the user's message into the conversation before any
//! network I/O and hands back a [`Submission`] carrying the provisional id.
//! Awaiting the submission drives delivery to one of three outcomes:
//!
//! - delivered: the agent reply is appended and optionally spoken
//! - queued: the device was offline, the message waits in the queue
//! - failed: an error notification with a retry action is shown
//!
//! The optimistic message is never removed on failure.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::error::DeliveryError;
use courier_core::types::{Message, MessageId, QueueItem};
use courier_notify::{templates, NotificationAction, NotificationCenter, NotificationId};

use crate::client::NetworkClient;
use crate::connectivity::ConnectivityMonitor;
use crate::conversation::ConversationState;
use crate::queue::{OfflineQueue, QueueSender};
use crate::speech::{SpeechGuard, SpeechTarget};

/// How a submission ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Delivered { reply_id: MessageId },
    Queued { queue_id: String },
    Failed {
        error: DeliveryError,
        notification: NotificationId,
    },
}

type OutcomeFuture = Pin<Box<dyn Future<Output = SubmitOutcome> + Send>>;

/// A message already visible in the conversation, with delivery pending.
pub struct Submission {
    pub message_id: MessageId,
    pub agent_id: String,
    delivery: OutcomeFuture,
}

impl IntoFuture for Submission {
    type Output = SubmitOutcome;
    type IntoFuture = OutcomeFuture;

    fn into_future(self) -> Self::IntoFuture {
        self.delivery
    }
}

impl std::fmt::Debug for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submission")
            .field("message_id", &self.message_id)
            .field("agent_id", &self.agent_id)
            .finish_non_exhaustive()
    }
}

/// Cheap to clone; clones share one set of components.
#[derive(Clone)]
pub struct DeliveryCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<NetworkClient>,
    queue: Arc<OfflineQueue>,
    conversation: Arc<ConversationState>,
    notifications: NotificationCenter,
    connectivity: ConnectivityMonitor,
    speech: Arc<SpeechGuard>,
}

impl DeliveryCoordinator {
    /// Build the coordinator and register it as the queue's sender.
    pub fn new(
        client: Arc<NetworkClient>,
        queue: Arc<OfflineQueue>,
        conversation: Arc<ConversationState>,
        notifications: NotificationCenter,
        connectivity: ConnectivityMonitor,
        speech: Arc<SpeechGuard>,
    ) -> Self {
        queue.register_sender(Arc::new(QueueDispatcher::new(
            client.clone(),
            conversation.clone(),
        )));
        Self {
            inner: Arc::new(Inner {
                client,
                queue,
                conversation,
                notifications,
                connectivity,
                speech,
            }),
        }
    }

    /// Show `content` in the conversation now and start delivering it.
    pub fn submit(
        &self,
        agent_id: impl Into<String>,
        content: impl Into<String>,
        speech: Option<SpeechTarget>,
    ) -> Submission {
        let agent_id = agent_id.into();
        let content = content.into();

        let message_id = self
            .inner
            .conversation
            .insert(&agent_id, Message::provisional_user(content.clone()));
        tracing::debug!(agent_id = %agent_id, message_id = %message_id, "Optimistic message inserted");

        let delivery: OutcomeFuture = if self.inner.connectivity.is_online() {
            let this = self.clone();
            let agent = agent_id.clone();
            Box::pin(async move { this.deliver(agent, content, speech).await })
        } else {
            let outcome = self.queue_offline(&agent_id, &content, &message_id, speech);
            Box::pin(std::future::ready(outcome))
        };

        Submission {
            message_id,
            agent_id,
            delivery,
        }
    }

    async fn deliver(
        &self,
        agent_id: String,
        content: String,
        speech: Option<SpeechTarget>,
    ) -> SubmitOutcome {
        match self.inner.client.send(&agent_id, &content).await {
            Ok(reply) => {
                let reply_id = self.inner.conversation.append_reply(
                    &agent_id,
                    reply.message.clone(),
                    reply.timestamp,
                );
                tracing::info!(agent_id = %agent_id, reply_id = %reply_id, "Reply received");
                if let Some(target) = &speech {
                    self.inner.speech.speak(target, &reply.message).await;
                }
                SubmitOutcome::Delivered { reply_id }
            }
            Err(e) => self.fail(agent_id, content, speech, DeliveryError::Api(e)),
        }
    }

    fn queue_offline(
        &self,
        agent_id: &str,
        content: &str,
        message_id: &MessageId,
        speech: Option<SpeechTarget>,
    ) -> SubmitOutcome {
        match self
            .inner
            .queue
            .enqueue_for_message(agent_id, content, message_id.clone())
        {
            Some(queue_id) => {
                self.inner.notifications.info(templates::queued_offline());
                SubmitOutcome::Queued { queue_id }
            }
            None => {
                let capacity = self.inner.queue.capacity();
                self.fail(
                    agent_id.to_string(),
                    content.to_string(),
                    speech,
                    DeliveryError::QueueFull { capacity },
                )
            }
        }
    }

    /// Surface `error` with a retry that resubmits the same arguments.
    fn fail(
        &self,
        agent_id: String,
        content: String,
        speech: Option<SpeechTarget>,
        error: DeliveryError,
    ) -> SubmitOutcome {
        tracing::warn!(agent_id = %agent_id, code = error.code(), error = %error, "Delivery failed");
        let weak = Arc::downgrade(&self.inner);
        let action = NotificationAction::retry(move || {
            let submission = weak.upgrade().map(|inner| {
                DeliveryCoordinator { inner }.submit(
                    agent_id.clone(),
                    content.clone(),
                    speech.clone(),
                )
            });
            async move {
                if let Some(submission) = submission {
                    submission.await;
                }
            }
        });
        let notification = self.inner.notifications.notify_error(&error, Some(action));
        SubmitOutcome::Failed {
            error,
            notification,
        }
    }

    /// Forget one conversation: its messages and every queued item
    /// addressed to the agent, whatever their status.
    pub fn clear_conversation(&self, agent_id: &str) -> usize {
        let dropped = self.inner.queue.clear_agent(agent_id);
        let removed = self.inner.conversation.clear(agent_id);
        tracing::info!(agent_id, removed, dropped, "Conversation cleared");
        removed
    }

    /// Leave text-only mode and voice replies again.
    pub fn restore_voice(&self) {
        self.inner.speech.restore();
    }

    pub fn is_text_only(&self) -> bool {
        self.inner.speech.is_text_only()
    }

    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.inner.queue
    }

    pub fn conversation(&self) -> &Arc<ConversationState> {
        &self.inner.conversation
    }
}

/// Queue sender that posts through the network client and records the
/// reply in the conversation.
pub struct QueueDispatcher {
    client: Arc<NetworkClient>,
    conversation: Arc<ConversationState>,
}

impl QueueDispatcher {
    pub fn new(client: Arc<NetworkClient>, conversation: Arc<ConversationState>) -> Self {
        Self {
            client,
            conversation,
        }
    }
}

#[async_trait]
impl QueueSender for QueueDispatcher {
    async fn send(&self, item: &QueueItem) -> Result<(), DeliveryError> {
        let reply = self.client.send(&item.agent_id, &item.message).await?;
        self.conversation
            .append_reply(&item.agent_id, reply.message, reply.timestamp);
        Ok(())
    }
}
