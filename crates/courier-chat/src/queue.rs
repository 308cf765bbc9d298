//! Durable offline queue.
//!
//! Messages typed while offline are held here, persisted under a single
//! store key after every mutation, and replayed in FIFO order when a
//! processing pass runs. Items are removed only after the service confirms
//! delivery; a failed item stays until the user retries or removes it.
//!
//! Status flow: `pending -> sending -> (removed | failed)`, and
//! `failed -> pending` on retry. Each transition is mirrored onto the
//! conversation message the item delivers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use courier_core::config::QueueConfig;
use courier_core::error::DeliveryError;
use courier_core::events::{ClientEvent, EventBus};
use courier_core::types::{MessageId, QueueItem, QueueStatus, Timestamp};
use courier_notify::{templates, NotificationAction, NotificationCenter, NotificationId};
use courier_storage::DurableStore;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::connectivity::ConnectivityMonitor;
use crate::conversation::ConversationState;
use crate::error::ChatError;

/// Performs the actual delivery of one queued item.
#[async_trait]
pub trait QueueSender: Send + Sync {
    async fn send(&self, item: &QueueItem) -> Result<(), DeliveryError>;
}

/// Outcome counts of one processing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Clears the in-progress flag even if the pass future is dropped.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct OfflineQueue {
    config: QueueConfig,
    store: Arc<dyn DurableStore>,
    items: Mutex<Vec<QueueItem>>,
    sender: Mutex<Option<Arc<dyn QueueSender>>>,
    processing: AtomicBool,
    rerun: AtomicBool,
    warning: Mutex<Option<NotificationId>>,
    connectivity: ConnectivityMonitor,
    conversation: Arc<ConversationState>,
    notifications: NotificationCenter,
    events: EventBus,
}

impl OfflineQueue {
    /// Open the queue and rehydrate whatever the store holds.
    pub fn open(
        config: QueueConfig,
        store: Arc<dyn DurableStore>,
        connectivity: ConnectivityMonitor,
        conversation: Arc<ConversationState>,
        notifications: NotificationCenter,
        events: EventBus,
    ) -> Arc<Self> {
        let items = load_items(store.as_ref(), &config.storage_key);
        tracing::info!(
            items = items.len(),
            key = %config.storage_key,
            "Offline queue loaded"
        );
        Arc::new(Self {
            config,
            store,
            items: Mutex::new(items),
            sender: Mutex::new(None),
            processing: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            warning: Mutex::new(None),
            connectivity,
            conversation,
            notifications,
            events,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<QueueItem>> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install the delivery function used by processing passes.
    pub fn register_sender(&self, sender: Arc<dyn QueueSender>) {
        let mut slot = self.sender.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(sender);
    }

    fn sender(&self) -> Option<Arc<dyn QueueSender>> {
        self.sender
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn capacity(&self) -> usize {
        self.config.max_size
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    fn persist(&self, items: &[QueueItem]) {
        let result = serde_json::to_string(items)
            .map_err(|e| ChatError::StorageError(format!("Failed to serialize queue: {}", e)))
            .and_then(|json| {
                self.store
                    .set(&self.config.storage_key, &json)
                    .map_err(ChatError::from)
            });
        if let Err(e) = result {
            tracing::error!(error = %e, "Failed to persist offline queue");
        }
    }

    /// Apply `f` to the item with `id` under the lock, persist, and return
    /// the updated item. `f` returning `false` leaves the queue untouched.
    fn transition<F>(&self, id: &str, f: F) -> Option<QueueItem>
    where
        F: FnOnce(&mut QueueItem) -> bool,
    {
        let updated = {
            let mut items = self.lock();
            let item = items.iter_mut().find(|i| i.id == id)?;
            if !f(item) {
                return None;
            }
            let updated = item.clone();
            self.persist(&items);
            updated
        };
        self.announce(&updated, updated.status);
        Some(updated)
    }

    /// Mirror a status change onto the conversation and the event bus.
    fn announce(&self, item: &QueueItem, status: QueueStatus) {
        if let Some(message_id) = &item.message_id {
            if let Err(e) = self
                .conversation
                .set_queue_status(&item.agent_id, message_id, Some(status))
            {
                tracing::debug!(error = %e, queue_id = %item.id, "Queued message no longer in conversation");
            }
        }
        self.events.publish(ClientEvent::QueueStatusChanged {
            queue_id: item.id.clone(),
            message_id: item.message_id.clone(),
            status,
            timestamp: Timestamp::now(),
        });
    }

    // =========================================================================
    // Enqueue
    // =========================================================================

    /// Queue a bare message. Returns the queue id, or `None` when full.
    pub fn enqueue(&self, agent_id: &str, message: &str) -> Option<String> {
        self.push(QueueItem::new(agent_id, message, None))
    }

    /// Queue a message already shown in the conversation under `message_id`.
    pub fn enqueue_for_message(
        &self,
        agent_id: &str,
        message: &str,
        message_id: MessageId,
    ) -> Option<String> {
        self.push(QueueItem::new(agent_id, message, Some(message_id)))
    }

    fn push(&self, item: QueueItem) -> Option<String> {
        let len = {
            let mut items = self.lock();
            if items.len() >= self.config.max_size {
                tracing::warn!(
                    capacity = self.config.max_size,
                    agent_id = %item.agent_id,
                    "Offline queue full, rejecting message"
                );
                return None;
            }
            items.push(item.clone());
            self.persist(&items);
            items.len()
        };
        tracing::info!(queue_id = %item.id, agent_id = %item.agent_id, len, "Message queued");
        self.announce(&item, QueueStatus::Pending);
        if len >= self.config.warning_threshold() {
            self.warn_nearly_full(len);
        }
        Some(item.id)
    }

    /// One warning on screen at a time.
    fn warn_nearly_full(&self, len: usize) {
        let mut warning = self.warning.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(id) = *warning {
            if self.notifications.get(id).is_some() {
                return;
            }
        }
        let id = self
            .notifications
            .warning(templates::queue_nearly_full(len, self.config.max_size));
        *warning = Some(id);
    }

    // =========================================================================
    // Processing
    // =========================================================================

    /// Deliver every pending item once, in FIFO order.
    ///
    /// Returns the number delivered. A call made while offline or with no
    /// sender registered returns 0 and does nothing. A call made while
    /// another pass is running returns 0 and makes that pass run once more
    /// when it finishes, so items reset in the meantime are not stranded.
    pub async fn process_queue(self: &Arc<Self>) -> usize {
        self.run_pass().await.succeeded
    }

    /// Like [`process_queue`](Self::process_queue) but reports failures too.
    /// Counts cover every pass this call ran, follow-ups included.
    pub async fn run_pass(self: &Arc<Self>) -> PassSummary {
        if !self.connectivity.is_online() {
            tracing::debug!("Offline, skipping queue pass");
            return PassSummary::default();
        }
        let Some(sender) = self.sender() else {
            tracing::warn!("No queue sender registered, skipping pass");
            return PassSummary::default();
        };

        // Request a pass first, then try to become the runner. A runner that
        // is finishing re-checks the request after releasing the flag.
        self.rerun.store(true, Ordering::SeqCst);
        let mut total = PassSummary::default();
        loop {
            if self.processing.swap(true, Ordering::SeqCst) {
                tracing::debug!("Queue pass already running, follow-up requested");
                return total;
            }
            {
                let _guard = PassGuard(&self.processing);
                while self.rerun.swap(false, Ordering::SeqCst) && self.connectivity.is_online() {
                    let summary = self.pass_once(sender.as_ref()).await;
                    total.succeeded += summary.succeeded;
                    total.failed += summary.failed;
                }
            }
            if !self.rerun.load(Ordering::SeqCst) || !self.connectivity.is_online() {
                return total;
            }
        }
    }

    async fn pass_once(self: &Arc<Self>, sender: &dyn QueueSender) -> PassSummary {
        let snapshot = self.begin_pass();
        if snapshot.is_empty() {
            return PassSummary::default();
        }
        tracing::info!(pending = snapshot.len(), "Processing offline queue");

        let mut summary = PassSummary::default();
        for id in snapshot {
            if !self.connectivity.is_online() {
                tracing::info!("Went offline mid-pass, leaving remaining items pending");
                break;
            }
            let Some(item) = self.transition(&id, |item| {
                if item.status != QueueStatus::Pending {
                    return false;
                }
                item.status = QueueStatus::Sending;
                true
            }) else {
                continue;
            };

            match sender.send(&item).await {
                Ok(()) => {
                    self.complete(&id);
                    summary.succeeded += 1;
                }
                Err(e) => {
                    tracing::warn!(queue_id = %id, error = %e, "Queued message failed");
                    self.transition(&id, |item| {
                        item.status = QueueStatus::Failed;
                        item.retry_count += 1;
                        true
                    });
                    summary.failed += 1;
                }
            }
        }

        self.summarize(summary);
        summary
    }

    /// Reset items stranded in `sending` by an interrupted pass, then
    /// snapshot the pending ids.
    fn begin_pass(&self) -> Vec<String> {
        let mut stranded = Vec::new();
        let snapshot = {
            let mut items = self.lock();
            for item in items.iter_mut() {
                if item.status == QueueStatus::Sending {
                    item.status = QueueStatus::Pending;
                    stranded.push(item.clone());
                }
            }
            if !stranded.is_empty() {
                self.persist(&items);
            }
            items
                .iter()
                .filter(|i| i.status == QueueStatus::Pending)
                .map(|i| i.id.clone())
                .collect()
        };
        for item in &stranded {
            self.announce(item, QueueStatus::Pending);
        }
        snapshot
    }

    fn complete(&self, id: &str) {
        let removed = {
            let mut items = self.lock();
            let Some(pos) = items.iter().position(|i| i.id == id) else {
                return;
            };
            let removed = items.remove(pos);
            self.persist(&items);
            removed
        };
        tracing::info!(queue_id = %id, "Queued message delivered");
        self.announce(&removed, QueueStatus::Sent);
    }

    fn summarize(self: &Arc<Self>, summary: PassSummary) {
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Queue pass finished"
        );
        self.events.publish(ClientEvent::QueueProcessed {
            succeeded: summary.succeeded,
            failed: summary.failed,
            timestamp: Timestamp::now(),
        });
        if summary.succeeded > 0 {
            self.notifications
                .success(templates::queue_sent(summary.succeeded));
        }
        if summary.failed > 0 {
            let queue = Arc::downgrade(self);
            let action = NotificationAction::retry(move || {
                let queue = queue.clone();
                async move {
                    if let Some(queue) = queue.upgrade() {
                        queue.retry_failed().await;
                    }
                }
            });
            self.notifications
                .error(templates::queue_failed(summary.failed), Some(action));
        }
    }

    /// Move every failed item back to pending and, if online, run a pass.
    /// Returns the number delivered by that pass. If a pass is already
    /// running, the reset items are delivered by its follow-up and this
    /// returns 0.
    pub async fn retry_failed(self: &Arc<Self>) -> usize {
        let reset: Vec<QueueItem> = {
            let mut items = self.lock();
            let mut reset = Vec::new();
            for item in items.iter_mut() {
                if item.status == QueueStatus::Failed {
                    item.status = QueueStatus::Pending;
                    reset.push(item.clone());
                }
            }
            if !reset.is_empty() {
                self.persist(&items);
            }
            reset
        };
        tracing::info!(count = reset.len(), "Retrying failed queue items");
        for item in &reset {
            self.announce(item, QueueStatus::Pending);
        }
        if self.connectivity.is_online() {
            self.process_queue().await
        } else {
            0
        }
    }

    /// Run a pass on every offline-to-online transition.
    ///
    /// Transitions are read from the event bus, which queues every change,
    /// and the subscription is taken before this returns. A flap that ends
    /// online is never missed.
    pub fn spawn_reconnect_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.connectivity.transitions();
        let queue: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let reconnected = match rx.recv().await {
                    Ok(ClientEvent::ConnectivityChanged { online, .. }) => online,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Reconnect listener lagged");
                        match queue.upgrade() {
                            Some(queue) => queue.connectivity.is_online(),
                            None => break,
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if !reconnected {
                    continue;
                }
                let Some(queue) = queue.upgrade() else {
                    break;
                };
                tracing::info!("Back online, flushing offline queue");
                queue.process_queue().await;
            }
        })
    }

    // =========================================================================
    // Management
    // =========================================================================

    /// Drop one item regardless of status. Its message loses its status.
    pub fn remove(&self, id: &str) -> Result<QueueItem, ChatError> {
        let removed = {
            let mut items = self.lock();
            let pos = items
                .iter()
                .position(|i| i.id == id)
                .ok_or_else(|| ChatError::QueueItemNotFound(id.to_string()))?;
            let removed = items.remove(pos);
            self.persist(&items);
            removed
        };
        tracing::info!(queue_id = %id, "Queue item removed");
        self.detach(&removed);
        Ok(removed)
    }

    /// Drop every item addressed to `agent_id`. Returns how many went.
    pub fn clear_agent(&self, agent_id: &str) -> usize {
        let removed: Vec<QueueItem> = {
            let mut items = self.lock();
            let (gone, kept): (Vec<_>, Vec<_>) =
                items.drain(..).partition(|i| i.agent_id == agent_id);
            *items = kept;
            if !gone.is_empty() {
                self.persist(&items);
            }
            gone
        };
        tracing::info!(agent_id, removed = removed.len(), "Queue cleared for agent");
        for item in &removed {
            self.detach(item);
        }
        removed.len()
    }

    /// Drop the queue status from the message a removed item delivered.
    fn detach(&self, item: &QueueItem) {
        if let Some(message_id) = &item.message_id {
            if let Err(e) = self
                .conversation
                .set_queue_status(&item.agent_id, message_id, None)
            {
                tracing::debug!(error = %e, queue_id = %item.id, "Queued message no longer in conversation");
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn items(&self) -> Vec<QueueItem> {
        self.lock().clone()
    }

    pub fn get(&self, id: &str) -> Option<QueueItem> {
        self.lock().iter().find(|i| i.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.count(QueueStatus::Pending)
    }

    pub fn failed_count(&self) -> usize {
        self.count(QueueStatus::Failed)
    }

    fn count(&self, status: QueueStatus) -> usize {
        self.lock().iter().filter(|i| i.status == status).count()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }
}

/// Read the persisted queue. Anything unreadable yields an empty queue.
fn load_items(store: &dyn DurableStore, key: &str) -> Vec<QueueItem> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read offline queue, starting empty");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<QueueItem>>(&raw) {
        Ok(mut items) => {
            // Nothing is in flight at startup.
            for item in items.iter_mut() {
                if item.status == QueueStatus::Sending {
                    item.status = QueueStatus::Pending;
                }
            }
            items
        }
        Err(e) => {
            tracing::warn!(error = %e, "Stored offline queue is corrupt, starting empty");
            Vec::new()
        }
    }
}
