//! Notification center: owns the set of visible notifications and their
//! auto-dismiss timers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use courier_core::config::NotificationConfig;
use courier_core::error::DeliveryError;
use courier_core::events::{ClientEvent, EventBus};
use courier_core::types::{NotificationKind, Timestamp};

use crate::action::{ActionFuture, NotificationAction};
use crate::templates;

/// Identifier of a notification, unique per center.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub u64);

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A visible alert. `duration == None` means it stays until dismissed.
#[derive(Clone, Debug)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub message: String,
    pub timestamp: Timestamp,
    pub duration: Option<Duration>,
    pub action: Option<NotificationAction>,
}

struct Entry {
    notification: Notification,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    config: NotificationConfig,
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
    events: EventBus,
}

impl Inner {
    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        // Entries are only pushed or retained under the lock; never partial.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove(&self, id: NotificationId, cancel_timer: bool) -> bool {
        let removed = {
            let mut entries = self.entries();
            match entries.iter().position(|e| e.notification.id == id) {
                Some(pos) => Some(entries.remove(pos)),
                None => None,
            }
        };

        match removed {
            Some(entry) => {
                if cancel_timer {
                    if let Some(timer) = entry.timer {
                        timer.abort();
                    }
                }
                self.events.publish(ClientEvent::NotificationDismissed {
                    id: id.0,
                    timestamp: Timestamp::now(),
                });
                true
            }
            None => false,
        }
    }
}

/// Shared, cloneable notification surface.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<Inner>,
}

impl NotificationCenter {
    pub fn new(config: NotificationConfig, events: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                next_id: AtomicU64::new(1),
                entries: Mutex::new(Vec::new()),
                events,
            }),
        }
    }

    /// Default auto-dismiss duration for a kind. Errors persist.
    pub fn default_duration(&self, kind: NotificationKind) -> Option<Duration> {
        let cfg = &self.inner.config;
        match kind {
            NotificationKind::Success => Some(Duration::from_millis(cfg.success_ms)),
            NotificationKind::Warning => Some(Duration::from_millis(cfg.warning_ms)),
            NotificationKind::Info => Some(Duration::from_millis(cfg.info_ms)),
            NotificationKind::Error => None,
        }
    }

    /// Show a notification and return its id.
    ///
    /// `duration` overrides the kind's default. The auto-dismiss timer needs
    /// a Tokio runtime; outside one the notification simply persists.
    pub fn notify(
        &self,
        kind: NotificationKind,
        message: impl Into<String>,
        duration: Option<Duration>,
        action: Option<NotificationAction>,
    ) -> NotificationId {
        let id = NotificationId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let duration = duration.or_else(|| self.default_duration(kind));
        let notification = Notification {
            id,
            kind,
            message: message.into(),
            timestamp: Timestamp::now(),
            duration,
            action,
        };

        match kind {
            NotificationKind::Error => {
                tracing::warn!(id = id.0, message = %notification.message, "Error notification")
            }
            _ => tracing::debug!(id = id.0, kind = %kind, message = %notification.message, "Notification"),
        }

        let shown = ClientEvent::NotificationShown {
            id: id.0,
            kind,
            message: notification.message.clone(),
            timestamp: notification.timestamp,
        };

        {
            let mut entries = self.inner.entries();
            let timer = duration.and_then(|d| self.spawn_timer(id, d));
            entries.push(Entry {
                notification,
                timer,
            });
        }

        self.inner.events.publish(shown);
        id
    }

    fn spawn_timer(&self, id: NotificationId, after: Duration) -> Option<JoinHandle<()>> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(_) => {
                tracing::warn!(id = id.0, "No async runtime; notification will not auto-dismiss");
                return None;
            }
        };
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        Some(handle.spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(inner) = weak.upgrade() {
                inner.remove(id, false);
            }
        }))
    }

    /// Remove a notification. Returns `false` if it was already gone, which
    /// makes repeated dismissal a harmless no-op.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        self.inner.remove(id, true)
    }

    /// Remove every visible notification.
    pub fn dismiss_all(&self) -> usize {
        let ids: Vec<NotificationId> = self
            .inner
            .entries()
            .iter()
            .map(|e| e.notification.id)
            .collect();
        ids.into_iter().filter(|id| self.dismiss(*id)).count()
    }

    pub fn get(&self, id: NotificationId) -> Option<Notification> {
        self.inner
            .entries()
            .iter()
            .find(|e| e.notification.id == id)
            .map(|e| e.notification.clone())
    }

    /// Currently visible notifications, oldest first.
    pub fn active(&self) -> Vec<Notification> {
        self.inner
            .entries()
            .iter()
            .map(|e| e.notification.clone())
            .collect()
    }

    /// Dismiss the notification and hand back its action's future, if it
    /// had one.
    pub fn take_action(&self, id: NotificationId) -> Option<ActionFuture> {
        let action = self.get(id)?.action?;
        self.dismiss(id);
        Some(action.invoke())
    }

    /// Run a notification's action to completion. Returns whether one ran.
    pub async fn trigger_action(&self, id: NotificationId) -> bool {
        match self.take_action(id) {
            Some(fut) => {
                fut.await;
                true
            }
            None => false,
        }
    }

    // -- Convenience constructors --

    pub fn info(&self, message: impl Into<String>) -> NotificationId {
        self.notify(NotificationKind::Info, message, None, None)
    }

    pub fn success(&self, message: impl Into<String>) -> NotificationId {
        self.notify(NotificationKind::Success, message, None, None)
    }

    pub fn warning(&self, message: impl Into<String>) -> NotificationId {
        self.notify(NotificationKind::Warning, message, None, None)
    }

    pub fn error(
        &self,
        message: impl Into<String>,
        action: Option<NotificationAction>,
    ) -> NotificationId {
        self.notify(NotificationKind::Error, message, None, action)
    }

    /// Surface a delivery failure using its canonical copy.
    pub fn notify_error(
        &self,
        error: &DeliveryError,
        action: Option<NotificationAction>,
    ) -> NotificationId {
        let action = if error.is_user_retryable() { action } else { None };
        self.error(templates::describe(error), action)
    }
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("active", &self.inner.entries().len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
