//! Actions attached to notifications (e.g. "Retry").

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by a notification action.
pub type ActionFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A labelled, re-runnable async callback.
#[derive(Clone)]
pub struct NotificationAction {
    pub label: String,
    run: Arc<dyn Fn() -> ActionFuture + Send + Sync>,
}

impl NotificationAction {
    pub fn new<F, Fut>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            label: label.into(),
            run: Arc::new(move || Box::pin(f())),
        }
    }

    /// Shorthand for the common "Retry" label.
    pub fn retry<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::new("Retry", f)
    }

    /// Build the action's future. Each call starts a fresh run.
    pub fn invoke(&self) -> ActionFuture {
        (self.run)()
    }
}

impl std::fmt::Debug for NotificationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_action_can_run_repeatedly() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let action = NotificationAction::retry(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        action.invoke().await;
        action.clone().invoke().await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(action.label, "Retry");
    }

    #[test]
    fn test_debug_shows_label() {
        let action = NotificationAction::new("Undo", || async {});
        assert!(format!("{:?}", action).contains("Undo"));
    }
}
