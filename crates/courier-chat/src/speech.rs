//! Spoken playback of agent replies, and the text-only fallback.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use courier_core::config::SpeechConfig;
use courier_core::events::{ClientEvent, EventBus};
use courier_core::types::Timestamp;
use courier_notify::{templates, NotificationCenter};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SpeechError(pub String);

/// Anything that can voice a reply.
#[async_trait]
pub trait SpeechSink: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str, language: &str)
        -> Result<(), SpeechError>;
}

/// Where and how to speak a reply.
#[derive(Clone)]
pub struct SpeechTarget {
    pub sink: Arc<dyn SpeechSink>,
    pub voice_id: String,
    pub language: String,
}

impl SpeechTarget {
    pub fn new(sink: Arc<dyn SpeechSink>, voice_id: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            sink,
            voice_id: voice_id.into(),
            language: language.into(),
        }
    }

    /// Target using the configured default voice.
    pub fn with_defaults(sink: Arc<dyn SpeechSink>, config: &SpeechConfig) -> Self {
        Self::new(sink, config.voice_id.clone(), config.language.clone())
    }
}

impl std::fmt::Debug for SpeechTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechTarget")
            .field("voice_id", &self.voice_id)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

/// Counts consecutive synthesis failures and flips to text-only mode once
/// the threshold is hit. Speech failures never surface as errors.
pub struct SpeechGuard {
    threshold: u32,
    consecutive_failures: AtomicU32,
    text_only: AtomicBool,
    notifications: NotificationCenter,
    events: EventBus,
}

impl SpeechGuard {
    pub fn new(config: &SpeechConfig, notifications: NotificationCenter, events: EventBus) -> Self {
        Self {
            threshold: config.failure_threshold.max(1),
            consecutive_failures: AtomicU32::new(0),
            text_only: AtomicBool::new(false),
            notifications,
            events,
        }
    }

    pub fn is_text_only(&self) -> bool {
        self.text_only.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Returns `true` if this failure switched speech off.
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures < self.threshold || self.text_only.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::warn!(failures, "Speech keeps failing, switching to text-only mode");
        self.notifications.info(templates::text_only_enabled());
        self.events.publish(ClientEvent::TextOnlyModeChanged {
            enabled: true,
            timestamp: Timestamp::now(),
        });
        true
    }

    /// Re-enable speech after the user asks for it back.
    pub fn restore(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        if self.text_only.swap(false, Ordering::SeqCst) {
            tracing::info!("Speech restored");
            self.events.publish(ClientEvent::TextOnlyModeChanged {
                enabled: false,
                timestamp: Timestamp::now(),
            });
        }
    }

    /// Voice `text` through `target` unless text-only mode is on.
    pub async fn speak(&self, target: &SpeechTarget, text: &str) {
        if self.is_text_only() {
            tracing::debug!("Text-only mode, skipping speech");
            return;
        }
        match target
            .sink
            .synthesize(text, &target.voice_id, &target.language)
            .await
        {
            Ok(()) => self.record_success(),
            Err(e) => {
                tracing::warn!(error = %e, voice = %target.voice_id, "Speech synthesis failed");
                self.record_failure();
            }
        }
    }
}

// =============================================================================
// Mock implementation
// =============================================================================

/// Sink that records what it was asked to say and can be told to fail.
#[derive(Debug, Default)]
pub struct MockSpeechSink {
    failing: AtomicBool,
    spoken: Mutex<Vec<String>>,
}

impl MockSpeechSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Texts successfully spoken.
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SpeechSink for MockSpeechSink {
    async fn synthesize(&self, text: &str, _voice_id: &str, _language: &str) -> Result<(), SpeechError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SpeechError("synthesizer unavailable".into()));
        }
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push(text.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::config::NotificationConfig;
    use courier_core::types::NotificationKind;

    fn guard(bus: &EventBus) -> (SpeechGuard, NotificationCenter) {
        let center = NotificationCenter::new(NotificationConfig::default(), bus.clone());
        let guard = SpeechGuard::new(&SpeechConfig::default(), center.clone(), bus.clone());
        (guard, center)
    }

    #[test]
    fn test_threshold_enters_text_only_once() {
        let bus = EventBus::new();
        let (guard, center) = guard(&bus);

        assert!(!guard.record_failure());
        assert!(!guard.record_failure());
        assert!(guard.record_failure());
        assert!(guard.is_text_only());
        assert!(!guard.record_failure());

        let infos = center
            .active()
            .into_iter()
            .filter(|n| n.kind == NotificationKind::Info)
            .count();
        assert_eq!(infos, 1);
    }

    #[test]
    fn test_success_resets_counter() {
        let bus = EventBus::new();
        let (guard, _) = guard(&bus);

        guard.record_failure();
        guard.record_failure();
        guard.record_success();
        assert_eq!(guard.consecutive_failures(), 0);
        assert!(!guard.record_failure());
        assert!(!guard.is_text_only());
    }

    #[test]
    fn test_restore_leaves_text_only() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let (guard, _) = guard(&bus);

        for _ in 0..3 {
            guard.record_failure();
        }
        guard.restore();
        assert!(!guard.is_text_only());
        assert_eq!(guard.consecutive_failures(), 0);

        let toggles: Vec<bool> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|e| match e {
                ClientEvent::TextOnlyModeChanged { enabled, .. } => Some(enabled),
                _ => None,
            })
            .collect();
        assert_eq!(toggles, vec![true, false]);
    }

    #[tokio::test]
    async fn test_speak_skips_in_text_only_mode() {
        let bus = EventBus::new();
        let (guard, _) = guard(&bus);
        let sink = Arc::new(MockSpeechSink::new());
        let target = SpeechTarget::with_defaults(sink.clone(), &SpeechConfig::default());

        sink.set_failing(true);
        for _ in 0..3 {
            guard.speak(&target, "hello").await;
        }
        assert!(guard.is_text_only());

        sink.set_failing(false);
        guard.speak(&target, "ignored").await;
        assert!(sink.spoken().is_empty());

        guard.restore();
        guard.speak(&target, "back").await;
        assert_eq!(sink.spoken(), vec!["back".to_string()]);
    }
}
