//! Cooldown and severity-change gate in front of the notification sink

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::channels::NotificationSink;
use super::payload::build_payload;
use super::{Notification, OfferOutcome};
use crate::detection::Severity;
use crate::error::NodewatchError;
use crate::metrics;

/// Minimum interval between repeats of the same notification key
pub const DEFAULT_COOLDOWN_SECS: i64 = 600;

/// Dedup state for one base key (`node:item`)
#[derive(Debug, Default)]
struct KeyState {
    last_severity: Option<Severity>,
    /// Last send time per notification key under this base key
    last_sent: HashMap<String, i64>,
}

/// Decides which verdicts reach the sink and dispatches them
///
/// State is sharded per base key. The decision and the state commit for an
/// offer happen while holding that key's shard entry, so two concurrent
/// offers for the same key can never both pass the cooldown check. State is
/// committed before the send starts; a failed send does not roll it back.
pub struct NotificationDeduplicator {
    cooldown_secs: i64,
    sink: Arc<dyn NotificationSink>,
    states: DashMap<String, KeyState>,
    shutting_down: AtomicBool,
}

impl NotificationDeduplicator {
    /// Create a deduplicator with the default 600s cooldown
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self::with_cooldown(sink, DEFAULT_COOLDOWN_SECS)
    }

    pub fn with_cooldown(sink: Arc<dyn NotificationSink>, cooldown_secs: i64) -> Self {
        Self {
            cooldown_secs,
            sink,
            states: DashMap::new(),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn cooldown_secs(&self) -> i64 {
        self.cooldown_secs
    }

    /// Offer a notification using the current wall clock
    pub fn offer(&self, notification: Notification) -> OfferOutcome {
        self.offer_at(notification, Utc::now().timestamp())
    }

    /// Offer a notification as of `now` (unix seconds)
    ///
    /// Never blocks on delivery. A dispatched notification is sent on a
    /// background task; its result only affects logs and counters.
    pub fn offer_at(&self, notification: Notification, now: i64) -> OfferOutcome {
        let outcome = self.decide(&notification, now);
        metrics::record_notification(notification.data_type.as_str(), outcome.as_str());

        if outcome.is_dispatched() {
            metrics::update_tracked_keys(self.states.len());
            self.dispatch(&notification, now);
        }

        outcome
    }

    fn decide(&self, notification: &Notification, now: i64) -> OfferOutcome {
        if self.is_shutting_down() {
            tracing::debug!(
                key = %notification.base_key(),
                "Shutdown in progress, dropping notification"
            );
            return OfferOutcome::ShuttingDown;
        }

        if notification.severity == Severity::Normal {
            return OfferOutcome::Normal;
        }

        let notification_key = notification.notification_key();
        let mut state = self.states.entry(notification.base_key()).or_default();

        let severity_changed = state
            .last_severity
            .is_some_and(|last| last != notification.severity);

        if severity_changed {
            tracing::info!(
                key = %notification.base_key(),
                from = ?state.last_severity,
                to = %notification.severity,
                "Severity changed, bypassing cooldown"
            );
        } else if let Some(&last_sent) = state.last_sent.get(&notification_key) {
            let elapsed = now - last_sent;
            if elapsed < self.cooldown_secs {
                let remaining_secs = self.cooldown_secs - elapsed;
                tracing::debug!(
                    key = %notification_key,
                    remaining_secs,
                    "Duplicate notification suppressed"
                );
                return OfferOutcome::Suppressed { remaining_secs };
            }
        }

        state.last_sent.insert(notification_key, now);
        state.last_severity = Some(notification.severity);

        OfferOutcome::Dispatched
    }

    fn dispatch(&self, notification: &Notification, now: i64) {
        let payload = build_payload(notification, now);
        let key = notification.notification_key();

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(key = %key, "No async runtime available, notification not sent");
                metrics::record_sink_failure("runtime");
                return;
            }
        };

        let sink = Arc::clone(&self.sink);
        runtime.spawn(async move {
            let _timer = metrics::start_delivery_timer(sink.name());
            match sink.deliver(&payload).await {
                Ok(status) => {
                    tracing::info!(key = %key, attempts = status.attempts, "{status}");
                }
                Err(e) => {
                    tracing::warn!(
                        key = %key,
                        sink = sink.name(),
                        reason = e.reason(),
                        category = %e.category(),
                        recoverable = e.is_recoverable(),
                        "Notification delivery failed: {e}"
                    );
                    metrics::record_sink_failure(e.reason());
                }
            }
        });
    }

    /// Stop initiating new sends; one-way and idempotent
    pub fn shutdown(&self) {
        if !self.shutting_down.swap(true, Ordering::SeqCst) {
            tracing::info!("Notification deduplicator shutting down");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Number of base keys with recorded state
    pub fn tracked_keys(&self) -> usize {
        self.states.len()
    }

    /// Last severity sent for a base key
    pub fn last_severity(&self, base_key: &str) -> Option<Severity> {
        self.states.get(base_key).and_then(|s| s.last_severity)
    }
}

impl std::fmt::Debug for NotificationDeduplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDeduplicator")
            .field("cooldown_secs", &self.cooldown_secs)
            .field("sink", &self.sink.name())
            .field("tracked_keys", &self.states.len())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}
