//! Observability port.
//!
//! `Session` and `TaskWatcher` report what they do through an [`EventSink`]
//! handed to their constructors; nothing in this crate installs or reads a
//! process-wide logger. [`TracingSink`] is the usual production choice.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Something that happened during a session or a task wait.
///
/// No variant carries credentials.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Connecting { endpoint: String, verify_tls: bool },
    Connected { endpoint: String, user: Option<String>, at: DateTime<Utc> },
    ConnectFailed { endpoint: String, reason: String },
    Disconnected { endpoint: String },
    LogoutFailed { endpoint: String, reason: String },
    TaskPolled { task: String, state: String, elapsed: Duration },
    TaskFinished { task: String, succeeded: bool, elapsed: Duration },
    TaskTimedOut { task: String, timeout: Duration },
}

/// Receiver for [`LifecycleEvent`]s.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &LifecycleEvent);
}

/// Shared sink handle.
pub type SharedSink = Arc<dyn EventSink>;

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::Connecting { endpoint, verify_tls } => {
                tracing::info!(%endpoint, verify_tls, "Connecting to vSphere endpoint");
                if !verify_tls {
                    tracing::warn!(%endpoint, "TLS peer verification is disabled");
                }
            }
            LifecycleEvent::Connected { endpoint, user, at } => {
                tracing::info!(
                    %endpoint,
                    user = user.as_deref().unwrap_or("-"),
                    connected_at = %at.to_rfc3339(),
                    "Connected"
                );
            }
            LifecycleEvent::ConnectFailed { endpoint, reason } => {
                tracing::error!(%endpoint, %reason, "Connection failed");
            }
            LifecycleEvent::Disconnected { endpoint } => {
                tracing::info!(%endpoint, "Disconnected");
            }
            LifecycleEvent::LogoutFailed { endpoint, reason } => {
                tracing::warn!(%endpoint, %reason, "Logout failed; local session cleared");
            }
            LifecycleEvent::TaskPolled { task, state, elapsed } => {
                tracing::debug!(%task, %state, elapsed_ms = elapsed.as_millis() as u64, "Task polled");
            }
            LifecycleEvent::TaskFinished { task, succeeded, elapsed } => {
                if *succeeded {
                    tracing::info!(%task, elapsed_ms = elapsed.as_millis() as u64, "Task succeeded");
                } else {
                    tracing::error!(%task, elapsed_ms = elapsed.as_millis() as u64, "Task failed");
                }
            }
            LifecycleEvent::TaskTimedOut { task, timeout } => {
                tracing::warn!(%task, timeout_secs = timeout.as_secs_f64(), "Task still running at deadline");
            }
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &LifecycleEvent) {}
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &LifecycleEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
