//! Tagged messages from the pipeline and executor to the presentation layer.
//!
//! Every cross-task notification is one `AppEvent` on a single unbounded
//! channel; the UI (or a test) drains the receiver. Nothing in the core
//! references a UI toolkit.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::domain::models::{FollowState, ProgressStage, Severity, UserMapping};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AppEvent {
    /// A mapping row was produced by the scrape phase (placeholder, cached
    /// full result, or advisory no-match).
    MappingAdded(UserMapping),
    /// A placeholder row was overwritten by the resolve phase.
    MappingResolved(UserMapping),
    Progress {
        stage: ProgressStage,
        current: usize,
        total: usize,
    },
    FollowProgress {
        row: u64,
        did: String,
        state: FollowState,
    },
    /// Transient per-item status, never halts the run.
    Status {
        message: String,
        severity: Severity,
    },
    /// Unambiguous stop signal, distinct from `Status`.
    Fatal { message: String },
    /// The resolve phase exhausted its list (even if some names never resolved).
    Completed,
}

/// Cloneable sending half shared by pipeline, resolver, and executor.
/// Send failures (receiver dropped) are logged, never propagated.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<AppEvent>,
}

impl EventSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: AppEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!("[EVENT] receiver dropped, event discarded");
        }
    }

    pub fn status(&self, message: impl Into<String>, severity: Severity) {
        self.send(AppEvent::Status {
            message: message.into(),
            severity,
        });
    }

    pub fn fatal(&self, message: impl Into<String>) {
        self.send(AppEvent::Fatal {
            message: message.into(),
        });
    }
}
