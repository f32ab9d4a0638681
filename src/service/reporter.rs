//! Per-stage progress sink.
//!
//! Passive: the pipeline and executor push (current, total) tuples; the
//! presentation layer reads the latest value per stage or watches the
//! emitted `Progress` events. `total == 0` means indeterminate.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::models::{ProgressCounters, ProgressStage};
use crate::event::{AppEvent, EventSender};

pub struct ProgressReporter {
    counters: Mutex<HashMap<ProgressStage, ProgressCounters>>,
    events: EventSender,
}

impl ProgressReporter {
    pub fn new(events: EventSender) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Stage start: counters reset to zero against the stage's total.
    pub fn reset(&self, stage: ProgressStage, total: usize) {
        self.update(stage, 0, total);
    }

    pub fn update(&self, stage: ProgressStage, current: usize, total: usize) {
        self.counters
            .lock()
            .expect("progress lock poisoned")
            .insert(stage, ProgressCounters { current, total });
        self.events.send(AppEvent::Progress {
            stage,
            current,
            total,
        });
    }

    /// Latest counters for a stage; a stage never started is indeterminate.
    pub fn counters(&self, stage: ProgressStage) -> ProgressCounters {
        self.counters
            .lock()
            .expect("progress lock poisoned")
            .get(&stage)
            .copied()
            .unwrap_or_default()
    }
}
