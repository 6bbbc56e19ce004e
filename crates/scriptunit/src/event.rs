use std::sync::{Arc, PoisonError, RwLock};

use crossbeam_channel::{Receiver, Sender};

use crate::{LineNo, error::ScriptError, state::ExecutionState};

/// Published on every state transition of a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct StateEvent {
    pub unit: Arc<str>,
    pub state: ExecutionState,
    /// Set only for the transition into `Error`.
    pub error: Option<ScriptError>,
}

/// Published whenever the worker reaches a new source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub unit: Arc<str>,
    pub line: LineNo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnitEvent {
    State(StateEvent),
    Progress(ProgressEvent),
}

/// Observer of a unit's events.
///
/// Called synchronously on whichever thread raised the event, which is the
/// worker for everything but `Ready`, `Running` and the construction-time
/// events. State events of a unit are delivered one at a time in transition
/// order. Calling `run`, `execute` or `reset` on the same unit from inside a
/// state callback deadlocks.
pub trait EventSink: Send + Sync {
    fn on_state(&self, _event: &StateEvent) {}

    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Forwards events into a crossbeam channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<UnitEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<UnitEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { sender: tx }, rx)
    }

    fn send(&self, event: UnitEvent) {
        if self.sender.send(event).is_err() {
            tracing::debug!("event receiver dropped, event discarded");
        }
    }
}

impl EventSink for ChannelSink {
    fn on_state(&self, event: &StateEvent) {
        self.send(UnitEvent::State(event.clone()));
    }

    fn on_progress(&self, event: &ProgressEvent) {
        self.send(UnitEvent::Progress(event.clone()));
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_state(&self, event: &StateEvent) {
        match &event.error {
            Some(error) => tracing::warn!(unit = %event.unit, state = %event.state, %error, "state changed"),
            None => tracing::info!(unit = %event.unit, state = %event.state, "state changed"),
        }
    }

    fn on_progress(&self, event: &ProgressEvent) {
        tracing::trace!(unit = %event.unit, line = event.line, "progress");
    }
}

#[derive(Default)]
pub(crate) struct Publisher {
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

impl Publisher {
    pub(crate) fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().unwrap_or_else(PoisonError::into_inner).push(sink);
    }

    pub(crate) fn state(&self, event: StateEvent) {
        for sink in self.sinks() {
            sink.on_state(&event);
        }
    }

    pub(crate) fn progress(&self, event: ProgressEvent) {
        for sink in self.sinks() {
            sink.on_progress(&event);
        }
    }

    // Sinks are called outside the lock so a callback may subscribe.
    fn sinks(&self) -> Vec<Arc<dyn EventSink>> {
        self.sinks.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
