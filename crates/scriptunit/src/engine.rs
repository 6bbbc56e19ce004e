//! The seam between the controller and a concrete scripting capability.
//!
//! A capability compiles a [`Script`] into its own unit type once, then runs
//! that unit synchronously on the worker thread as many times as the host asks.
//! Before every statement it reports the current source line to the installed
//! [`LineProbe`] and unwinds with [`ExecError::Aborted`] when the probe answers
//! [`Flow::Abort`].
use std::{fmt, path::PathBuf, sync::Arc, thread, time::Duration};

use crate::{
    LineNo,
    error::{CompileError, ExecError},
    script::Script,
    value::Value,
};

/// Answer of the probe and of the control builtins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Leave the script body through the abort path.
    Abort,
}

impl Flow {
    pub fn is_abort(self) -> bool {
        matches!(self, Flow::Abort)
    }
}

/// How a probe call relates to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Execution arrived at the line, including a loop jumping back to it.
    New,
    /// Another report for the statement already being executed.
    Same,
}

impl Visit {
    pub fn is_new(self) -> bool {
        matches!(self, Visit::New)
    }
}

/// Per-statement callback. May block the calling thread while the unit is stopped.
///
/// Progress events and breakpoints are driven by [`Visit::New`] calls only.
pub trait LineProbe: Send + Sync {
    fn on_line(&self, line: LineNo, visit: Visit) -> Flow;
}

/// Controls reachable from inside a running script.
pub trait ScriptControl: Send + Sync {
    /// Turns a pending break request into a break at the next statement.
    fn allow_break(&self) -> Flow;

    /// Stops at the next statement regardless of breakpoints.
    fn break_now(&self);

    fn abort_requested(&self) -> bool;

    /// Blocks the worker, returning early with [`Flow::Abort`] on abort.
    fn sleep(&self, duration: Duration) -> Flow;
}

/// Cloneable handle to the [`ScriptControl`] of the unit that started the run.
#[derive(Clone, Default)]
pub struct ControlHandle(Option<Arc<dyn ScriptControl>>);

impl ControlHandle {
    pub fn new(control: Arc<dyn ScriptControl>) -> Self {
        Self(Some(control))
    }

    /// A handle that belongs to no unit: breaks are ignored and nothing aborts.
    pub fn detached() -> Self {
        Self(None)
    }

    pub fn allow_break(&self) -> Flow {
        self.0.as_ref().map_or(Flow::Continue, |control| control.allow_break())
    }

    pub fn request_break_now(&self) {
        if let Some(control) = &self.0 {
            control.break_now();
        }
    }

    pub fn abort_requested(&self) -> bool {
        self.0.as_ref().is_some_and(|control| control.abort_requested())
    }

    pub fn sleep(&self, duration: Duration) -> Flow {
        match &self.0 {
            Some(control) => control.sleep(duration),
            None => {
                thread::sleep(duration);
                Flow::Continue
            }
        }
    }
}

impl fmt::Debug for ControlHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ControlHandle")
            .field(&if self.0.is_some() { "attached" } else { "detached" })
            .finish()
    }
}

/// Everything a capability needs for one execution.
#[derive(Default)]
pub struct ExecContext {
    /// Applied to the global namespace in order before the body runs.
    pub bindings: Vec<(String, Value)>,
    /// Module search directories, most specific first.
    pub search_paths: Vec<PathBuf>,
    /// `None` when the unit runs without debugging.
    pub probe: Option<Arc<dyn LineProbe>>,
    pub control: ControlHandle,
}

impl ExecContext {
    /// Reports `line` to the probe, if any.
    pub fn on_line(&self, line: LineNo, visit: Visit) -> Flow {
        self.probe
            .as_ref()
            .map_or(Flow::Continue, |probe| probe.on_line(line, visit))
    }
}

impl fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecContext")
            .field("bindings", &self.bindings)
            .field("search_paths", &self.search_paths)
            .field("probe", &self.probe.is_some())
            .field("control", &self.control)
            .finish()
    }
}

pub trait ScriptEngine: Send + Sync + 'static {
    type Unit: Send + Sync + 'static;

    fn compile(&self, script: &Script) -> Result<Self::Unit, CompileError>;

    /// Runs `unit` to completion on the calling thread.
    fn execute(&self, unit: &Self::Unit, context: ExecContext) -> Result<Value, ExecError>;
}
