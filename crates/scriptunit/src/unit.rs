use std::{
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::Receiver;

use crate::{
    LineNo,
    binding::Bindings,
    breakpoint::Breakpoints,
    engine::{ControlHandle, ExecContext, Flow, LineProbe, ScriptControl, ScriptEngine, Visit},
    error::{Error, ExecError, Result, ScriptError},
    event::{ChannelSink, EventSink, ProgressEvent, Publisher, StateEvent, UnitEvent},
    handle::RunHandle,
    script::Script,
    signal::{Signals, Wake},
    state::ExecutionState,
    value::Value,
};

/// Execution controller for one compiled script.
///
/// The unit owns the compiled body, the control signals, the breakpoint
/// registry and the binding table. `run` and `execute` hand the body to a
/// dedicated worker thread; every other method may be called from the control
/// thread while that worker runs.
pub struct ScriptUnit<E: ScriptEngine> {
    core: Arc<Core<E>>,
}

/// Configures and compiles a [`ScriptUnit`].
pub struct ScriptUnitBuilder<E: ScriptEngine> {
    engine: E,
    script: Script,
    debug: bool,
    sinks: Vec<Arc<dyn EventSink>>,
    bindings: Vec<(String, Value)>,
    search_paths: Vec<PathBuf>,
    breakpoints: Vec<LineNo>,
}

impl<E: ScriptEngine> ScriptUnitBuilder<E> {
    /// Installs the line probe on every run. Enabled by default.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Registers a sink before compilation so it also sees the construction events.
    pub fn subscribe(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.push((name.into(), value.into()));
        self
    }

    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn breakpoint(mut self, line: LineNo) -> Self {
        self.breakpoints.push(line);
        self
    }

    /// Compiles the script.
    ///
    /// On a compile error the sinks receive an `Error` state event and the error
    /// is returned; no unit exists that could be run.
    pub fn build(self) -> Result<ScriptUnit<E>> {
        let name: Arc<str> = Arc::from(self.script.name());
        let publisher = Publisher::default();
        for sink in self.sinks {
            publisher.subscribe(sink);
        }

        let compiled = match self.engine.compile(&self.script) {
            Ok(compiled) => compiled,
            Err(err) => {
                tracing::warn!(unit = %name, error = %err, "compilation failed");
                publisher.state(StateEvent {
                    unit: Arc::clone(&name),
                    state: ExecutionState::Error,
                    error: Some(ScriptError {
                        message: err.message.clone(),
                        line: err.line,
                    }),
                });
                return Err(err.into());
            }
        };

        let bindings = Bindings::new();
        bindings.merge(self.bindings);
        let breakpoints = Breakpoints::new();
        for line in self.breakpoints {
            breakpoints.insert(line);
        }

        let core = Core {
            name,
            script: self.script,
            engine: self.engine,
            compiled,
            debug: self.debug,
            status: Mutex::new(Status {
                state: ExecutionState::Ready,
                last_error: None,
            }),
            signals: Arc::new(Signals::new()),
            breakpoints,
            bindings,
            search_paths: RwLock::new(Vec::new()),
            last_line: Mutex::new(None),
            transition: Mutex::new(()),
            aborting: AtomicBool::new(false),
            publisher,
        };
        core.append_search_paths(self.search_paths);

        tracing::debug!(unit = %core.name, debug = core.debug, "compiled");
        core.publish_state(ExecutionState::Ready, None);

        Ok(ScriptUnit { core: Arc::new(core) })
    }
}

impl<E: ScriptEngine> ScriptUnit<E> {
    pub fn builder(engine: E, script: Script) -> ScriptUnitBuilder<E> {
        ScriptUnitBuilder {
            engine,
            script,
            debug: true,
            sinks: Vec::new(),
            bindings: Vec::new(),
            search_paths: Vec::new(),
            breakpoints: Vec::new(),
        }
    }

    /// Compiles `script` with debugging enabled and no sinks.
    pub fn new(engine: E, script: Script) -> Result<Self> {
        Self::builder(engine, script).build()
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn script(&self) -> &Script {
        &self.core.script
    }

    pub fn state(&self) -> ExecutionState {
        self.core.status().state
    }

    /// Runtime error of the last run, cleared when the next run starts.
    pub fn last_error(&self) -> Option<ScriptError> {
        self.core.status().last_error.clone()
    }

    /// Last line reported by the probe during the current or last run.
    pub fn current_line(&self) -> Option<LineNo> {
        *self.core.last_line()
    }

    pub fn is_busy(&self) -> bool {
        self.state().is_busy()
    }

    pub fn is_debug_enabled(&self) -> bool {
        self.core.debug
    }

    /// Starts the body on a worker thread.
    ///
    /// Aborts and runtime errors end the run in `Aborted` or `Error` and are
    /// reported through [`last_error`](Self::last_error) and the state events;
    /// the handle only fails when the worker panicked.
    pub fn run(&self) -> Result<RunHandle<()>> {
        self.start("run", false, |outcome| match outcome {
            Err(Error::WorkerPanicked) => Err(Error::WorkerPanicked),
            _ => Ok(()),
        })
    }

    /// Like [`run`](Self::run), but resets a finished unit first and hands the
    /// body's result, abort or runtime error to the caller.
    ///
    /// The implicit reset discards the previous run's last error.
    pub fn execute(&self) -> Result<RunHandle<Value>> {
        self.start("execute", true, |outcome| outcome)
    }

    /// Returns a finished unit to `Ready`, dropping pending break requests.
    pub fn reset(&self) -> Result<()> {
        let _transition = self.core.transition();
        let mut status = self.core.status();
        if status.state.is_busy() {
            return Err(Error::InvalidState {
                operation: "reset",
                state: status.state,
            });
        }

        self.core.signals.clear_breaks();
        status.state = ExecutionState::Ready;
        drop(status);

        tracing::debug!(unit = %self.core.name, "reset");
        self.core.publish_state(ExecutionState::Ready, None);
        Ok(())
    }

    /// Asks the worker to unwind. Takes effect at the next statement boundary,
    /// or immediately when the worker is stopped.
    pub fn abort(&self) {
        tracing::debug!(unit = %self.core.name, "abort requested");
        self.core.signals.abort();
    }

    pub fn resume(&self) {
        tracing::debug!(unit = %self.core.name, "resume requested");
        self.core.signals.resume();
    }

    /// Stops at the next statement boundary regardless of breakpoints.
    pub fn break_now(&self) {
        tracing::debug!(unit = %self.core.name, "break requested");
        self.core.signals.brk();
    }

    /// Marks a soft break as pending until the script calls `allow_break`.
    pub fn request_break(&self) {
        self.core.signals.request_break();
    }

    pub fn allow_break(&self) {
        self.core.signals.allow_break();
    }

    /// A cloneable handle to the control signals, for use from event sinks and
    /// other threads.
    pub fn controls(&self) -> UnitControls {
        UnitControls(Arc::clone(&self.core.signals))
    }

    pub fn set_breakpoint(&self, line: LineNo) -> bool {
        self.core.breakpoints.insert(line)
    }

    pub fn clear_breakpoint(&self, line: LineNo) -> bool {
        self.core.breakpoints.remove(line)
    }

    pub fn clear_all_breakpoints(&self) {
        self.core.breakpoints.clear();
    }

    pub fn breakpoints(&self) -> Vec<LineNo> {
        self.core.breakpoints.lines()
    }

    /// Binds `name` in the script namespace, effective from the next run.
    pub fn append_global(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.core.bindings.set(name, value);
    }

    pub fn append_globals<I, K, V>(&self, globals: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.core.bindings.merge(globals);
    }

    pub fn globals(&self) -> Vec<(String, Value)> {
        self.core.bindings.snapshot()
    }

    pub fn append_search_paths<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.core.append_search_paths(paths);
    }

    /// Module search paths applied to the next run, the script's own directory first.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.core.search_paths()
    }

    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.core.publisher.subscribe(sink);
    }

    /// Subscribes a channel and returns its receiving end.
    pub fn events(&self) -> Receiver<UnitEvent> {
        let (sink, rx) = ChannelSink::new();
        self.subscribe(Arc::new(sink));
        rx
    }

    fn start<T, F>(&self, operation: &'static str, reset_first: bool, conclude: F) -> Result<RunHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(Result<Value>) -> Result<T> + Send + 'static,
    {
        let core = &self.core;
        // Held until `Running` is published; the worker waits on it before its first event.
        let transition = core.transition();
        let mut status = core.status();
        let previous = status.state;
        let accepted = previous == ExecutionState::Ready || (reset_first && previous.is_terminal());
        if !accepted {
            return Err(Error::InvalidState {
                operation,
                state: previous,
            });
        }

        core.signals.clear_all();
        core.aborting.store(false, Ordering::SeqCst);
        *core.last_line() = None;
        let previous_error = status.last_error.take();
        status.state = ExecutionState::Running;
        drop(status);

        let context = core.exec_context();
        let bindings = context.bindings.len();
        let worker = Arc::clone(core);
        let spawned = thread::Builder::new()
            .name(format!("scriptunit-{}", core.name))
            .spawn(move || {
                drop(worker.transition());
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    let result = worker.engine.execute(&worker.compiled, context);
                    worker.finish(result)
                }))
                .unwrap_or_else(|_| worker.panicked());
                conclude(outcome)
            });

        let inner = match spawned {
            Ok(inner) => inner,
            Err(err) => {
                tracing::error!(unit = %core.name, error = %err, "failed to spawn worker");
                let mut status = core.status();
                status.state = previous;
                status.last_error = previous_error;
                return Err(Error::Spawn(err));
            }
        };

        if previous != ExecutionState::Ready {
            tracing::debug!(unit = %core.name, from = %previous, "reset before execute");
            core.publish_state(ExecutionState::Ready, None);
        }
        tracing::info!(unit = %core.name, operation, bindings, "run started");
        core.publish_state(ExecutionState::Running, None);
        drop(transition);

        Ok(RunHandle::new(Arc::clone(&core.name), inner))
    }
}

impl<E: ScriptEngine> Drop for ScriptUnit<E> {
    fn drop(&mut self) {
        // A parked worker would otherwise wait forever.
        if self.is_busy() {
            tracing::debug!(unit = %self.core.name, "unit dropped while busy, aborting");
            self.core.signals.abort();
        }
    }
}

impl<E: ScriptEngine> std::fmt::Debug for ScriptUnit<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptUnit")
            .field("name", &self.core.name)
            .field("state", &self.state())
            .field("debug", &self.core.debug)
            .finish()
    }
}

/// Control-only view of a unit.
#[derive(Debug, Clone)]
pub struct UnitControls(Arc<Signals>);

impl UnitControls {
    pub fn abort(&self) {
        self.0.abort();
    }

    pub fn resume(&self) {
        self.0.resume();
    }

    pub fn break_now(&self) {
        self.0.brk();
    }

    pub fn request_break(&self) {
        self.0.request_break();
    }

    pub fn allow_break(&self) {
        self.0.allow_break();
    }
}

#[derive(Debug)]
struct Status {
    state: ExecutionState,
    last_error: Option<ScriptError>,
}

struct Core<E: ScriptEngine> {
    name: Arc<str>,
    script: Script,
    engine: E,
    compiled: E::Unit,
    debug: bool,
    status: Mutex<Status>,
    signals: Arc<Signals>,
    breakpoints: Breakpoints,
    bindings: Bindings,
    search_paths: RwLock<Vec<PathBuf>>,
    last_line: Mutex<Option<LineNo>>,
    // Serializes a state change with the publication of its event.
    transition: Mutex<()>,
    // Aborting has been published for the current run.
    aborting: AtomicBool,
    publisher: Publisher,
}

impl<E: ScriptEngine> Core<E> {
    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn last_line(&self) -> MutexGuard<'_, Option<LineNo>> {
        self.last_line.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn search_paths(&self) -> Vec<PathBuf> {
        let appended = self.search_paths.read().unwrap_or_else(PoisonError::into_inner);
        let mut paths: Vec<PathBuf> = Vec::with_capacity(appended.len() + 1);
        for path in self.script.directory().map(PathBuf::from).into_iter().chain(appended.iter().cloned()) {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }

    fn append_search_paths<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut current = self.search_paths.write().unwrap_or_else(PoisonError::into_inner);
        for path in paths {
            let path = path.into();
            if !current.contains(&path) {
                current.push(path);
            }
        }
    }

    fn exec_context(self: &Arc<Self>) -> ExecContext {
        ExecContext {
            bindings: self.bindings.snapshot(),
            search_paths: self.search_paths(),
            probe: self.debug.then(|| Arc::clone(self) as Arc<dyn LineProbe>),
            control: ControlHandle::new(Arc::clone(self) as Arc<dyn ScriptControl>),
        }
    }

    fn publish_state(&self, state: ExecutionState, error: Option<ScriptError>) {
        self.publisher.state(StateEvent {
            unit: Arc::clone(&self.name),
            state,
            error,
        });
    }

    fn set_state(&self, state: ExecutionState, error: Option<ScriptError>) {
        let _transition = self.transition();
        {
            let mut status = self.status();
            status.state = state;
            if error.is_some() {
                status.last_error.clone_from(&error);
            }
        }
        tracing::debug!(unit = %self.name, %state, "state changed");
        self.publish_state(state, error);
    }

    /// Publishes `Aborting` once per run and tells the capability to unwind.
    fn enter_abort(&self) -> Flow {
        if !self.aborting.swap(true, Ordering::SeqCst) {
            self.signals.clear_breaks();
            self.set_state(ExecutionState::Aborting, None);
        }
        Flow::Abort
    }

    fn finish(&self, result: Result<Value, ExecError>) -> Result<Value> {
        match result {
            Ok(value) if !self.aborting.load(Ordering::SeqCst) => {
                tracing::info!(unit = %self.name, "run finished");
                self.set_state(ExecutionState::Done, None);
                Ok(value)
            }
            Ok(_) | Err(ExecError::Aborted) => {
                self.enter_abort();
                self.signals.take_abort();
                tracing::info!(unit = %self.name, "run aborted");
                self.set_state(ExecutionState::Aborted, None);
                Err(Error::Aborted)
            }
            Err(ExecError::Runtime(err)) => {
                self.signals.take_abort();
                tracing::warn!(unit = %self.name, error = %err, "run failed");
                self.set_state(ExecutionState::Error, Some(err.clone()));
                Err(Error::Runtime(err))
            }
        }
    }

    fn panicked(&self) -> Result<Value> {
        tracing::error!(unit = %self.name, "worker panicked");
        self.set_state(ExecutionState::Error, Some(ScriptError::new("worker thread panicked")));
        Err(Error::WorkerPanicked)
    }
}

impl<E: ScriptEngine> LineProbe for Core<E> {
    fn on_line(&self, line: LineNo, visit: Visit) -> Flow {
        tracing::trace!(unit = %self.name, line, ?visit, "probe");
        if self.signals.abort_pending() {
            return self.enter_abort();
        }

        let new_visit = {
            let mut last = self.last_line();
            let new_visit = visit.is_new() || *last != Some(line);
            *last = Some(line);
            new_visit
        };
        if new_visit {
            self.publisher.progress(ProgressEvent {
                unit: Arc::clone(&self.name),
                line,
            });
        }

        let requested = self.signals.take_break();
        if requested || (new_visit && self.breakpoints.contains(line)) {
            tracing::debug!(unit = %self.name, line, requested, "stopped");
            self.signals.clear_resume();
            self.set_state(ExecutionState::Breaking, None);

            match self.signals.wait_resume_or_abort() {
                Wake::Abort => return self.enter_abort(),
                Wake::Resume => {
                    self.signals.take_break();
                    self.set_state(ExecutionState::Running, None);
                }
            }
        }

        Flow::Continue
    }
}

impl<E: ScriptEngine> ScriptControl for Core<E> {
    fn allow_break(&self) -> Flow {
        if self.signals.abort_pending() {
            return self.enter_abort();
        }
        if self.signals.allow_break() {
            tracing::debug!(unit = %self.name, "soft break accepted");
        }
        Flow::Continue
    }

    fn break_now(&self) {
        self.signals.brk();
    }

    fn abort_requested(&self) -> bool {
        self.signals.abort_pending()
    }

    fn sleep(&self, duration: Duration) -> Flow {
        if self.signals.sleep(duration) {
            Flow::Continue
        } else {
            self.enter_abort()
        }
    }
}
