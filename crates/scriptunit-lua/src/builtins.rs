use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use mlua::Lua;
use scriptunit::{ControlHandle, Flow};

// Longest sleep a script can request, about 136 years.
const MAX_SLEEP: Duration = Duration::from_secs(u32::MAX as u64);

/// Set when the run is unwound through the abort path, so the error that
/// reaches the host can be told apart from a script failure.
#[derive(Debug, Clone, Default)]
pub(crate) struct AbortLatch(Arc<AtomicBool>);

impl AbortLatch {
    /// Latches and returns the error that unwinds the Lua stack.
    pub(crate) fn trip(&self) -> mlua::Error {
        self.0.store(true, Ordering::SeqCst);
        mlua::Error::RuntimeError("execution aborted".to_string())
    }

    pub(crate) fn is_tripped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Registers `allow_break`, `debug_break`, `wait_break` and `sleep`.
pub(crate) fn register(lua: &Lua, control: &ControlHandle, latch: &AbortLatch) -> mlua::Result<()> {
    let globals = lua.globals();

    let (c, l) = (control.clone(), latch.clone());
    globals.set(
        "allow_break",
        lua.create_function(move |_, ()| match c.allow_break() {
            Flow::Continue => Ok(()),
            Flow::Abort => Err(l.trip()),
        })?,
    )?;

    let c = control.clone();
    globals.set(
        "debug_break",
        lua.create_function(move |_, ()| {
            c.request_break_now();
            Ok(())
        })?,
    )?;

    // Gives the line hook a statement to stop at.
    globals.set("wait_break", lua.create_function(|_, ()| Ok(()))?)?;

    let (c, l) = (control.clone(), latch.clone());
    globals.set(
        "sleep",
        lua.create_function(move |_, seconds: f64| {
            let duration = Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(MAX_SLEEP);
            match c.sleep(duration) {
                Flow::Continue => Ok(()),
                Flow::Abort => Err(l.trip()),
            }
        })?,
    )?;

    Ok(())
}
