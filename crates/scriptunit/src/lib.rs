//! Execution controller for embedded scripts.
//!
//! A [`ScriptUnit`] wraps one compiled [`Script`] and runs it on a worker
//! thread. While the worker runs, the control thread can stop it at
//! breakpoints, resume it, or abort it. The compiler and interpreter are
//! provided by a [`ScriptEngine`] implementation; the controller only relies
//! on the engine calling a [`LineProbe`] before every statement.
//!
//! ```rust,ignore
//! let unit = ScriptUnit::builder(engine, Script::load("blink.lua")?)
//!     .breakpoint(3)
//!     .build()?;
//! let events = unit.events();
//! let handle = unit.run()?;
//! // wait for `Breaking`, then
//! unit.resume();
//! handle.join()?;
//! ```
pub mod binding;
pub mod breakpoint;
pub mod engine;
pub mod error;
pub mod event;
mod handle;
pub mod script;
pub mod signal;
pub mod state;
mod unit;
pub mod value;

/// 1-based line number in the script source.
pub type LineNo = u32;

pub use binding::Bindings;
pub use breakpoint::Breakpoints;
pub use engine::{ControlHandle, ExecContext, Flow, LineProbe, ScriptControl, ScriptEngine, Visit};
pub use error::{CompileError, Error, ExecError, Result, ScriptError};
pub use event::{ChannelSink, EventSink, ProgressEvent, StateEvent, TracingSink, UnitEvent};
pub use handle::RunHandle;
pub use script::Script;
pub use state::ExecutionState;
pub use unit::{ScriptUnit, ScriptUnitBuilder, UnitControls};
pub use value::{HostFunction, Value};
