//! Lua 5.4 capability for [`scriptunit`].
//!
//! [`LuaEngine`] compiles a script into a chunk and runs it with a line hook
//! that reports every line of the script to the unit's probe. Besides the
//! host bindings, every run sees these globals:
//!
//! - `allow_break()` accepts a pending soft break request
//! - `debug_break()` stops at the next statement
//! - `wait_break()` does nothing, giving the hook a statement to stop at
//! - `sleep(seconds)` blocks the run and ends early on abort
mod builtins;
pub mod convert;
mod engine;
mod message;

pub use engine::{LuaEngine, LuaUnit};
