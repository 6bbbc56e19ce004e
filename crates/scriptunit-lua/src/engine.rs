use std::path::PathBuf;

use mlua::{Function, HookTriggers, Lua, MultiValue, VmState};
use scriptunit::{CompileError, ExecContext, ExecError, Flow, LineNo, Script, ScriptEngine, Value, Visit};

use crate::{
    builtins::{self, AbortLatch},
    convert::{from_multi, to_lua},
    message::script_error,
};

// Globals removed from a sandboxed state.
const UNSAFE_GLOBALS: &[&str] = &["os", "io", "debug", "package", "require", "loadfile", "dofile", "load"];

/// Lua 5.4 scripting capability.
///
/// Each compiled unit owns its own Lua state, so globals assigned by the script
/// survive from one run of the unit to the next.
#[derive(Debug, Clone, Copy, Default)]
pub struct LuaEngine {
    sandboxed: bool,
}

impl LuaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine whose states have no file, process or module access.
    pub fn sandboxed() -> Self {
        Self { sandboxed: true }
    }

    pub fn is_sandboxed(&self) -> bool {
        self.sandboxed
    }
}

/// A compiled chunk together with the Lua state it lives in.
pub struct LuaUnit {
    lua: Lua,
    chunk: Function,
    chunk_name: String,
    // `package.path` as the state started with; `None` when sandboxed.
    base_path: Option<String>,
}

impl std::fmt::Debug for LuaUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LuaUnit")
            .field("chunk_name", &self.chunk_name)
            .field("base_path", &self.base_path)
            .finish()
    }
}

impl LuaUnit {
    fn prepare(&self, context: &ExecContext, latch: &AbortLatch) -> mlua::Result<()> {
        builtins::register(&self.lua, &context.control, latch)?;

        let globals = self.lua.globals();
        for (name, value) in &context.bindings {
            globals.set(name.as_str(), to_lua(&self.lua, value)?)?;
        }

        if let Some(base) = &self.base_path {
            let package: mlua::Table = globals.get("package")?;
            package.set("path", module_path(&context.search_paths, base))?;
        }
        Ok(())
    }

    fn install_probe(&self, context: &ExecContext, latch: &AbortLatch) {
        let Some(probe) = context.probe.clone() else {
            return;
        };
        let chunk_name = self.chunk_name.clone();
        let latch = latch.clone();

        self.lua.set_hook(HookTriggers::new().every_line(), move |_lua, debug| {
            // Lines of modules loaded by the script are not reported.
            if debug.source().source.as_deref() != Some(chunk_name.as_str()) {
                return Ok(VmState::Continue);
            }
            let line = LineNo::try_from(debug.curr_line()).unwrap_or_default();
            // Lua fires on a new line or a backward jump, so every call is a visit.
            match probe.on_line(line, Visit::New) {
                Flow::Continue => Ok(VmState::Continue),
                Flow::Abort => Err(latch.trip()),
            }
        });
    }
}

impl ScriptEngine for LuaEngine {
    type Unit = LuaUnit;

    fn compile(&self, script: &Script) -> Result<LuaUnit, CompileError> {
        let compile_error = |err: mlua::Error| {
            let err = script_error(&err);
            CompileError {
                script: script.name().to_string(),
                message: err.message,
                line: err.line,
            }
        };

        let lua = Lua::new();
        let base_path = if self.sandboxed {
            sandbox(&lua).map_err(compile_error)?;
            None
        } else {
            let package: mlua::Table = lua.globals().get("package").map_err(compile_error)?;
            let path: String = package.get("path").map_err(compile_error)?;
            Some(path)
        };

        let chunk_name = format!("@{}", script.path().display());
        let chunk = lua
            .load(script.source())
            .set_name(chunk_name.clone())
            .into_function()
            .map_err(compile_error)?;

        tracing::debug!(script = script.name(), sandboxed = self.sandboxed, "lua chunk compiled");
        Ok(LuaUnit {
            lua,
            chunk,
            chunk_name,
            base_path,
        })
    }

    fn execute(&self, unit: &LuaUnit, context: ExecContext) -> Result<Value, ExecError> {
        let latch = AbortLatch::default();
        unit.prepare(&context, &latch)
            .map_err(|err| ExecError::Runtime(script_error(&err)))?;
        unit.install_probe(&context, &latch);

        tracing::debug!(chunk = %unit.chunk_name, bindings = context.bindings.len(), "executing lua chunk");
        let result: mlua::Result<MultiValue> = unit.chunk.call(());
        unit.lua.remove_hook();

        match result {
            Ok(values) => Ok(from_multi(values)),
            Err(_) if latch.is_tripped() => Err(ExecError::Aborted),
            Err(err) => Err(ExecError::Runtime(script_error(&err))),
        }
    }
}

fn sandbox(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();
    for name in UNSAFE_GLOBALS {
        globals.set(*name, mlua::Value::Nil)?;
    }
    Ok(())
}

/// `package.path` with `?.lua` and `?/init.lua` templates for every search directory in front.
fn module_path(search_paths: &[PathBuf], base: &str) -> String {
    search_paths
        .iter()
        .flat_map(|dir| [dir.join("?.lua"), dir.join("?").join("init.lua")])
        .map(|template| template.display().to_string())
        .chain(std::iter::once(base.to_string()))
        .collect::<Vec<_>>()
        .join(";")
}
