use std::{io, path::PathBuf};

use miette::Diagnostic;

use crate::{LineNo, state::ExecutionState};

/// An error raised by the script body while it was running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Diagnostic)]
#[error("{}", render(.message, .line))]
#[diagnostic(code(scriptunit::runtime))]
pub struct ScriptError {
    pub message: String,
    pub line: Option<LineNo>,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(mut self, line: LineNo) -> Self {
        self.line = Some(line);
        self
    }
}

fn render(message: &str, line: &Option<LineNo>) -> String {
    match line {
        Some(line) => format!("line {}: {}", line, message),
        None => message.to_string(),
    }
}

/// The capability refused the source text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Diagnostic)]
#[error("failed to compile `{script}`: {message}")]
#[diagnostic(code(scriptunit::compile), help("fix the syntax error and rebuild the unit"))]
pub struct CompileError {
    pub script: String,
    pub message: String,
    pub line: Option<LineNo>,
}

/// How an execution of a compiled unit ended when it did not return a value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecError {
    /// The run was unwound through the abort path. Not a script failure.
    #[error("execution aborted")]
    Aborted,
    #[error(transparent)]
    Runtime(#[from] ScriptError),
}

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] CompileError),
    #[error("cannot {operation} while the unit is {state}")]
    #[diagnostic(code(scriptunit::invalid_state), help("wait for the run to finish or abort it first"))]
    InvalidState {
        operation: &'static str,
        state: ExecutionState,
    },
    #[error("execution aborted")]
    #[diagnostic(code(scriptunit::aborted))]
    Aborted,
    #[error(transparent)]
    #[diagnostic(transparent)]
    Runtime(ScriptError),
    #[error("the worker thread panicked")]
    #[diagnostic(code(scriptunit::worker_panicked))]
    WorkerPanicked,
    #[error("failed to read `{}`", .path.display())]
    #[diagnostic(code(scriptunit::io))]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn the worker thread")]
    #[diagnostic(code(scriptunit::spawn))]
    Spawn(#[source] io::Error),
}

impl Error {
    /// The script error carried by a runtime failure.
    pub fn script_error(&self) -> Option<&ScriptError> {
        match self {
            Error::Runtime(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}

impl From<ExecError> for Error {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Aborted => Error::Aborted,
            ExecError::Runtime(err) => Error::Runtime(err),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
