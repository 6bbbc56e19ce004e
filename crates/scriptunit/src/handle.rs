use std::{sync::Arc, thread::JoinHandle};

use crate::error::{Error, Result};

/// Completion handle of a run started by [`ScriptUnit::run`](crate::ScriptUnit::run)
/// or [`ScriptUnit::execute`](crate::ScriptUnit::execute).
#[derive(Debug)]
pub struct RunHandle<T> {
    unit: Arc<str>,
    inner: JoinHandle<Result<T>>,
}

impl<T> RunHandle<T> {
    pub(crate) fn new(unit: Arc<str>, inner: JoinHandle<Result<T>>) -> Self {
        Self { unit, inner }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Blocks until the worker reaches `Done`, `Aborted` or `Error`.
    pub fn join(self) -> Result<T> {
        self.inner.join().unwrap_or_else(|_| {
            tracing::error!(unit = %self.unit, "worker thread panicked");
            Err(Error::WorkerPanicked)
        })
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}
