use std::sync::{
    Condvar, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// A one-shot control flag.
#[derive(Debug, Default)]
pub struct Signal(AtomicBool);

impl Signal {
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Consumes the signal, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// What woke a worker parked in [`Signals::wait_resume_or_abort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Resume,
    Abort,
}

/// The four control signals shared between the control thread and the worker.
///
/// Setters never block for longer than it takes to notify a parked worker.
#[derive(Debug, Default)]
pub struct Signals {
    abort: Signal,
    brk: Signal,
    resume: Signal,
    request_break: Signal,
    lock: Mutex<()>,
    wake: Condvar,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.abort.set();
        self.notify();
    }

    pub fn resume(&self) {
        self.resume.set();
        self.notify();
    }

    pub fn brk(&self) {
        self.brk.set();
    }

    pub fn request_break(&self) {
        self.request_break.set();
    }

    /// Converts a pending break request into a break. Returns whether one was pending.
    pub fn allow_break(&self) -> bool {
        if self.request_break.take() {
            self.brk.set();
            true
        } else {
            false
        }
    }

    /// Polls abort without consuming it.
    pub fn abort_pending(&self) -> bool {
        self.abort.is_set()
    }

    pub fn take_abort(&self) -> bool {
        self.abort.take()
    }

    pub fn break_pending(&self) -> bool {
        self.brk.is_set()
    }

    pub fn take_break(&self) -> bool {
        self.brk.take()
    }

    pub fn clear_resume(&self) {
        self.resume.clear();
    }

    /// Drops break and request-break, leaving abort and resume untouched.
    pub fn clear_breaks(&self) {
        self.brk.clear();
        self.request_break.clear();
    }

    pub fn clear_all(&self) {
        self.abort.clear();
        self.brk.clear();
        self.resume.clear();
        self.request_break.clear();
    }

    /// Parks the calling thread until resume or abort is signalled.
    ///
    /// Abort is checked first so it wins when both are set. Resume is consumed,
    /// abort is left for the caller to act on.
    pub fn wait_resume_or_abort(&self) -> Wake {
        let mut guard = self.guard();
        loop {
            if self.abort.is_set() {
                return Wake::Abort;
            }
            if self.resume.take() {
                return Wake::Resume;
            }
            guard = self.wake.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Sleeps for `duration`, returning early with `false` when abort is signalled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        let mut guard = self.guard();
        loop {
            if self.abort.is_set() {
                return false;
            }
            guard = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    self.wake
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.wake.wait(guard).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn notify(&self) {
        let _guard = self.guard();
        self.wake.notify_all();
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
