//! Readiness latch for the leader handshake.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

type ReadyCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Latch {
    ready: bool,
    callbacks: Vec<ReadyCallback>,
}

/// Resolves once a store has synced with its leader. Never un-resolves.
#[derive(Clone)]
pub struct Readiness {
    latch: Arc<Mutex<Latch>>,
    cond: Arc<Condvar>,
}

impl Readiness {
    pub(crate) fn pending() -> Self {
        Self {
            latch: Arc::new(Mutex::new(Latch::default())),
            cond: Arc::new(Condvar::new()),
        }
    }

    pub(crate) fn resolved() -> Self {
        let readiness = Self::pending();
        readiness.latch.lock().ready = true;
        readiness
    }

    /// Resolve the latch and run queued callbacks. Later calls do nothing.
    pub(crate) fn resolve(&self) {
        let callbacks = {
            let mut latch = self.latch.lock();
            if latch.ready {
                return;
            }
            latch.ready = true;
            std::mem::take(&mut latch.callbacks)
        };
        self.cond.notify_all();

        for callback in callbacks {
            callback();
        }
    }

    pub fn is_ready(&self) -> bool {
        self.latch.lock().ready
    }

    /// Run `callback` once ready; immediately if already ready.
    pub fn on_ready(&self, callback: impl FnOnce() + Send + 'static) {
        {
            let mut latch = self.latch.lock();
            if !latch.ready {
                latch.callbacks.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Block the current thread until ready.
    ///
    /// Never returns for a follower whose leader never answers.
    pub fn wait(&self) {
        let mut latch = self.latch.lock();
        while !latch.ready {
            self.cond.wait(&mut latch);
        }
    }

    /// Block until ready or until `timeout` elapses. Returns readiness.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut latch = self.latch.lock();
        while !latch.ready {
            if self.cond.wait_until(&mut latch, deadline).timed_out() {
                return latch.ready;
            }
        }
        true
    }
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Readiness")
            .field("ready", &self.is_ready())
            .finish()
    }
}
