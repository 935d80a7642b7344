//! Encoder-driven backpressure.
//!
//! The encode graph says "need data" when it can accept frames and "enough
//! data" when its queue is full. The producer checks the gate before each
//! push and waits on a condition variable while it is closed, so a wakeup
//! can never be missed between the check and the wait.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct GateState {
    need_data: bool,
    closed: bool,
}

/// Shared readiness flag between an encode graph and its producer.
#[derive(Debug, Clone)]
pub struct BackpressureGate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

impl Default for BackpressureGate {
    fn default() -> Self {
        Self::new()
    }
}

impl BackpressureGate {
    /// A new gate starts out wanting data.
    pub fn new() -> Self {
        Self {
            inner: Arc::new((
                Mutex::new(GateState {
                    need_data: true,
                    closed: false,
                }),
                Condvar::new(),
            )),
        }
    }

    /// Encoder side: ready for more frames.
    pub fn need_data(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock();
        if !state.need_data {
            state.need_data = true;
            cvar.notify_all();
        }
    }

    /// Encoder side: stop pushing until the next `need_data`.
    pub fn enough_data(&self) {
        let (lock, _) = &*self.inner;
        lock.lock().need_data = false;
    }

    /// Permanently open the gate and wake every waiter. Used on teardown.
    pub fn close(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock();
        state.closed = true;
        cvar.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.0.lock().closed
    }

    /// Producer side: non-blocking readiness check.
    pub fn wants_data(&self) -> bool {
        let state = self.inner.0.lock();
        state.need_data && !state.closed
    }

    /// Producer side: wait up to `timeout` for the encoder to want data.
    ///
    /// Returns `true` if a frame may be pushed now, `false` on timeout or
    /// when the gate was closed.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock();
        if !state.need_data && !state.closed {
            let _ = cvar.wait_while_for(&mut state, |s| !s.need_data && !s.closed, timeout);
        }
        state.need_data && !state.closed
    }
}
