//! An interruptible sleep for the GC scheduler loop, the idiomatic analogue of a POSIX `sleep()`
//! that returns early (with the time remaining) when signalled.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    stopped: bool,
}

/// A cooperative stop signal shared between the scheduler loop and whatever holds the other end
/// (a signal handler, a shutdown RPC, a test). Cloning shares the same underlying signal.
#[derive(Debug, Clone)]
pub struct Stopper(Arc<(Mutex<State>, Condvar)>);

impl Stopper {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new((Mutex::new(State::default()), Condvar::new())))
    }

    /// Signals a waiting (or future) [`Stopper::wait_or_stopped`] call to return immediately.
    pub fn request_stop(&self) {
        let (lock, condvar) = &*self.0;
        let mut state = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.stopped = true;
        condvar.notify_all();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        let (lock, _) = &*self.0;
        lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner).stopped
    }

    /// Sleeps up to `timeout`, returning as soon as [`Stopper::request_stop`] is called.
    ///
    /// Returns `true` if a stop was requested (whether before the call or during the wait),
    /// `false` if `timeout` elapsed with no stop requested.
    #[must_use]
    pub fn wait_or_stopped(&self, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.0;
        let state = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let (state, _timeout_result) = condvar
            .wait_timeout_while(state, timeout, |state| !state.stopped)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.stopped
    }
}

impl Default for Stopper {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Instant;

    use super::*;

    #[test]
    fn wait_times_out_when_never_stopped() {
        let stopper = Stopper::new();
        let start = Instant::now();
        let stopped = stopper.wait_or_stopped(Duration::from_millis(20));
        assert!(!stopped);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn request_stop_wakes_a_waiting_call_promptly() {
        let stopper = Stopper::new();
        let waiter = stopper.clone();
        let handle = thread::spawn(move || waiter.wait_or_stopped(Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(10));
        let start = Instant::now();
        stopper.request_stop();

        assert!(handle.join().expect("waiter thread panicked"));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn stop_requested_before_wait_returns_immediately() {
        let stopper = Stopper::new();
        stopper.request_stop();
        assert!(stopper.wait_or_stopped(Duration::from_secs(30)));
        assert!(stopper.is_stopped());
    }
}
