//! One-shot activation gate.
//!
//! Opened once by the dispatch loop when it starts listening. Subscribers
//! wait on it with a bound. Once open it never closes again.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct ActivationGate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl ActivationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let mut open = self.open.lock();
        if !*open {
            *open = true;
            self.opened.notify_all();
        }
    }

    pub fn is_open(&self) -> bool {
        *self.open.lock()
    }

    /// Wait until open. Returns `false` on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut open = self.open.lock();
        if *open {
            return true;
        }
        let result = self.opened.wait_while_for(&mut open, |open| !*open, timeout);
        !result.timed_out() || *open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_wait_times_out_when_closed() {
        let gate = ActivationGate::new();
        let start = Instant::now();

        assert!(!gate.wait(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_open_before_wait() {
        let gate = ActivationGate::new();
        gate.open();
        gate.open();

        assert!(gate.is_open());
        assert!(gate.wait(Duration::ZERO));
    }

    #[test]
    fn test_open_from_other_thread() {
        let gate = Arc::new(ActivationGate::new());
        let opener = gate.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            opener.open();
        });

        assert!(gate.wait(Duration::from_secs(5)));
        handle.join().unwrap();
    }
}
