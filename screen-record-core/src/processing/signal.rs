use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct SignalFlags {
    capturing: bool,
    paused: bool,
    pending: bool,
    notifications: u64,
}

/// What a task loop observed when it woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wake {
    pub capturing: bool,
    pub paused: bool,
    /// New input arrived since the previous wait.
    pub pending: bool,
}

/// Per-task lock guarding the capturing/paused flags and the
/// "input available" notification, with a condition variable the task loop
/// blocks on.
///
/// Producers (display or audio callbacks) only call
/// [`CaptureSignal::notify_available`]; they never touch task resources.
#[derive(Debug, Default)]
pub struct CaptureSignal {
    flags: Mutex<SignalFlags>,
    cond: Condvar,
}

impl CaptureSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_capturing(&self) {
        let mut flags = self.flags.lock();
        flags.capturing = true;
        flags.paused = false;
        self.cond.notify_all();
    }

    /// Clear the capturing flag and wake the loop. Returns whether it was set.
    pub fn stop_capturing(&self) -> bool {
        let mut flags = self.flags.lock();
        let was_capturing = flags.capturing;
        flags.capturing = false;
        self.cond.notify_all();
        was_capturing
    }

    /// Returns whether the flag changed. Ignored while not capturing.
    pub fn set_paused(&self, paused: bool) -> bool {
        let mut flags = self.flags.lock();
        if !flags.capturing || flags.paused == paused {
            return false;
        }
        flags.paused = paused;
        self.cond.notify_all();
        true
    }

    pub fn is_capturing(&self) -> bool {
        self.flags.lock().capturing
    }

    pub fn is_paused(&self) -> bool {
        self.flags.lock().paused
    }

    /// Number of notifications accepted while capturing.
    pub fn notifications(&self) -> u64 {
        self.flags.lock().notifications
    }

    /// Mark new input as available. Dropped while not capturing.
    pub fn notify_available(&self) {
        let mut flags = self.flags.lock();
        if flags.capturing {
            flags.pending = true;
            flags.notifications += 1;
            self.cond.notify_all();
        }
    }

    /// Block until input is available, capture stops, or `timeout` elapses.
    /// Consumes the pending notification.
    pub fn wait(&self, timeout: Duration) -> Wake {
        let mut flags = self.flags.lock();
        if !flags.pending && flags.capturing {
            self.cond.wait_for(&mut flags, timeout);
        }
        let wake = Wake {
            capturing: flags.capturing,
            paused: flags.paused,
            pending: flags.pending,
        };
        flags.pending = false;
        wake
    }
}
