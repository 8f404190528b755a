//! Wait handle released by asynchronous device events.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Outcome of a timed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// A signal was consumed.
    Signaled,
    /// The timeout elapsed first.
    TimedOut,
}

/// Single-pending-signal notification handle.
///
/// One boolean flag guarded by a mutex, plus a condition variable.
/// [`signal`](Notifier::signal) sets the flag and wakes one waiter; a wait
/// consumes the flag. Signals do not queue: two signals with nobody waiting
/// release exactly one later wait.
///
/// The handle is owned by whoever registers for device events and shared
/// with the event callback through an `Arc`.
///
/// # Example
///
/// ```rust
/// use camhal::session::{Notifier, WaitStatus};
/// use std::time::Duration;
///
/// let notifier = Notifier::new();
/// notifier.signal();
/// assert_eq!(notifier.wait_timeout(Duration::from_millis(1)), WaitStatus::Signaled);
/// assert_eq!(notifier.wait_timeout(Duration::from_millis(1)), WaitStatus::TimedOut);
/// ```
#[derive(Debug, Default)]
pub struct Notifier {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl Notifier {
    /// Create a handle with no pending signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pending flag and wake one waiter.
    pub fn signal(&self) {
        let mut pending = self.lock();
        *pending = true;
        self.cond.notify_one();
    }

    /// Block until a signal is pending, then consume it.
    pub fn wait(&self) {
        let mut pending = self.lock();
        while !*pending {
            pending = self
                .cond
                .wait(pending)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        *pending = false;
    }

    /// Block until a signal is pending or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> WaitStatus {
        let deadline = Instant::now() + timeout;
        let mut pending = self.lock();

        loop {
            if *pending {
                *pending = false;
                return WaitStatus::Signaled;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return WaitStatus::TimedOut;
            }

            let (guard, _) = self
                .cond
                .wait_timeout(pending, remaining)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            pending = guard;
        }
    }

    /// Whether a signal is waiting to be consumed.
    pub fn is_pending(&self) -> bool {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_signal_before_wait_is_kept() {
        let notifier = Notifier::new();
        notifier.signal();
        assert!(notifier.is_pending());

        notifier.wait();
        assert!(!notifier.is_pending());
    }

    #[test]
    fn test_signals_do_not_queue() {
        let notifier = Notifier::new();
        notifier.signal();
        notifier.signal();

        assert_eq!(
            notifier.wait_timeout(Duration::from_millis(5)),
            WaitStatus::Signaled
        );
        assert_eq!(
            notifier.wait_timeout(Duration::from_millis(5)),
            WaitStatus::TimedOut
        );
    }

    #[test]
    fn test_timeout_without_signal() {
        let notifier = Notifier::new();
        let start = Instant::now();
        assert_eq!(
            notifier.wait_timeout(Duration::from_millis(20)),
            WaitStatus::TimedOut
        );
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_signal_from_other_thread() {
        let notifier = Arc::new(Notifier::new());

        let signaller = Arc::clone(&notifier);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signaller.signal();
        });

        assert_eq!(
            notifier.wait_timeout(Duration::from_secs(5)),
            WaitStatus::Signaled
        );
        handle.join().unwrap();
    }
}
