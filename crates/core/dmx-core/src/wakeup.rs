//! Single-slot wakeup token used between a waiting task and an ISR.
//!
//! The framing engine's contract is "at most one pending packet per
//! reader": a caller arms the token before blocking in `send`/`receive`,
//! and the ISR signals it exactly once when the engine has something to
//! report. This is deliberately not a channel — there is no queue to
//! overflow, and the ISR side never allocates or blocks.

use core::sync::atomic::{AtomicBool, Ordering};

/// A source of monotonic microsecond timestamps.
///
/// Implemented by the platform HAL and threaded down to anything that
/// needs to measure a timeout (see `dmx_rdm::port::Port::receive`).
pub trait Clock {
    /// Returns a monotonically increasing timestamp in microseconds.
    fn now_micros(&self) -> u64;
}

/// A single-slot wakeup flag.
///
/// `arm` clears the flag and must be called by the waiting task before it
/// starts polling. `signal` is the only operation the ISR is allowed to
/// call; it is a single atomic store plus an optional platform notify hook
/// and is therefore safe to call from interrupt context.
pub struct WakeToken {
    ready: AtomicBool,
}

impl WakeToken {
    /// Creates a new, unsignalled token.
    pub const fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
        }
    }

    /// Clears the flag. Call this before waiting, while still holding
    /// whatever lock prevents a concurrent `signal` from being missed.
    pub fn arm(&self) {
        self.ready.store(false, Ordering::Release);
    }

    /// Signals the token. Safe to call from an ISR.
    pub fn signal(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Returns `true` and clears the flag if it was set, without blocking.
    pub fn poll(&self) -> bool {
        self.ready.swap(false, Ordering::AcqRel)
    }

    /// Spin-waits for [`signal`](Self::signal) until `clock` reports the
    /// deadline has passed.
    ///
    /// Returns `true` if signalled before the deadline, `false` on timeout.
    /// A `timeout_us` of `0` still polls once, so a caller can use it to
    /// implement non-blocking "has a packet arrived" checks.
    pub fn wait_timeout(&self, clock: &dyn Clock, timeout_us: u64) -> bool {
        let deadline = clock.now_micros().saturating_add(timeout_us);
        loop {
            if self.poll() {
                return true;
            }
            if clock.now_micros() >= deadline {
                return self.poll();
            }
            core::hint::spin_loop();
        }
    }
}

impl Default for WakeToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering as StdOrdering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    struct TestClock(AtomicU64);
    impl Clock for TestClock {
        fn now_micros(&self) -> u64 {
            self.0.load(StdOrdering::Relaxed)
        }
    }

    #[test]
    fn signal_before_wait_is_observed() {
        let token = WakeToken::new();
        token.arm();
        token.signal();
        let clock = TestClock(AtomicU64::new(0));
        assert!(token.wait_timeout(&clock, 0));
    }

    #[test]
    fn times_out_without_signal() {
        // A clock that advances every time it's read stands in for real
        // elapsed time, so the spin loop observes the deadline pass
        // without a second thread or a genuinely sleeping test.
        struct TickingClock(AtomicU64);
        impl Clock for TickingClock {
            fn now_micros(&self) -> u64 {
                self.0.fetch_add(1, StdOrdering::Relaxed)
            }
        }

        let token = WakeToken::new();
        token.arm();
        let clock = TickingClock(AtomicU64::new(1_000));
        assert!(!token.wait_timeout(&clock, 100));
    }

    #[test]
    fn poll_clears_flag() {
        let token = WakeToken::new();
        token.signal();
        assert!(token.poll());
        assert!(!token.poll());
    }

    #[test]
    fn cross_thread_signal_wakes_waiter() {
        let token = Arc::new(WakeToken::new());
        token.arm();
        let signaller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            signaller.signal();
        });

        struct RealClock;
        impl Clock for RealClock {
            fn now_micros(&self) -> u64 {
                use std::time::{SystemTime, UNIX_EPOCH};
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap()
                    .as_micros() as u64
            }
        }

        assert!(token.wait_timeout(&RealClock, 200_000));
        handle.join().unwrap();
    }
}
