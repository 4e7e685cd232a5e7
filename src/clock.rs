// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// Time source used by polling and retries.

use std::fmt::Debug;
use std::thread;
use std::time::{Duration, Instant};

/// Wall-clock and sleep primitive. Swapped out in tests to drive polling
/// without real waits.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Real time: `Instant::now` and `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}
