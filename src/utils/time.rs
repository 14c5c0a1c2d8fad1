use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic time source used by every timer in the controller
pub trait Clock {
    fn now(&self) -> Instant;

    /// Block the control thread, used by retry backoff and the tick loop
    fn sleep(&self, duration: Duration);
}

/// Real time: `Instant` plus `thread::sleep`
#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock for tests and simulations, `sleep` advances time instantly
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Cell::new(Instant::now()),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

impl<T: Clock + ?Sized> Clock for Rc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Time elapsed since `start`, saturating at zero
pub fn elapsed_since(start: Instant, now: Instant) -> Duration {
    now.saturating_duration_since(start)
}

/// True when strictly more than `timeout` has passed since `start`
pub fn is_expired(start: Instant, timeout: Duration, now: Instant) -> bool {
    elapsed_since(start, now) > timeout
}
