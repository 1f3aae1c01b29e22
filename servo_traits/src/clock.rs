use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic clock abstraction for motion timing across the stack.
///
/// - now(): returns a monotonic Instant
/// - sleep(): sleeps for the provided duration (implementations may simulate)
/// - us_since(): helper to compute elapsed microseconds from an epoch Instant
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Sleep between two duty updates.
    #[inline]
    fn sleep_us(&self, us: u64) {
        self.sleep(Duration::from_micros(us));
    }

    /// Microseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn us_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        u64::try_from(dur.as_micros()).unwrap_or(u64::MAX)
    }
}

/// Real-time monotonic clock backed by std::time::Instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

/// Deterministic clock whose time only moves when slept on or advanced.
///
/// now() = origin + offset
/// sleep(d) advances internal time by d without actually sleeping.
///
/// Clones share the same timeline, so a simulated PWM and the controller
/// driving it observe one consistent clock.
#[derive(Debug, Clone)]
pub struct SimClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = off.saturating_add(d);
        }
    }

    /// Total simulated time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_clock_advances_only_on_sleep() {
        let clock = SimClock::new();
        let t0 = clock.now();
        clock.sleep_us(250);
        clock.sleep(Duration::from_millis(1));
        assert_eq!(clock.us_since(t0), 1_250);
    }

    #[test]
    fn sim_clock_clones_share_timeline() {
        let a = SimClock::new();
        let b = a.clone();
        b.advance(Duration::from_micros(40));
        assert_eq!(a.elapsed(), Duration::from_micros(40));
    }
}
