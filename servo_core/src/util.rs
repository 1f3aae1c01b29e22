//! Unit helpers shared by the fitter and the motion loop.
//!
//! Fits run on wait times in milliseconds (better conditioned than seconds);
//! the device sleeps in microseconds.

use std::time::Duration;

use servo_traits::{Clock, EndStop};

use crate::error::{Result, ServoError};
use crate::hw_error::map_hw_error;

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;
/// Number of microseconds in one millisecond.
pub const MICROS_PER_MILLI: f64 = 1_000.0;
/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: f64 = 1_000.0;

#[inline]
pub fn us_to_ms(us: u64) -> f64 {
    us as f64 / MICROS_PER_MILLI
}

/// Average speed in deg/s for `angle_deg` covered in `elapsed_us`.
/// Returns `None` when no time elapsed.
#[inline]
pub fn speed_deg_per_s(angle_deg: f64, elapsed_us: u64) -> Option<f64> {
    if elapsed_us == 0 {
        return None;
    }
    Some(angle_deg.abs() * MICROS_PER_SEC as f64 / elapsed_us as f64)
}

/// Poll `sensor` until it trips or `timeout` expires on `clock`, sleeping
/// `poll_interval` between reads. Returns the microseconds waited.
pub fn wait_until_triggered<S, C>(
    sensor: &mut S,
    clock: &C,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<u64>
where
    S: EndStop + ?Sized,
    C: Clock + ?Sized,
{
    let start = clock.now();
    let deadline = start + timeout;
    loop {
        let triggered = sensor
            .is_triggered()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))?;
        if triggered {
            return Ok(clock.us_since(start));
        }
        if clock.now() >= deadline {
            return Err(ServoError::Timeout.into());
        }
        clock.sleep(poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use servo_traits::SimClock;

    /// Sensor that trips after a fixed number of polls.
    struct CountdownStop(u32);

    impl EndStop for CountdownStop {
        fn is_triggered(&mut self) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
            if self.0 == 0 {
                return Ok(true);
            }
            self.0 -= 1;
            Ok(false)
        }
    }

    #[test]
    fn wait_until_triggered_success_path() {
        let clock = SimClock::new();
        let mut stop = CountdownStop(3);
        let waited = wait_until_triggered(
            &mut stop,
            &clock,
            Duration::from_millis(50),
            Duration::from_micros(10),
        )
        .unwrap();
        assert_eq!(waited, 30);
    }

    #[test]
    fn wait_until_triggered_timeout_path() {
        let clock = SimClock::new();
        let mut stop = CountdownStop(u32::MAX);
        let err = wait_until_triggered(
            &mut stop,
            &clock,
            Duration::from_millis(5),
            Duration::from_micros(200),
        )
        .expect_err("expected timeout error");
        assert_eq!(err.downcast_ref::<ServoError>(), Some(&ServoError::Timeout));
        assert!(clock.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn speed_from_elapsed() {
        assert_eq!(speed_deg_per_s(180.0, 500_000), Some(360.0));
        assert_eq!(speed_deg_per_s(-90.0, 1_000_000), Some(90.0));
        assert_eq!(speed_deg_per_s(180.0, 0), None);
    }

    #[test]
    fn micro_to_milli() {
        assert_eq!(us_to_ms(2_500), 2.5);
    }
}
