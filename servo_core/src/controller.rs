//! Stepped PWM motion toward a target angle.
//!
//! Angles are centred: 0 is mid travel, positive angles turn clockwise. A move
//! emits one duty value per increment of `step` and sleeps `wait_us` after
//! each, so speed is set by the (step, wait) pair chosen from the speed table.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use servo_traits::{Clock, PwmOutput};

use crate::error::{Result, ServoError};
use crate::hw_error::map_hw_error;
use crate::speed::{SpeedConfig, Timing};

/// Duty range and travel of one servo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoGeometry {
    /// Full travel in degrees.
    pub max_angle: u32,
    /// Duty at `+max_angle/2`.
    pub min_duty: u16,
    /// Duty at `-max_angle/2`.
    pub max_duty: u16,
}

impl Default for ServoGeometry {
    fn default() -> Self {
        Self {
            max_angle: 180,
            min_duty: 1500,
            max_duty: 7500,
        }
    }
}

impl ServoGeometry {
    pub fn clamp_angle(&self, angle: f32) -> f32 {
        let half = self.max_angle as f32 / 2.0;
        angle.clamp(-half, half)
    }

    /// Degrees actually covered moving `from → to`, after both ends are clamped.
    pub fn travel(&self, from: f32, to: f32) -> f64 {
        f64::from(self.clamp_angle(to) - self.clamp_angle(from)).abs()
    }

    /// Duty for an (already clamped) angle, truncated toward zero.
    pub fn angle_to_duty(&self, angle: f32) -> u16 {
        let half = f64::from(self.max_angle / 2);
        let span = f64::from(self.max_duty) - f64::from(self.min_duty);
        let duty = (half - f64::from(angle)) * span / f64::from(self.max_angle) + f64::from(self.min_duty);
        duty.trunc().clamp(0.0, f64::from(u16::MAX)) as u16
    }
}

pub struct ServoController<P: PwmOutput, C: Clock> {
    pwm: P,
    clock: C,
    geometry: ServoGeometry,
    speed: Option<SpeedConfig>,
    current_angle: f32,
    stop: Option<Arc<AtomicBool>>,
}

impl<P: PwmOutput, C: Clock> core::fmt::Debug for ServoController<P, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServoController")
            .field("geometry", &self.geometry)
            .field("current_angle", &self.current_angle)
            .field("has_speed_config", &self.speed.is_some())
            .finish()
    }
}

impl<P: PwmOutput, C: Clock> ServoController<P, C> {
    /// Controller at angle 0; nothing is written until the first move.
    pub fn new(pwm: P, clock: C, geometry: ServoGeometry) -> Self {
        Self {
            pwm,
            clock,
            geometry,
            speed: None,
            current_angle: 0.0,
            stop: None,
        }
    }

    pub fn with_speed_config(mut self, speed: SpeedConfig) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Flag polled before every duty update; when set the move stops and the
    /// PWM is released.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    pub fn current_angle(&self) -> f32 {
        self.current_angle
    }

    pub fn geometry(&self) -> &ServoGeometry {
        &self.geometry
    }

    pub fn speed_config(&self) -> Option<&SpeedConfig> {
        self.speed.as_ref()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Move to 0 at full speed, then let the horn settle.
    pub fn home(&mut self, settle: Duration) -> Result<Timing> {
        let timing = self.go_to_position(0.0, 100.0)?;
        self.clock.sleep(settle);
        Ok(timing)
    }

    /// Move to `angle` at `percent` of the calibrated speed range.
    pub fn go_to_position(&mut self, angle: f32, percent: f64) -> Result<Timing> {
        let speed = self
            .speed
            .as_ref()
            .ok_or_else(|| ServoError::Config("no speed table loaded".into()))?;
        let timing = speed.timing_for_percent(percent)?;
        tracing::trace!(angle, percent, step = timing.step, wait_us = timing.wait_us, "move");
        self.move_with_timing(angle, timing)
    }

    /// Move to `angle` with an explicit step and wait.
    ///
    /// If one increment would overshoot the target, the end duty is written
    /// once. Otherwise duties `start, start+inc, …` strictly before the end are
    /// written with a wait after each, and the move lands on the end duty.
    /// The current angle only changes when the move completes.
    pub fn move_with_timing(&mut self, angle: f32, timing: Timing) -> Result<Timing> {
        if angle.is_nan() {
            return Err(ServoError::InvalidRequest("angle is NaN".into()).into());
        }
        if timing.step == 0 {
            return Err(ServoError::InvalidRequest("step must be >= 1".into()).into());
        }
        let target = self.geometry.clamp_angle(angle);
        let start = i64::from(self.geometry.angle_to_duty(self.current_angle));
        let end = i64::from(self.geometry.angle_to_duty(target));
        let inc = if end - start > 0 {
            i64::from(timing.step)
        } else {
            -i64::from(timing.step)
        };

        if inc.abs() <= (end - start).abs() {
            let mut value = start;
            while (inc > 0 && value < end) || (inc < 0 && value > end) {
                self.check_stop()?;
                self.write_duty(value)?;
                self.clock.sleep_us(timing.wait_us);
                value += inc;
            }
        }
        self.check_stop()?;
        self.write_duty(end)?;
        self.current_angle = target;
        Ok(timing)
    }

    /// Write the target duty once, without stepping.
    pub fn jump_to(&mut self, angle: f32) -> Result<()> {
        if angle.is_nan() {
            return Err(ServoError::InvalidRequest("angle is NaN".into()).into());
        }
        let target = self.geometry.clamp_angle(angle);
        self.check_stop()?;
        self.write_duty(i64::from(self.geometry.angle_to_duty(target)))?;
        self.current_angle = target;
        Ok(())
    }

    pub fn release(&mut self) -> Result<()> {
        self.pwm
            .release()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
    }

    /// True once the stop flag has been raised.
    pub fn stop_requested(&self) -> bool {
        self.stop.as_ref().is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Sleep on the controller's clock unless a stop is pending.
    pub fn pause(&mut self, d: Duration) -> Result<()> {
        self.check_stop()?;
        self.clock.sleep(d);
        Ok(())
    }

    fn check_stop(&mut self) -> Result<()> {
        if !self.stop_requested() {
            return Ok(());
        }
        if let Err(e) = self.pwm.release() {
            tracing::warn!(error = %e, "pwm release failed on stop");
        } else {
            tracing::warn!(angle = self.current_angle, "stop requested; pwm released");
        }
        Err(ServoError::Interrupted.into())
    }

    fn write_duty(&mut self, value: i64) -> Result<()> {
        let duty = u16::try_from(value)
            .map_err(|_| ServoError::InvalidRequest(format!("duty {value} out of range")))?;
        self.pwm
            .set_duty(duty)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duty_mapping_matches_endpoints() {
        let g = ServoGeometry::default();
        assert_eq!(g.angle_to_duty(90.0), 1500);
        assert_eq!(g.angle_to_duty(0.0), 4500);
        assert_eq!(g.angle_to_duty(-90.0), 7500);
        // (90 - 0.5) * 6000 / 180 + 1500 = 4483.33.. truncated
        assert_eq!(g.angle_to_duty(0.5), 4483);
    }

    #[test]
    fn odd_travel_uses_integer_half() {
        let g = ServoGeometry {
            max_angle: 181,
            min_duty: 1000,
            max_duty: 2000,
        };
        // 181 / 2 == 90 in integer division
        assert_eq!(g.angle_to_duty(0.0), 1497);
        assert_eq!(g.clamp_angle(120.0), 90.5);
        assert_eq!(g.clamp_angle(-120.0), -90.5);
    }

    #[test]
    fn travel_is_measured_between_clamped_ends() {
        let g = ServoGeometry {
            max_angle: 90,
            ..ServoGeometry::default()
        };
        assert_eq!(g.travel(-90.0, 90.0), 90.0);
        assert_eq!(g.travel(30.0, -10.0), 40.0);
        assert_eq!(ServoGeometry::default().travel(-90.0, 90.0), 180.0);
    }
}
