//! Speed verification against an end-of-travel sensor.

use servo_traits::{Clock, EndStop, PwmOutput};

use crate::config::{VerifyPlan, percent_grid};
use crate::controller::ServoController;
use crate::error::Result;
use crate::util::{speed_deg_per_s, wait_until_triggered};

/// Measured speed for one requested percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedMeasurement {
    pub percent: f64,
    pub speed: f64,
}

/// Move `from_angle → to_angle` at each percent speed of `plan` and time the
/// run until `sensor` trips. The servo returns to `from_angle` at full speed
/// between runs.
pub fn measure_percent_sweep<P, C, S>(
    servo: &mut ServoController<P, C>,
    sensor: &mut S,
    plan: &VerifyPlan,
    mut on_measurement: impl FnMut(&SpeedMeasurement),
) -> Result<Vec<SpeedMeasurement>>
where
    P: PwmOutput,
    C: Clock,
    S: EndStop + ?Sized,
{
    let travel = servo.geometry().travel(plan.from_angle, plan.to_angle);
    let mut out = Vec::new();

    servo.go_to_position(plan.from_angle, 100.0)?;
    servo.pause(plan.pause)?;
    for percent in percent_grid(plan.percent_increment) {
        let start = servo.clock().now();
        let timing = servo.go_to_position(plan.to_angle, percent)?;
        wait_until_triggered(sensor, servo.clock(), plan.sensor_timeout, plan.poll_interval)?;
        let elapsed_us = servo.clock().us_since(start);
        if let Some(speed) = speed_deg_per_s(travel, elapsed_us) {
            let m = SpeedMeasurement { percent, speed };
            tracing::info!(percent, speed, step = timing.step, wait_us = timing.wait_us, "measured");
            on_measurement(&m);
            out.push(m);
        }

        servo.pause(plan.pause)?;
        servo.go_to_position(plan.from_angle, 100.0)?;
        servo.pause(plan.pause)?;
    }
    Ok(out)
}
