//! Demo sweep: back and forth at increasing percent speeds.

use servo_traits::{Clock, PwmOutput};

use crate::config::{SweepPlan, percent_grid};
use crate::controller::ServoController;
use crate::error::Result;
use crate::speed::Timing;

/// Home to `from_angle` at full speed, then for each percent speed move to
/// `to_angle`, pause and return. Returns the timing used for every outbound
/// move.
pub fn run_sweep<P, C>(servo: &mut ServoController<P, C>, plan: &SweepPlan) -> Result<Vec<(f64, Timing)>>
where
    P: PwmOutput,
    C: Clock,
{
    let mut used = Vec::new();
    servo.go_to_position(plan.from_angle, 100.0)?;
    servo.pause(plan.pause)?;
    for percent in percent_grid(plan.percent_increment) {
        let timing = servo.go_to_position(plan.to_angle, percent)?;
        tracing::info!(percent, step = timing.step, wait_us = timing.wait_us, "sweep");
        used.push((percent, timing));
        servo.pause(plan.pause)?;
        servo.go_to_position(plan.from_angle, 100.0)?;
        servo.pause(plan.pause)?;
    }
    Ok(used)
}
