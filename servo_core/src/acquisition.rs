//! Timing-sample acquisition: time fixed (step, wait) sweeps across the range.

use servo_traits::{Clock, PwmOutput};

use crate::config::AcquisitionPlan;
use crate::controller::ServoController;
use crate::error::{Result, ServoError};
use crate::model::Sample;
use crate::speed::Timing;
use crate::util::{speed_deg_per_s, us_to_ms};

impl AcquisitionPlan {
    /// Wait grid `round((max - min) * p / 100 + min)` for `p = 0, inc, … < 100`.
    pub fn wait_grid_us(&self) -> Vec<u64> {
        let inc = self.percent_increment.clamp(1, 100) as usize;
        let span = self.max_sleep_us.saturating_sub(self.min_sleep_us) as f64;
        (0..100u32)
            .step_by(inc)
            .map(|p| (span * f64::from(p) / 100.0 + self.min_sleep_us as f64).round() as u64)
            .collect()
    }

    pub fn run_count(&self) -> usize {
        self.max_step as usize * self.wait_grid_us().len()
    }
}

/// Sweep `from_angle → to_angle` for every step and wait in `plan`.
///
/// The servo jumps back to `from_angle` between runs. `on_sample` sees each
/// sample as it is measured (for progress output); the full set is returned.
pub fn acquire_samples<P, C>(
    servo: &mut ServoController<P, C>,
    plan: &AcquisitionPlan,
    mut on_sample: impl FnMut(&Sample),
) -> Result<Vec<Sample>>
where
    P: PwmOutput,
    C: Clock,
{
    if plan.max_step == 0 {
        return Err(ServoError::InvalidRequest("max_step must be >= 1".into()).into());
    }
    let travel = servo.geometry().travel(plan.from_angle, plan.to_angle);
    let waits = plan.wait_grid_us();
    let mut samples = Vec::with_capacity(plan.run_count());

    servo.jump_to(plan.from_angle)?;
    servo.pause(plan.pause)?;
    for step in 1..=plan.max_step {
        for &wait_us in &waits {
            let start = servo.clock().now();
            servo.move_with_timing(plan.to_angle, Timing { step, wait_us })?;
            let elapsed_us = servo.clock().us_since(start);
            let Some(speed) = speed_deg_per_s(travel, elapsed_us) else {
                tracing::warn!(step, wait_us, "run took no measurable time; skipped");
                continue;
            };
            let sample = Sample {
                step,
                wait_ms: us_to_ms(wait_us),
                speed,
            };
            tracing::debug!(step, wait_us, speed, "sample");
            on_sample(&sample);
            samples.push(sample);

            servo.pause(plan.pause)?;
            servo.jump_to(plan.from_angle)?;
            servo.pause(plan.pause)?;
        }
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_grid_excludes_full_range() {
        let plan = AcquisitionPlan {
            percent_increment: 25,
            min_sleep_us: 20,
            max_sleep_us: 4000,
            ..AcquisitionPlan::default()
        };
        assert_eq!(plan.wait_grid_us(), vec![20, 1015, 2010, 3005]);
    }

    #[test]
    fn default_grid_has_twenty_points() {
        let plan = AcquisitionPlan::default();
        let grid = plan.wait_grid_us();
        assert_eq!(grid.len(), 20);
        assert_eq!(grid[0], 20);
        assert_eq!(grid[19], 3801);
        assert_eq!(plan.run_count(), 19 * 20);
    }
}
