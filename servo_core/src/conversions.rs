//! Conversions between `servo_config` file types and `servo_core` types.

use std::collections::BTreeMap;
use std::time::Duration;

use servo_config::{ServoEntry, Settings, StepEntry, SampleRow, SweepRow};

use crate::config::{AcquisitionPlan, CalibrationOptions, FitOptions, SweepPlan, VerifyPlan};
use crate::controller::ServoGeometry;
use crate::error::Result;
use crate::model::{FitParams, Sample, StepModel};
use crate::speed::SpeedConfig;
use crate::util::MILLIS_PER_SEC;
use crate::verify::SpeedMeasurement;

// ── Calibration options ──────────────────────────────────────────────────────

impl From<&servo_config::CalibrationCfg> for CalibrationOptions {
    fn from(c: &servo_config::CalibrationCfg) -> Self {
        Self {
            fit: FitOptions {
                initial_guess: FitParams::from(c.initial_guess),
                tolerance: c.tolerance,
                max_iterations: c.max_iterations,
                mae_threshold: c.mae_threshold,
            },
            max_speed_spec: c.max_speed_spec,
        }
    }
}

// ── Motion plans ─────────────────────────────────────────────────────────────

impl From<&Settings> for SweepPlan {
    fn from(s: &Settings) -> Self {
        Self {
            from_angle: s.sweep.from_angle,
            to_angle: s.sweep.to_angle,
            pause: Duration::from_millis(s.sweep.pause_ms),
            percent_increment: s.sweep.percent_increment,
        }
    }
}

impl From<&Settings> for AcquisitionPlan {
    fn from(s: &Settings) -> Self {
        Self {
            from_angle: s.sweep.from_angle,
            to_angle: s.sweep.to_angle,
            max_step: s.acquisition.max_step,
            percent_increment: s.acquisition.percent_increment,
            min_sleep_us: s.acquisition.min_sleep_us,
            max_sleep_us: s.acquisition.max_sleep_us,
            pause: Duration::from_millis(s.sweep.pause_ms),
        }
    }
}

impl From<&Settings> for VerifyPlan {
    fn from(s: &Settings) -> Self {
        Self {
            from_angle: s.sweep.from_angle,
            to_angle: s.sweep.to_angle,
            percent_increment: s.sweep.percent_increment,
            sensor_timeout: Duration::from_millis(s.verify.sensor_timeout_ms),
            poll_interval: Duration::from_micros(s.verify.poll_us),
            pause: Duration::from_millis(s.sweep.pause_ms),
        }
    }
}

// ── Servo params file ────────────────────────────────────────────────────────

impl From<&ServoEntry> for ServoGeometry {
    fn from(e: &ServoEntry) -> Self {
        Self {
            max_angle: e.max_angle,
            min_duty: e.min_duty,
            max_duty: e.max_duty,
        }
    }
}

impl TryFrom<&ServoEntry> for SpeedConfig {
    type Error = eyre::Report;

    /// Uses the persisted `min_speed_d_s..=max_speed_d_s` as the percent range.
    fn try_from(e: &ServoEntry) -> Result<Self> {
        let steps: BTreeMap<u32, StepModel> = e
            .speed_config
            .iter()
            .map(|(&step, s)| {
                (
                    step,
                    StepModel {
                        step,
                        min_speed: s.min_speed,
                        max_speed: s.max_speed,
                        params: FitParams::from(s.params),
                        mae: s.mae,
                    },
                )
            })
            .collect();
        SpeedConfig::new(steps, e.min_speed_d_s, e.max_speed_d_s)
    }
}

impl From<&StepModel> for StepEntry {
    fn from(m: &StepModel) -> Self {
        Self {
            min_speed: m.min_speed,
            max_speed: m.max_speed,
            params: m.params.as_array(),
            mae: m.mae,
        }
    }
}

/// Replace the speed table and range of `entry`, keeping every other field.
pub fn store_speed_config(entry: &mut ServoEntry, config: &SpeedConfig) {
    entry.speed_config = config
        .steps()
        .iter()
        .map(|(&step, m)| (step, StepEntry::from(m)))
        .collect();
    entry.min_speed_d_s = config.min_speed_all();
    entry.max_speed_d_s = config.max_speed_all();
}

// ── CSV rows ─────────────────────────────────────────────────────────────────

impl From<&SampleRow> for Sample {
    fn from(r: &SampleRow) -> Self {
        Self {
            step: r.steps,
            wait_ms: r.waiting_time_s * MILLIS_PER_SEC,
            speed: r.rotation_speed,
        }
    }
}

impl From<&Sample> for SampleRow {
    fn from(s: &Sample) -> Self {
        Self {
            rotation_speed: s.speed,
            steps: s.step,
            waiting_time_s: s.wait_ms / MILLIS_PER_SEC,
        }
    }
}

impl From<&SpeedMeasurement> for SweepRow {
    fn from(m: &SpeedMeasurement) -> Self {
        Self {
            percent_speed: m.percent,
            rotation_speed: m.speed,
        }
    }
}
