//! Runtime option structs for calibration and motion plans.
//!
//! These are separate from the TOML-deserialized settings in `servo_config`;
//! see `conversions` for the mapping.

use std::time::Duration;

use crate::model::FitParams;

/// Options for one per-step fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Starting point for the minimiser.
    pub initial_guess: FitParams,
    /// Convergence tolerance on both objective spread and simplex size.
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Accept a fit once its mean absolute error is at most this (deg/s).
    pub mae_threshold: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            initial_guess: FitParams::new(290.0, 2.0),
            tolerance: 1e-10,
            max_iterations: 4000,
            mae_threshold: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationOptions {
    pub fit: FitOptions,
    /// Samples faster than this (deg/s) are discarded before fitting.
    pub max_speed_spec: f64,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            fit: FitOptions::default(),
            max_speed_spec: 600.0,
        }
    }
}

/// Back-and-forth demo between two angles at increasing percent speeds.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPlan {
    pub from_angle: f32,
    pub to_angle: f32,
    /// Pause at each end of travel.
    pub pause: Duration,
    pub percent_increment: u32,
}

impl Default for SweepPlan {
    fn default() -> Self {
        Self {
            from_angle: -90.0,
            to_angle: 90.0,
            pause: Duration::from_millis(1000),
            percent_increment: 10,
        }
    }
}

/// Grid of (step, wait) pairs to time across the sweep range.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionPlan {
    pub from_angle: f32,
    pub to_angle: f32,
    /// Steps `1..=max_step` are measured.
    pub max_step: u32,
    /// Wait grid spacing, in percent of `min_sleep_us..max_sleep_us`.
    pub percent_increment: u32,
    pub min_sleep_us: u64,
    pub max_sleep_us: u64,
    /// Pause after each run and after each return.
    pub pause: Duration,
}

impl Default for AcquisitionPlan {
    fn default() -> Self {
        Self {
            from_angle: -90.0,
            to_angle: 90.0,
            max_step: 19,
            percent_increment: 5,
            min_sleep_us: 20,
            max_sleep_us: 4000,
            pause: Duration::from_millis(1000),
        }
    }
}

/// Percent-speed sweep timed against an end-of-travel sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyPlan {
    pub from_angle: f32,
    pub to_angle: f32,
    pub percent_increment: u32,
    pub sensor_timeout: Duration,
    pub poll_interval: Duration,
    pub pause: Duration,
}

impl Default for VerifyPlan {
    fn default() -> Self {
        Self {
            from_angle: -90.0,
            to_angle: 90.0,
            percent_increment: 10,
            sensor_timeout: Duration::from_millis(5000),
            poll_interval: Duration::from_micros(10),
            pause: Duration::from_millis(1000),
        }
    }
}

/// Percent values `0, inc, 2*inc, …` up to and including 100.
pub fn percent_grid(increment: u32) -> Vec<f64> {
    let inc = increment.clamp(1, 100);
    let mut out: Vec<f64> = (0..=100).step_by(inc as usize).map(f64::from).collect();
    if out.last() != Some(&100.0) {
        out.push(100.0);
    }
    out
}
