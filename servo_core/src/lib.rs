#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Servo speed calibration and stepped PWM motion (hardware-agnostic).
//!
//! All hardware interactions go through `servo_traits::PwmOutput`,
//! `servo_traits::EndStop` and `servo_traits::Clock`.
//!
//! ## Architecture
//!
//! - **Model**: `speed = a / wait_ms + b` per step (`model`)
//! - **Fit**: Nelder–Mead least squares with shortest-wait trimming (`fit`)
//! - **Selection**: minimal set of steps spanning the speed range (`selection`)
//! - **Calibration**: samples → [`SpeedConfig`] (`calibration`)
//! - **Lookup**: percent → (step, wait) (`speed`)
//! - **Motion**: duty stepping with interrupt release (`controller`)
//! - **Runs**: acquisition, verification and the demo sweep
//!
//! ## Units
//!
//! Fits use wait times in milliseconds; the device sleeps in microseconds.
//! `wait_us = round(a / (speed - b) * 1000)`.

pub mod acquisition;
pub mod calibration;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod fit;
pub mod hw_error;
pub mod linearity;
pub mod model;
pub mod selection;
pub mod speed;
pub mod sweep;
pub mod util;
pub mod verify;

pub use acquisition::acquire_samples;
pub use calibration::{CalibrationReport, calibrate};
pub use config::{AcquisitionPlan, CalibrationOptions, FitOptions, SweepPlan, VerifyPlan};
pub use controller::{ServoController, ServoGeometry};
pub use error::{Result, ServoError};
pub use fit::{fit_model, fit_with_trimming};
pub use linearity::{LinearFit, linear_fit};
pub use model::{FitParams, Sample, StepModel};
pub use selection::select_covering_steps;
pub use speed::{SpeedConfig, Timing};
pub use sweep::run_sweep;
pub use verify::{SpeedMeasurement, measure_percent_sweep};
