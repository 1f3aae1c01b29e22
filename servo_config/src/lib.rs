#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and file formats for the servo speed tooling.
//!
//! - `Settings` and sub-structs are deserialized from TOML and validated.
//! - `params` holds the JSON servo parameter file (per-servo duty range and
//!   the calibrated speed table).
//! - Sample and sweep CSV loaders enforce exact headers.
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod params;

pub use params::{ServoEntry, ServoParams, StepEntry, load_params_json, parse_params_json, save_params_json};

/// Timing sample CSV schema, one row per (step, wait) run.
///
/// Expected headers:
/// rotation_speed(deg/s),steps,waiting_time(s)
///
/// The `rotation_speed(°/s)` spelling written by older acquisition firmware is
/// accepted on read.
///
/// Example:
/// rotation_speed(deg/s),steps,waiting_time(s)
/// 98.4,1,0.00102
/// 412.0,4,0.00002
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct SampleRow {
    #[serde(rename = "rotation_speed(deg/s)", alias = "rotation_speed(°/s)")]
    pub rotation_speed: f64,
    pub steps: u32,
    #[serde(rename = "waiting_time(s)")]
    pub waiting_time_s: f64,
}

pub const SAMPLE_HEADERS: [&str; 3] = ["rotation_speed(deg/s)", "steps", "waiting_time(s)"];
const SAMPLE_HEADERS_LEGACY: [&str; 3] = ["rotation_speed(°/s)", "steps", "waiting_time(s)"];

/// Speed verification CSV schema: measured speed for a requested percent.
///
/// Expected headers:
/// percent_speed,rotation_speed(deg/s)
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct SweepRow {
    pub percent_speed: f64,
    #[serde(rename = "rotation_speed(deg/s)", alias = "rotation_speed(°/s)")]
    pub rotation_speed: f64,
}

pub const SWEEP_HEADERS: [&str; 2] = ["percent_speed", "rotation_speed(deg/s)"];
const SWEEP_HEADERS_LEGACY: [&str; 2] = ["percent_speed", "rotation_speed(°/s)"];

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Accept a step's fit once its mean absolute error is at most this (deg/s)
    pub mae_threshold: f64,
    /// Samples faster than the servo datasheet allows are discarded
    pub max_speed_spec: f64,
    /// Starting point `[a, b]` for the minimiser
    pub initial_guess: [f64; 2],
    /// Convergence tolerance on both objective spread and simplex size
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            mae_threshold: 5.0,
            max_speed_spec: 600.0,
            initial_guess: [290.0, 2.0],
            tolerance: 1e-10,
            max_iterations: 4000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServoCfg {
    /// Entry name in the JSON params file
    pub name: String,
    /// Hardware PWM channel (0 or 1)
    pub pwm_channel: u8,
    pub frequency_hz: u32,
    /// Pause after homing at start-up
    pub settle_ms: u64,
}

impl Default for ServoCfg {
    fn default() -> Self {
        Self {
            name: "servo_1".to_string(),
            pwm_channel: 0,
            frequency_hz: 50,
            settle_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SweepCfg {
    pub from_angle: f32,
    pub to_angle: f32,
    /// Pause at each end of a sweep
    pub pause_ms: u64,
    pub percent_increment: u32,
}

impl Default for SweepCfg {
    fn default() -> Self {
        Self {
            from_angle: -90.0,
            to_angle: 90.0,
            pause_ms: 1000,
            percent_increment: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AcquisitionCfg {
    /// Steps 1..=max_step are measured
    pub max_step: u32,
    /// Wait-time grid spacing in percent of the sleep range
    pub percent_increment: u32,
    pub min_sleep_us: u64,
    pub max_sleep_us: u64,
}

impl Default for AcquisitionCfg {
    fn default() -> Self {
        Self {
            max_step: 19,
            percent_increment: 5,
            min_sleep_us: 20,
            max_sleep_us: 4000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VerifyCfg {
    /// GPIO of the photo interrupter at the end of travel
    pub sensor_pin: Option<u8>,
    pub sensor_timeout_ms: u64,
    pub poll_us: u64,
}

impl Default for VerifyCfg {
    fn default() -> Self {
        Self {
            sensor_pin: None,
            sensor_timeout_ms: 5000,
            poll_us: 10,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub calibration: CalibrationCfg,
    pub servo: ServoCfg,
    pub sweep: SweepCfg,
    pub acquisition: AcquisitionCfg,
    pub verify: VerifyCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Settings, toml::de::Error> {
    toml::from_str::<Settings>(s)
}

impl Settings {
    pub fn validate(&self) -> eyre::Result<()> {
        // Calibration
        let c = &self.calibration;
        if !(c.mae_threshold.is_finite() && c.mae_threshold > 0.0) {
            eyre::bail!("calibration.mae_threshold must be > 0");
        }
        if !(c.max_speed_spec.is_finite() && c.max_speed_spec > 0.0) {
            eyre::bail!("calibration.max_speed_spec must be > 0");
        }
        if c.initial_guess.iter().any(|v| !v.is_finite()) {
            eyre::bail!("calibration.initial_guess must be finite");
        }
        if !(c.tolerance.is_finite() && c.tolerance > 0.0) {
            eyre::bail!("calibration.tolerance must be > 0");
        }
        if c.max_iterations == 0 {
            eyre::bail!("calibration.max_iterations must be >= 1");
        }

        // Servo
        if self.servo.name.trim().is_empty() {
            eyre::bail!("servo.name must not be empty");
        }
        if self.servo.pwm_channel > 1 {
            eyre::bail!("servo.pwm_channel must be 0 or 1");
        }
        if self.servo.frequency_hz == 0 {
            eyre::bail!("servo.frequency_hz must be > 0");
        }
        if self.servo.settle_ms > 60 * 1000 {
            eyre::bail!("servo.settle_ms is unreasonably large (>1min)");
        }

        // Sweep
        if self.sweep.from_angle == self.sweep.to_angle {
            eyre::bail!("sweep.from_angle and sweep.to_angle must differ");
        }
        if self.sweep.percent_increment == 0 || self.sweep.percent_increment > 100 {
            eyre::bail!("sweep.percent_increment must be in [1, 100]");
        }

        // Acquisition
        let a = &self.acquisition;
        if a.max_step == 0 {
            eyre::bail!("acquisition.max_step must be >= 1");
        }
        if a.percent_increment == 0 || a.percent_increment > 100 {
            eyre::bail!("acquisition.percent_increment must be in [1, 100]");
        }
        if a.min_sleep_us == 0 {
            eyre::bail!("acquisition.min_sleep_us must be >= 1");
        }
        if a.max_sleep_us < a.min_sleep_us {
            eyre::bail!("acquisition.max_sleep_us must be >= acquisition.min_sleep_us");
        }

        // Verify
        if self.verify.sensor_timeout_ms == 0 {
            eyre::bail!("verify.sensor_timeout_ms must be >= 1");
        }
        if self.verify.poll_us == 0 {
            eyre::bail!("verify.poll_us must be >= 1");
        }

        Ok(())
    }
}

fn check_headers(
    rdr: &mut csv::Reader<std::fs::File>,
    path: &Path,
    accepted: &[&[&str]],
) -> eyre::Result<()> {
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<&str> = headers.iter().collect();
    if !accepted.iter().any(|exp| *exp == actual.as_slice()) {
        eyre::bail!(
            "CSV {:?} must have headers '{}', got: {}",
            path,
            accepted[0].join(","),
            actual.join(",")
        );
    }
    Ok(())
}

fn read_rows<T: for<'de> Deserialize<'de>>(
    path: &Path,
    accepted: &[&[&str]],
) -> eyre::Result<Vec<T>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open CSV {:?}: {}", path, e))?;
    check_headers(&mut rdr, path, accepted)?;

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<T>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    Ok(rows)
}

/// Load timing samples, rejecting non-finite or non-positive measurements.
pub fn load_samples_csv(path: &Path) -> eyre::Result<Vec<SampleRow>> {
    let rows: Vec<SampleRow> = read_rows(path, &[&SAMPLE_HEADERS, &SAMPLE_HEADERS_LEGACY])?;
    for (idx, row) in rows.iter().enumerate() {
        if row.steps == 0 {
            eyre::bail!("invalid CSV row {}: steps must be >= 1", idx + 2);
        }
        if !(row.waiting_time_s.is_finite() && row.waiting_time_s > 0.0) {
            eyre::bail!("invalid CSV row {}: waiting_time(s) must be > 0", idx + 2);
        }
        if !(row.rotation_speed.is_finite() && row.rotation_speed > 0.0) {
            eyre::bail!("invalid CSV row {}: rotation_speed must be > 0", idx + 2);
        }
    }
    Ok(rows)
}

pub fn load_sweep_csv(path: &Path) -> eyre::Result<Vec<SweepRow>> {
    read_rows(path, &[&SWEEP_HEADERS, &SWEEP_HEADERS_LEGACY])
}

fn write_rows<T: Serialize>(path: &Path, headers: &[&str], rows: &[T]) -> eyre::Result<()> {
    // Header written explicitly so an empty run still yields a loadable file
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| eyre::eyre!("create CSV {:?}: {}", path, e))?;
    wtr.write_record(headers)
        .map_err(|e| eyre::eyre!("write CSV {:?}: {}", path, e))?;
    for row in rows {
        wtr.serialize(row)
            .map_err(|e| eyre::eyre!("write CSV {:?}: {}", path, e))?;
    }
    wtr.flush()
        .map_err(|e| eyre::eyre!("flush CSV {:?}: {}", path, e))?;
    Ok(())
}

pub fn write_samples_csv(path: &Path, rows: &[SampleRow]) -> eyre::Result<()> {
    write_rows(path, &SAMPLE_HEADERS, rows)
}

pub fn write_sweep_csv(path: &Path, rows: &[SweepRow]) -> eyre::Result<()> {
    write_rows(path, &SWEEP_HEADERS, rows)
}
