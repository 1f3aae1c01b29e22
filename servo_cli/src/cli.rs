//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

/// Flush guard of the log file writer; taken and dropped before exit.
pub static FILE_GUARD: Mutex<Option<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(None);
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

pub const DEFAULT_CONFIG: &str = "etc/servo.toml";

#[derive(Parser, Debug)]
#[command(name = "servo", version, about = "Servo speed calibration and control")]
pub struct Cli {
    /// Path to settings TOML (default: etc/servo.toml, built-in defaults if absent)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Servo parameter JSON (duty range and calibrated speed table)
    #[arg(long, value_name = "FILE", default_value = "params/servo_params.json")]
    pub params: PathBuf,

    /// Servo entry name in the params file (overrides [servo].name)
    #[arg(long, value_name = "NAME")]
    pub servo: Option<String>,

    /// Log and print results as JSON lines instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct RtArgs {
    /// Enable real-time mode (SCHED_FIFO, mlockall)
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Enable real-time mode on Linux.\n\nAttempts SCHED_FIFO priority and calls mlockall to keep the process resident, which reduces jitter in the per-increment waits. May require CAP_SYS_NICE/CAP_IPC_LOCK or root. Failures are logged and the move continues without real-time scheduling."
    )]
    pub rt: bool,
    /// SCHED_FIFO priority when --rt is enabled (clamped to the system range)
    #[arg(long, value_name = "PRIO")]
    pub rt_prio: Option<i32>,
    /// Memory locking mode for --rt
    #[arg(long, value_enum, value_name = "MODE", default_value = "current")]
    pub rt_lock: RtLock,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fit the speed table from timing samples and store it in the params file
    Calibrate {
        /// Sample CSV (rotation_speed(deg/s),steps,waiting_time(s))
        #[arg(long, value_name = "FILE")]
        samples: PathBuf,
        /// Print the result without writing the params file
        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,
    },
    /// Show the step and wait chosen for a percent speed
    Plan {
        /// Percent of the calibrated speed range (clamped to 0..=100)
        #[arg(long, allow_negative_numbers = true)]
        percent: f64,
    },
    /// Move to an angle at a percent speed
    Move {
        /// Target angle in degrees (0 = centre)
        #[arg(long, allow_negative_numbers = true)]
        angle: f32,
        /// Percent of the calibrated speed range
        #[arg(long, allow_negative_numbers = true)]
        percent: f64,
        #[command(flatten)]
        rt: RtArgs,
    },
    /// Back-and-forth demo at increasing percent speeds
    Sweep {
        #[command(flatten)]
        rt: RtArgs,
    },
    /// Time fixed (step, wait) sweeps and write a sample CSV
    Acquire {
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
        #[command(flatten)]
        rt: RtArgs,
    },
    /// Time percent-speed sweeps against the end-stop and write a CSV
    Verify {
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
        #[command(flatten)]
        rt: RtArgs,
    },
    /// Fit a line through a verification CSV
    Linearity {
        #[arg(long, value_name = "FILE")]
        csv: PathBuf,
    },
    /// Validate settings and params, open the PWM and report coverage
    SelfCheck,
}
