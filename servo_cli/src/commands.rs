//! Command execution: settings and params loading, backend assembly, output.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use eyre::WrapErr;
use serde_json::json;
use servo_config::{SampleRow, ServoEntry, ServoParams, Settings, SweepRow};
use servo_core::conversions::store_speed_config;
use servo_core::hw_error::map_hw_error;
use servo_core::{
    AcquisitionPlan, CalibrationOptions, Sample, ServoController, ServoGeometry, SpeedConfig, SweepPlan,
    VerifyPlan,
};

use crate::cli::{Cli, Commands, DEFAULT_CONFIG, RtArgs};
use crate::rt::setup_rt_once;

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
mod backend {
    use super::*;
    use servo_hardware::{SimulatedEndStop, SimulatedPwm};
    use servo_traits::SimClock;

    /// Time charged on the simulated clock for each duty write.
    pub const SIM_WRITE_LATENCY: Duration = Duration::from_micros(20);

    pub type Pwm = SimulatedPwm;
    pub type Clk = SimClock;
    pub type Stop = SimulatedEndStop;

    pub fn open_pwm(_settings: &Settings) -> eyre::Result<(Pwm, Clk)> {
        let clock = SimClock::new();
        let pwm = SimulatedPwm::new().with_clock(clock.clone(), SIM_WRITE_LATENCY);
        tracing::debug!("using simulated pwm");
        Ok((pwm, clock))
    }

    /// Simulated sensor that trips once the PWM lands on `trigger_duty`.
    pub fn open_end_stop(_settings: &Settings, pwm: &Pwm, trigger_duty: u16) -> eyre::Result<Stop> {
        Ok(SimulatedEndStop::new(pwm.log(), trigger_duty))
    }
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
mod backend {
    use super::*;
    use servo_hardware::pwm::{GpioEndStop, HardwarePwm};
    use servo_traits::MonotonicClock;

    pub type Pwm = HardwarePwm;
    pub type Clk = MonotonicClock;
    pub type Stop = GpioEndStop;

    pub fn open_pwm(settings: &Settings) -> eyre::Result<(Pwm, Clk)> {
        let pwm = HardwarePwm::new(settings.servo.pwm_channel, f64::from(settings.servo.frequency_hz))
            .map_err(|e| eyre::Report::new(map_hw_error(&e)))
            .wrap_err("open pwm")?;
        Ok((pwm, MonotonicClock::new()))
    }

    pub fn open_end_stop(settings: &Settings, _pwm: &Pwm, _trigger_duty: u16) -> eyre::Result<Stop> {
        let pin = settings
            .verify
            .sensor_pin
            .ok_or_else(|| eyre::eyre!("invalid configuration: verify.sensor_pin missing"))?;
        GpioEndStop::new(pin)
            .map_err(|e| eyre::Report::new(map_hw_error(&e)))
            .wrap_err("open end-stop")
    }
}

type Servo = ServoController<backend::Pwm, backend::Clk>;

/// Everything a command needs besides its own arguments.
pub struct Context {
    pub settings: Settings,
    pub params_path: PathBuf,
    pub servo_name: String,
    pub json: bool,
    pub stop: Arc<AtomicBool>,
}

/// Read and validate settings from `--config`, `etc/servo.toml`, or defaults.
pub fn load_settings(path: Option<&Path>) -> eyre::Result<Settings> {
    let path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => Some(PathBuf::from(DEFAULT_CONFIG)).filter(|p| p.exists()),
    };
    let settings = match path {
        Some(p) => {
            let text = std::fs::read_to_string(&p).wrap_err_with(|| format!("read config {}", p.display()))?;
            servo_config::load_toml(&text)
                .map_err(|e| eyre::eyre!("invalid configuration in {}: {e}", p.display()))?
        }
        None => {
            tracing::debug!("no config file; using built-in defaults");
            Settings::default()
        }
    };
    settings
        .validate()
        .map_err(|e| eyre::eyre!("invalid configuration: {e}"))?;
    Ok(settings)
}

pub fn run(cli: &Cli, ctx: &Context) -> eyre::Result<()> {
    match &cli.cmd {
        Commands::Calibrate { samples, dry_run } => calibrate(ctx, samples, *dry_run),
        Commands::Plan { percent } => plan(ctx, *percent),
        Commands::Move { angle, percent, rt } => move_to(ctx, *angle, *percent, *rt),
        Commands::Sweep { rt } => sweep(ctx, *rt),
        Commands::Acquire { out, rt } => acquire(ctx, out, *rt),
        Commands::Verify { out, rt } => verify(ctx, out, *rt),
        Commands::Linearity { csv } => linearity(ctx, csv),
        Commands::SelfCheck => self_check(ctx),
    }
}

fn load_entry(ctx: &Context) -> eyre::Result<ServoEntry> {
    let params = servo_config::load_params_json(&ctx.params_path)?;
    params.entry(&ctx.servo_name).cloned()
}

fn open_servo(ctx: &Context, entry: &ServoEntry, with_speed: bool) -> eyre::Result<Servo> {
    let (pwm, clock) = backend::open_pwm(&ctx.settings)?;
    build_servo(ctx, entry, pwm, clock, with_speed)
}

fn build_servo(
    ctx: &Context,
    entry: &ServoEntry,
    pwm: backend::Pwm,
    clock: backend::Clk,
    with_speed: bool,
) -> eyre::Result<Servo> {
    let mut servo = ServoController::new(pwm, clock, ServoGeometry::from(entry)).with_stop_flag(ctx.stop.clone());
    if with_speed {
        servo = servo.with_speed_config(SpeedConfig::try_from(entry)?);
    }
    Ok(servo)
}

fn emit(ctx: &Context, value: &serde_json::Value, text: impl FnOnce() -> String) {
    if ctx.json {
        println!("{value}");
    } else {
        println!("{}", text());
    }
}

fn settle(ctx: &Context) -> Duration {
    Duration::from_millis(ctx.settings.servo.settle_ms)
}

fn calibrate(ctx: &Context, samples_path: &Path, dry_run: bool) -> eyre::Result<()> {
    let rows = servo_config::load_samples_csv(samples_path)?;
    let samples: Vec<Sample> = rows.iter().map(Sample::from).collect();
    let opts = CalibrationOptions::from(&ctx.settings.calibration);
    let report = servo_core::calibrate(&samples, &opts)?;

    if !dry_run {
        let mut params = if ctx.params_path.exists() {
            servo_config::load_params_json(&ctx.params_path)?
        } else {
            ServoParams::default()
        };
        store_speed_config(params.entry_mut_or_default(&ctx.servo_name), &report.config);
        servo_config::save_params_json(&ctx.params_path, &params)?;
        tracing::info!(path = %ctx.params_path.display(), servo = %ctx.servo_name, "params written");
    }

    let steps: Vec<_> = report
        .config
        .steps()
        .values()
        .map(|m| {
            json!({
                "step": m.step,
                "min_speed": m.min_speed,
                "max_speed": m.max_speed,
                "params": m.params.as_array(),
                "mae": m.mae,
            })
        })
        .collect();
    let value = json!({
        "samples": samples.len(),
        "over_spec": report.over_spec,
        "trimmed": report.trimmed,
        "fitted": report.fitted.keys().collect::<Vec<_>>(),
        "excluded": report.excluded,
        "selected": steps,
        "min_speed_d_s": report.config.min_speed_all(),
        "max_speed_d_s": report.config.max_speed_all(),
        "gaps": report.gaps,
        "written": !dry_run,
    });
    emit(ctx, &value, || {
        let mut s = format!(
            "calibrated {} steps from {} samples ({} over max speed, {} trimmed, excluded {:?})\n",
            report.fitted.len(),
            samples.len(),
            report.over_spec,
            report.trimmed,
            report.excluded
        );
        for m in report.config.steps().values() {
            s.push_str(&format!(
                "  step {:>2}: {:8.3} ..= {:8.3} deg/s  a={:.4} b={:.4} mae={:.3}\n",
                m.step, m.min_speed, m.max_speed, m.params.a, m.params.b, m.mae
            ));
        }
        s.push_str(&format!(
            "speed range {:.3} ..= {:.3} deg/s",
            report.config.min_speed_all(),
            report.config.max_speed_all()
        ));
        for (lo, hi) in &report.gaps {
            s.push_str(&format!("\nwarning: no step covers {lo:.3} .. {hi:.3} deg/s"));
        }
        if dry_run {
            s.push_str("\ndry run: params not written");
        }
        s
    });
    Ok(())
}

fn plan(ctx: &Context, percent: f64) -> eyre::Result<()> {
    let entry = load_entry(ctx)?;
    let config = SpeedConfig::try_from(&entry)?;
    let speed = config.percent_to_speed(percent)?;
    let timing = config.timing_for_speed(speed)?;
    let value = json!({
        "percent": percent,
        "speed": speed,
        "step": timing.step,
        "wait_us": timing.wait_us,
    });
    emit(ctx, &value, || {
        format!(
            "{percent}% -> {speed:.3} deg/s: step {} wait {} us",
            timing.step, timing.wait_us
        )
    });
    Ok(())
}

fn move_to(ctx: &Context, angle: f32, percent: f64, rt: RtArgs) -> eyre::Result<()> {
    let entry = load_entry(ctx)?;
    let mut servo = open_servo(ctx, &entry, true)?;
    setup_rt_once(rt);
    servo.home(settle(ctx))?;
    let timing = servo.go_to_position(angle, percent)?;
    let value = json!({
        "angle": servo.current_angle(),
        "percent": percent,
        "step": timing.step,
        "wait_us": timing.wait_us,
    });
    emit(ctx, &value, || {
        format!(
            "moved to {:.1} deg at {percent}% (step {} wait {} us)",
            servo.current_angle(),
            timing.step,
            timing.wait_us
        )
    });
    Ok(())
}

fn sweep(ctx: &Context, rt: RtArgs) -> eyre::Result<()> {
    let entry = load_entry(ctx)?;
    let mut servo = open_servo(ctx, &entry, true)?;
    setup_rt_once(rt);
    let plan = SweepPlan::from(&ctx.settings);
    let used = servo_core::run_sweep(&mut servo, &plan)?;
    servo.release()?;
    for (percent, timing) in &used {
        let value = json!({ "percent": percent, "step": timing.step, "wait_us": timing.wait_us });
        emit(ctx, &value, || {
            format!("{percent:>5}%: step {} wait {} us", timing.step, timing.wait_us)
        });
    }
    Ok(())
}

fn acquire(ctx: &Context, out: &Path, rt: RtArgs) -> eyre::Result<()> {
    let entry = match load_entry(ctx) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(error = %e, "no params entry; using default geometry");
            ServoEntry::default()
        }
    };
    let mut servo = open_servo(ctx, &entry, false)?;
    setup_rt_once(rt);
    let plan = AcquisitionPlan::from(&ctx.settings);
    tracing::info!(runs = plan.run_count(), "acquisition started");
    let samples = servo_core::acquire_samples(&mut servo, &plan, |s| {
        tracing::info!(step = s.step, wait_ms = s.wait_ms, speed = s.speed, "sample");
    })?;
    servo.release()?;
    let rows: Vec<SampleRow> = samples.iter().map(SampleRow::from).collect();
    servo_config::write_samples_csv(out, &rows)?;
    let value = json!({ "samples": rows.len(), "out": out.display().to_string() });
    emit(ctx, &value, || format!("wrote {} samples to {}", rows.len(), out.display()));
    Ok(())
}

fn verify(ctx: &Context, out: &Path, rt: RtArgs) -> eyre::Result<()> {
    let entry = load_entry(ctx)?;
    let plan = VerifyPlan::from(&ctx.settings);
    let geometry = ServoGeometry::from(&entry);
    let trigger = geometry.angle_to_duty(geometry.clamp_angle(plan.to_angle));
    let (pwm, clock) = backend::open_pwm(&ctx.settings)?;
    let mut sensor = backend::open_end_stop(&ctx.settings, &pwm, trigger)?;
    let mut servo = build_servo(ctx, &entry, pwm, clock, true)?;
    setup_rt_once(rt);
    let measured = servo_core::measure_percent_sweep(&mut servo, &mut sensor, &plan, |_| {})?;
    servo.release()?;
    let rows: Vec<SweepRow> = measured.iter().map(SweepRow::from).collect();
    servo_config::write_sweep_csv(out, &rows)?;

    let points: Vec<(f64, f64)> = rows.iter().map(|r| (r.percent_speed, r.rotation_speed)).collect();
    let fit = servo_core::linear_fit(&points).ok();
    let value = json!({
        "measurements": rows.len(),
        "out": out.display().to_string(),
        "slope": fit.map(|f| f.slope),
        "intercept": fit.map(|f| f.intercept),
        "r": fit.and_then(|f| f.pearson_r),
    });
    emit(ctx, &value, || {
        let mut s = String::new();
        for r in &rows {
            s.push_str(&format!("{:>5}%: {:8.3} deg/s\n", r.percent_speed, r.rotation_speed));
        }
        s.push_str(&format!("wrote {} measurements to {}", rows.len(), out.display()));
        s
    });
    Ok(())
}

fn linearity(ctx: &Context, csv: &Path) -> eyre::Result<()> {
    let rows = servo_config::load_sweep_csv(csv)?;
    let points: Vec<(f64, f64)> = rows.iter().map(|r| (r.percent_speed, r.rotation_speed)).collect();
    let fit = servo_core::linear_fit(&points)?;
    let value = json!({
        "points": points.len(),
        "slope": fit.slope,
        "intercept": fit.intercept,
        "r": fit.pearson_r,
    });
    emit(ctx, &value, || {
        let r = fit.pearson_r.map_or_else(|| "n/a".to_string(), |r| format!("{r:.4}"));
        format!(
            "speed = {:.4} * percent + {:.4} deg/s (r = {r}, {} points)",
            fit.slope,
            fit.intercept,
            points.len()
        )
    });
    Ok(())
}

fn self_check(ctx: &Context) -> eyre::Result<()> {
    let entry = load_entry(ctx)?;
    let config = SpeedConfig::try_from(&entry)?;
    let (mut pwm, _clock) = backend::open_pwm(&ctx.settings)?;
    servo_traits::PwmOutput::release(&mut pwm).map_err(|e| eyre::Report::new(map_hw_error(&*e)))?;
    let gaps = config.coverage_gaps();
    for (lo, hi) in &gaps {
        tracing::warn!(lo, hi, "speed range not covered");
    }
    let value = json!({
        "ok": true,
        "servo": ctx.servo_name,
        "steps": config.steps().keys().collect::<Vec<_>>(),
        "min_speed_d_s": config.min_speed_all(),
        "max_speed_d_s": config.max_speed_all(),
        "gaps": gaps,
    });
    emit(ctx, &value, || {
        let mut s = format!(
            "ok: servo {:?}, steps {:?}, {:.3} ..= {:.3} deg/s",
            ctx.servo_name,
            config.steps().keys().collect::<Vec<_>>(),
            config.min_speed_all(),
            config.max_speed_all()
        );
        for (lo, hi) in &gaps {
            s.push_str(&format!("\nwarning: no step covers {lo:.3} .. {hi:.3} deg/s"));
        }
        s
    });
    Ok(())
}
