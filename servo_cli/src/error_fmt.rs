//! Human-readable error descriptions, exit codes and structured JSON errors.

use servo_core::ServoError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(se) = err.downcast_ref::<ServoError>() {
        return match se {
            ServoError::NoCoveringStep { speed } => format!(
                "What happened: No calibrated step covers {speed:.3} deg/s.\nLikely causes: The speed table has a gap, or the persisted speed range is wider than the steps cover.\nHow to fix: Run `servo self-check` to list gaps, then re-acquire samples and `servo calibrate`."
            ),
            ServoError::InvalidModel { step, speed } => format!(
                "What happened: The model for step {step} cannot produce {speed:.3} deg/s.\nLikely causes: A corrupt or hand-edited speed table in the params file.\nHow to fix: Re-run `servo calibrate` to regenerate the table."
            ),
            ServoError::EmptySpeedConfig => {
                "What happened: The servo has no calibrated speed table.\nLikely causes: The params entry was never calibrated.\nHow to fix: Run `servo acquire` and `servo calibrate` first.".to_string()
            }
            ServoError::NoUsableSteps => {
                "What happened: No step produced an acceptable fit.\nLikely causes: Too few samples per step, samples above calibration.max_speed_spec, or very noisy timing.\nHow to fix: Check the samples CSV, raise calibration.mae_threshold, or re-acquire.".to_string()
            }
            ServoError::Interrupted => {
                "What happened: Motion was interrupted and the PWM was released.\nLikely causes: Ctrl-C or a stop request during a move.\nHow to fix: Start a new run; the servo position is unknown until it is homed.".to_string()
            }
            ServoError::Timeout => {
                "What happened: The end-stop did not trigger in time.\nLikely causes: Sensor not wired, wrong verify.sensor_pin, or the sweep does not reach the sensor.\nHow to fix: Check the wiring and sweep.to_angle, or raise verify.sensor_timeout_ms.".to_string()
            }
            ServoError::Hardware(msg) | ServoError::HardwareFault(msg) => format!(
                "What happened: Hardware error ({msg}).\nLikely causes: PWM not enabled in the device tree, wrong channel, or insufficient permissions.\nHow to fix: Check servo.pwm_channel and that the process can access /sys/class/pwm."
            ),
            ServoError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML or params file.\nHow to fix: Edit the file, then rerun."
            ),
            ServoError::InvalidRequest(msg) => format!(
                "What happened: Invalid request ({msg}).\nLikely causes: A NaN or out-of-range argument.\nHow to fix: Check the command arguments."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("must have headers") {
        if lower.contains("percent_speed") {
            return "Invalid headers in sweep CSV. Expected 'percent_speed,rotation_speed(deg/s)'.".to_string();
        }
        return "Invalid headers in samples CSV. Expected 'rotation_speed(deg/s),steps,waiting_time(s)'.".to_string();
    }

    if lower.contains("invalid configuration") {
        return format!(
            "What happened: Configuration is invalid or incomplete.\nLikely causes: Out-of-range values or a typo in the TOML.\nHow to fix: Edit the config file and try again. Detail: {msg}"
        );
    }

    if lower.contains("servo params") || lower.contains("not found in params") {
        return format!(
            "What happened: The servo params file could not be used.\nLikely causes: Missing file, wrong --params path, or unknown --servo name.\nHow to fix: Point --params at a valid file or run `servo calibrate` to create it. Detail: {msg}"
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable name for a `ServoError` variant, used in JSON errors.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<ServoError>() {
        Some(ServoError::NoCoveringStep { .. }) => "NoCoveringStep",
        Some(ServoError::InvalidModel { .. }) => "InvalidModel",
        Some(ServoError::EmptySpeedConfig) => "EmptySpeedConfig",
        Some(ServoError::NoUsableSteps) => "NoUsableSteps",
        Some(ServoError::Interrupted) => "Interrupted",
        Some(ServoError::Timeout) => "Timeout",
        Some(ServoError::Hardware(_) | ServoError::HardwareFault(_)) => "Hardware",
        Some(ServoError::Config(_)) => "Config",
        Some(ServoError::InvalidRequest(_)) => "InvalidRequest",
        None => "Error",
    }
}

/// Exit code per error class; anything untyped exits with 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<ServoError>() {
        Some(ServoError::NoCoveringStep { .. } | ServoError::InvalidModel { .. }) => 3,
        Some(ServoError::NoUsableSteps) => 4,
        Some(ServoError::Interrupted) => 5,
        Some(ServoError::Timeout) => 6,
        Some(ServoError::Hardware(_) | ServoError::HardwareFault(_)) => 7,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({ "reason": reason_name(err), "message": humanize(err) });
    if let Some(ServoError::NoCoveringStep { speed }) = err.downcast_ref::<ServoError>() {
        obj["details"] = json!({ "speed": speed });
    }
    obj.to_string()
}
