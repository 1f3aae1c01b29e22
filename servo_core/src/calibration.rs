//! Offline calibration: samples in, speed table out.

use std::collections::BTreeMap;

use crate::config::CalibrationOptions;
use crate::error::{Result, ServoError};
use crate::fit::fit_with_trimming;
use crate::model::{Sample, StepModel};
use crate::selection::select_covering_steps;
use crate::speed::SpeedConfig;

/// Outcome of one calibration run.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationReport {
    /// Selected steps, ready to persist.
    pub config: SpeedConfig,
    /// Every step with an accepted fit, before selection.
    pub fitted: BTreeMap<u32, StepModel>,
    /// Steps with no acceptable fit (or too few samples).
    pub excluded: Vec<u32>,
    /// Samples above the servo's rated speed, dropped up front.
    pub over_spec: usize,
    /// Samples dropped by outlier trimming across all steps.
    pub trimmed: usize,
    /// Speed ranges the selected steps leave uncovered.
    pub gaps: Vec<(f64, f64)>,
}

/// Group samples by step, preserving input order within each step.
pub fn group_by_step(samples: &[Sample]) -> BTreeMap<u32, Vec<Sample>> {
    let mut groups: BTreeMap<u32, Vec<Sample>> = BTreeMap::new();
    for s in samples {
        groups.entry(s.step).or_default().push(*s);
    }
    groups
}

/// Fit every step, select a covering subset and build the speed table.
///
/// Fails with [`ServoError::NoUsableSteps`] if no step yields an acceptable
/// fit. Coverage gaps left by the single-bridge selection are reported in the
/// result and logged, not patched.
pub fn calibrate(samples: &[Sample], opts: &CalibrationOptions) -> Result<CalibrationReport> {
    let usable: Vec<Sample> = samples
        .iter()
        .copied()
        .filter(|s| s.speed <= opts.max_speed_spec)
        .collect();
    let over_spec = samples.len() - usable.len();
    if over_spec > 0 {
        tracing::debug!(over_spec, max_speed_spec = opts.max_speed_spec, "discarded samples above rated speed");
    }

    let mut fitted = BTreeMap::new();
    let mut excluded = Vec::new();
    let mut trimmed = 0;
    for (step, group) in group_by_step(&usable) {
        match fit_with_trimming(&group, &opts.fit) {
            Some(fit) => {
                let model = StepModel {
                    step,
                    min_speed: fit.min_speed(),
                    max_speed: fit.max_speed(),
                    params: fit.params,
                    mae: fit.mae,
                };
                tracing::debug!(
                    step,
                    a = model.params.a,
                    b = model.params.b,
                    mae = model.mae,
                    min_speed = model.min_speed,
                    max_speed = model.max_speed,
                    dropped = fit.dropped,
                    "step fitted"
                );
                trimmed += fit.dropped;
                fitted.insert(step, model);
            }
            None => {
                tracing::debug!(step, samples = group.len(), "step excluded: no acceptable fit");
                excluded.push(step);
            }
        }
    }
    if fitted.is_empty() {
        return Err(ServoError::NoUsableSteps.into());
    }

    let selected: BTreeMap<u32, StepModel> = select_covering_steps(&fitted)
        .into_iter()
        .filter_map(|step| fitted.get(&step).map(|m| (step, *m)))
        .collect();
    let config = SpeedConfig::from_models(selected)?;
    let gaps = config.coverage_gaps();
    for (lo, hi) in &gaps {
        tracing::warn!(from = lo, to = hi, "speed range not covered by any selected step");
    }
    tracing::info!(
        steps = ?config.steps().keys().collect::<Vec<_>>(),
        min_speed = config.min_speed_all(),
        max_speed = config.max_speed_all(),
        excluded = excluded.len(),
        "calibration complete"
    );

    Ok(CalibrationReport {
        config,
        fitted,
        excluded,
        over_spec,
        trimmed,
        gaps,
    })
}
