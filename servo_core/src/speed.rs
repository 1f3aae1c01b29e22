//! Calibrated speed table and the runtime speed → (step, wait) lookup.

use std::collections::BTreeMap;

use crate::error::{Result, ServoError};
use crate::model::StepModel;
use crate::util::MICROS_PER_MILLI;

/// Step and per-increment wait chosen for a requested speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Duty increment per update.
    pub step: u32,
    /// Sleep after each duty update, in microseconds.
    pub wait_us: u64,
}

/// Read-only lookup table built once by calibration.
///
/// `min_speed_all..=max_speed_all` is the range percent speeds map onto.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedConfig {
    steps: BTreeMap<u32, StepModel>,
    min_speed_all: f64,
    max_speed_all: f64,
}

impl SpeedConfig {
    /// Table with an explicit speed range (as persisted in the params file).
    pub fn new(steps: BTreeMap<u32, StepModel>, min_speed_all: f64, max_speed_all: f64) -> Result<Self> {
        if steps.is_empty() {
            return Err(ServoError::EmptySpeedConfig.into());
        }
        if !(min_speed_all.is_finite() && max_speed_all.is_finite()) || min_speed_all > max_speed_all {
            return Err(ServoError::Config(format!(
                "invalid speed range {min_speed_all}..={max_speed_all}"
            ))
            .into());
        }
        Ok(Self {
            steps,
            min_speed_all,
            max_speed_all,
        })
    }

    /// Table whose speed range is the union of the step intervals.
    pub fn from_models(steps: BTreeMap<u32, StepModel>) -> Result<Self> {
        let min = steps.values().map(|m| m.min_speed).fold(f64::INFINITY, f64::min);
        let max = steps
            .values()
            .map(|m| m.max_speed)
            .fold(f64::NEG_INFINITY, f64::max);
        Self::new(steps, min, max)
    }

    pub fn steps(&self) -> &BTreeMap<u32, StepModel> {
        &self.steps
    }

    pub fn min_speed_all(&self) -> f64 {
        self.min_speed_all
    }

    pub fn max_speed_all(&self) -> f64 {
        self.max_speed_all
    }

    /// Absolute speed for `percent` of the range; percent is clamped to `[0, 100]`.
    pub fn percent_to_speed(&self, percent: f64) -> Result<f64> {
        if percent.is_nan() {
            return Err(ServoError::InvalidRequest("percent speed is NaN".into()).into());
        }
        let pct = percent.clamp(0.0, 100.0);
        let speed = self.min_speed_all + pct * (self.max_speed_all - self.min_speed_all) / 100.0;
        // Rounding must not push 100 % past the top of the range
        Ok(speed.clamp(self.min_speed_all, self.max_speed_all))
    }

    /// First step (ascending) whose interval contains `speed`, and the wait for it.
    pub fn timing_for_speed(&self, speed: f64) -> Result<Timing> {
        let model = self
            .steps
            .values()
            .find(|m| m.covers(speed))
            .ok_or(ServoError::NoCoveringStep { speed })?;
        let wait_ms = model.params.wait_for(speed);
        let wait_us = (wait_ms * MICROS_PER_MILLI).round();
        if !wait_us.is_finite() || wait_us <= 0.0 {
            return Err(ServoError::InvalidModel {
                step: model.step,
                speed,
            }
            .into());
        }
        Ok(Timing {
            step: model.step,
            wait_us: wait_us as u64,
        })
    }

    pub fn timing_for_percent(&self, percent: f64) -> Result<Timing> {
        let speed = self.percent_to_speed(percent)?;
        self.timing_for_speed(speed)
    }

    /// Sub-ranges of `min_speed_all..=max_speed_all` no step covers.
    pub fn coverage_gaps(&self) -> Vec<(f64, f64)> {
        let mut intervals: Vec<(f64, f64)> = self
            .steps
            .values()
            .map(|m| (m.min_speed, m.max_speed))
            .collect();
        intervals.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut gaps = Vec::new();
        let mut reached = self.min_speed_all;
        for (lo, hi) in intervals {
            if reached >= self.max_speed_all {
                break;
            }
            if lo > reached {
                gaps.push((reached, lo.min(self.max_speed_all)));
            }
            reached = reached.max(hi);
        }
        if reached < self.max_speed_all {
            gaps.push((reached, self.max_speed_all));
        }
        gaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FitParams;

    fn step(step: u32, min: f64, max: f64, a: f64, b: f64) -> (u32, StepModel) {
        (
            step,
            StepModel {
                step,
                min_speed: min,
                max_speed: max,
                params: FitParams::new(a, b),
                mae: 0.1,
            },
        )
    }

    fn table() -> SpeedConfig {
        SpeedConfig::from_models(BTreeMap::from([
            step(1, 10.0, 120.0, 24.36, 3.63),
            step(4, 100.0, 400.0, 90.0, 10.0),
        ]))
        .unwrap()
    }

    #[test]
    fn reference_example_rounds_to_253_us() {
        let cfg = table();
        assert_eq!(
            cfg.timing_for_speed(100.0).unwrap(),
            Timing { step: 1, wait_us: 253 }
        );
    }

    #[test]
    fn percent_maps_onto_range() {
        let cfg = table();
        assert_eq!(cfg.percent_to_speed(0.0).unwrap(), 10.0);
        assert_eq!(cfg.percent_to_speed(100.0).unwrap(), 400.0);
        assert_eq!(cfg.percent_to_speed(-5.0).unwrap(), 10.0);
        assert_eq!(cfg.percent_to_speed(250.0).unwrap(), 400.0);
        assert!(cfg.percent_to_speed(f64::NAN).is_err());
    }

    #[test]
    fn first_covering_step_wins() {
        let cfg = table();
        // 110 lies in both intervals; the lower step is scanned first
        assert_eq!(cfg.timing_for_speed(110.0).unwrap().step, 1);
        assert_eq!(cfg.timing_for_speed(130.0).unwrap().step, 4);
    }

    #[test]
    fn uncovered_speed_is_an_error() {
        let cfg = SpeedConfig::new(BTreeMap::from([step(1, 10.0, 50.0, 24.0, 3.0)]), 0.0, 600.0).unwrap();
        let err = cfg.timing_for_percent(100.0).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ServoError>(),
            Some(&ServoError::NoCoveringStep { speed: 600.0 })
        );
    }

    #[test]
    fn non_positive_wait_is_invalid_model() {
        // b above the requested speed inverts to a negative wait
        let cfg = SpeedConfig::from_models(BTreeMap::from([step(2, 10.0, 50.0, 24.0, 80.0)])).unwrap();
        let err = cfg.timing_for_speed(20.0).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ServoError>(),
            Some(&ServoError::InvalidModel { step: 2, speed: 20.0 })
        );
    }

    #[test]
    fn empty_table_is_rejected() {
        let err = SpeedConfig::from_models(BTreeMap::new()).unwrap_err();
        assert_eq!(err.downcast_ref::<ServoError>(), Some(&ServoError::EmptySpeedConfig));
    }

    #[test]
    fn gaps_are_reported() {
        assert!(table().coverage_gaps().is_empty());
        let cfg = SpeedConfig::from_models(BTreeMap::from([
            step(1, 10.0, 50.0, 1.0, 0.0),
            step(5, 80.0, 200.0, 1.0, 0.0),
        ]))
        .unwrap();
        assert_eq!(cfg.coverage_gaps(), vec![(50.0, 80.0)]);

        let wide = SpeedConfig::new(BTreeMap::from([step(1, 10.0, 50.0, 1.0, 0.0)]), 0.0, 60.0).unwrap();
        assert_eq!(wide.coverage_gaps(), vec![(0.0, 10.0), (50.0, 60.0)]);
    }
}
