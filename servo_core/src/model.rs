//! Inverse speed model `speed = a / wait + b` and its error metrics.

/// One timing measurement. `wait_ms` is the pause between duty updates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub step: u32,
    pub wait_ms: f64,
    pub speed: f64,
}

/// Coefficients of `speed = a / wait_ms + b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitParams {
    pub a: f64,
    pub b: f64,
}

impl FitParams {
    pub const fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    #[inline]
    pub fn speed_at(&self, wait_ms: f64) -> f64 {
        self.a / wait_ms + self.b
    }

    /// Wait (ms) that yields `speed`; exact algebraic inverse of [`speed_at`].
    ///
    /// [`speed_at`]: FitParams::speed_at
    #[inline]
    pub fn wait_for(&self, speed: f64) -> f64 {
        self.a / (speed - self.b)
    }

    pub fn as_array(&self) -> [f64; 2] {
        [self.a, self.b]
    }
}

impl From<[f64; 2]> for FitParams {
    fn from(p: [f64; 2]) -> Self {
        Self { a: p[0], b: p[1] }
    }
}

/// Fitted model for one step value, valid over `min_speed..=max_speed`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepModel {
    pub step: u32,
    pub min_speed: f64,
    pub max_speed: f64,
    pub params: FitParams,
    /// Mean absolute error over the samples the fit kept (deg/s).
    pub mae: f64,
}

impl StepModel {
    #[inline]
    pub fn covers(&self, speed: f64) -> bool {
        self.min_speed <= speed && speed <= self.max_speed
    }
}

pub fn mean_squared_error(params: &FitParams, waits: &[f64], speeds: &[f64]) -> f64 {
    if waits.is_empty() {
        return f64::INFINITY;
    }
    let sum: f64 = waits
        .iter()
        .zip(speeds)
        .map(|(w, y)| {
            let r = params.speed_at(*w) - y;
            r * r
        })
        .sum();
    sum / waits.len() as f64
}

pub fn mean_absolute_error(params: &FitParams, waits: &[f64], speeds: &[f64]) -> f64 {
    if waits.is_empty() {
        return f64::INFINITY;
    }
    let sum: f64 = waits
        .iter()
        .zip(speeds)
        .map(|(w, y)| (params.speed_at(*w) - y).abs())
        .sum();
    sum / waits.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_matches_reference_example() {
        let p = FitParams::new(24.36, 3.63);
        let w = p.wait_for(100.0);
        assert!((w - 0.252_775_76).abs() < 1e-8, "got {w}");
        assert!((p.speed_at(w) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn errors_are_zero_on_exact_data() {
        let p = FitParams::new(50.0, 2.0);
        let waits = [0.5, 1.0, 2.0];
        let speeds: Vec<f64> = waits.iter().map(|w| p.speed_at(*w)).collect();
        assert_eq!(mean_squared_error(&p, &waits, &speeds), 0.0);
        assert_eq!(mean_absolute_error(&p, &waits, &speeds), 0.0);
    }

    #[test]
    fn errors_on_empty_input_are_infinite() {
        let p = FitParams::new(1.0, 0.0);
        assert!(mean_squared_error(&p, &[], &[]).is_infinite());
        assert!(mean_absolute_error(&p, &[], &[]).is_infinite());
    }
}
