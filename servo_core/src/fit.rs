//! Per-step least-squares fit with outlier trimming.
//!
//! The model is fitted by minimising the mean squared error with a
//! Nelder–Mead simplex started from a caller-supplied guess. A failed
//! minimisation yields `None` ("no fit"); the trimming loop treats that as an
//! infinite error and keeps dropping samples.

use tracing::{debug, trace};

use crate::config::FitOptions;
use crate::model::{FitParams, Sample, mean_absolute_error, mean_squared_error};

/// Fewest samples a step may be fitted on. Trimming stops here.
pub const MIN_FIT_SAMPLES: usize = 3;

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;
/// Relative size of the initial simplex around the starting point.
const INITIAL_STEP: f64 = 0.05;
/// Initial simplex offset for coordinates that start at exactly zero.
const ZERO_STEP: f64 = 0.000_25;
const MAX_RESTARTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum<const N: usize> {
    pub x: [f64; N],
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

#[inline]
fn finite_or_inf(v: f64) -> f64 {
    if v.is_finite() { v } else { f64::INFINITY }
}

fn lerp<const N: usize>(from: &[f64; N], to: &[f64; N], t: f64) -> [f64; N] {
    let mut out = [0.0; N];
    for i in 0..N {
        out[i] = from[i] + t * (to[i] - from[i]);
    }
    out
}

/// One Nelder–Mead run. Returns `None` when the objective is not finite at
/// the starting point.
fn simplex_run<const N: usize>(
    f: &impl Fn(&[f64; N]) -> f64,
    x0: [f64; N],
    tolerance: f64,
    max_iterations: usize,
) -> Option<Minimum<N>> {
    let f0 = f(&x0);
    if !f0.is_finite() {
        return None;
    }

    let mut simplex: Vec<([f64; N], f64)> = Vec::with_capacity(N + 1);
    simplex.push((x0, f0));
    for i in 0..N {
        let mut x = x0;
        x[i] = if x[i] == 0.0 {
            ZERO_STEP
        } else {
            x[i] * (1.0 + INITIAL_STEP)
        };
        simplex.push((x, finite_or_inf(f(&x))));
    }

    let mut iterations = 0;
    let mut converged = false;
    while iterations < max_iterations {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

        let (best_x, best_f) = simplex[0];
        let f_spread = simplex[1..]
            .iter()
            .map(|(_, v)| (v - best_f).abs())
            .fold(0.0, f64::max);
        let x_spread = simplex[1..]
            .iter()
            .flat_map(|(x, _)| x.iter().zip(best_x.iter()).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        if f_spread <= tolerance && x_spread <= tolerance {
            converged = true;
            break;
        }
        iterations += 1;

        // Centroid of all but the worst vertex
        let mut centroid = [0.0; N];
        for (x, _) in &simplex[..N] {
            for i in 0..N {
                centroid[i] += x[i] / N as f64;
            }
        }
        let (worst_x, worst_f) = simplex[N];
        let second_worst_f = simplex[N - 1].1;

        let reflected = lerp(&centroid, &worst_x, -REFLECT);
        let f_reflected = finite_or_inf(f(&reflected));

        if f_reflected < best_f {
            let expanded = lerp(&centroid, &worst_x, -REFLECT * EXPAND);
            let f_expanded = finite_or_inf(f(&expanded));
            simplex[N] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
            continue;
        }
        if f_reflected < second_worst_f {
            simplex[N] = (reflected, f_reflected);
            continue;
        }

        let accepted = if f_reflected < worst_f {
            let outside = lerp(&centroid, &reflected, CONTRACT);
            let f_outside = finite_or_inf(f(&outside));
            (f_outside <= f_reflected).then_some((outside, f_outside))
        } else {
            let inside = lerp(&centroid, &worst_x, CONTRACT);
            let f_inside = finite_or_inf(f(&inside));
            (f_inside < worst_f).then_some((inside, f_inside))
        };
        match accepted {
            Some(vertex) => simplex[N] = vertex,
            None => {
                for vertex in simplex.iter_mut().skip(1) {
                    let x = lerp(&best_x, &vertex.0, SHRINK);
                    *vertex = (x, finite_or_inf(f(&x)));
                }
            }
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    let (x, value) = simplex[0];
    if !value.is_finite() || x.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(Minimum {
        x,
        value,
        iterations,
        converged,
    })
}

/// Unconstrained minimisation from `x0`.
///
/// Runs Nelder–Mead and restarts it from the best vertex while the restart
/// keeps improving, which un-sticks collapsed simplices on elongated valleys.
pub fn minimize<const N: usize>(
    f: impl Fn(&[f64; N]) -> f64,
    x0: [f64; N],
    tolerance: f64,
    max_iterations: usize,
) -> Option<Minimum<N>> {
    let mut best = simplex_run(&f, x0, tolerance, max_iterations)?;
    for _ in 0..MAX_RESTARTS {
        let Some(next) = simplex_run(&f, best.x, tolerance, max_iterations) else {
            break;
        };
        let improved = next.value < best.value - tolerance;
        let iterations = best.iterations + next.iterations;
        if next.value <= best.value {
            best = Minimum { iterations, ..next };
        }
        if !improved {
            break;
        }
    }
    Some(best)
}

/// Fit `speed = a / wait + b` to one step's samples.
///
/// Returns `None` when there is nothing to fit, a wait is not strictly
/// positive, or the minimiser cannot produce a finite result.
pub fn fit_model(waits: &[f64], speeds: &[f64], opts: &FitOptions) -> Option<FitParams> {
    if waits.is_empty() || waits.len() != speeds.len() {
        return None;
    }
    if waits.iter().any(|w| !(w.is_finite() && *w > 0.0)) || speeds.iter().any(|s| !s.is_finite())
    {
        return None;
    }
    let objective = |p: &[f64; 2]| mean_squared_error(&FitParams::from(*p), waits, speeds);
    let min = minimize(
        objective,
        opts.initial_guess.as_array(),
        opts.tolerance,
        opts.max_iterations,
    )?;
    if !min.converged {
        debug!(
            iterations = min.iterations,
            mse = min.value,
            "minimiser hit the iteration cap; keeping best vertex"
        );
    }
    Some(FitParams::from(min.x))
}

/// Accepted fit for one step together with the samples it kept.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimmedFit {
    pub params: FitParams,
    pub mae: f64,
    /// Samples the fit was computed on, ordered by decreasing wait.
    pub kept: Vec<Sample>,
    pub dropped: usize,
}

impl TrimmedFit {
    pub fn min_speed(&self) -> f64 {
        self.kept.iter().map(|s| s.speed).fold(f64::INFINITY, f64::min)
    }

    pub fn max_speed(&self) -> f64 {
        self.kept
            .iter()
            .map(|s| s.speed)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Fit one step, trimming the shortest-wait sample while the error is too high.
///
/// Samples are ordered by decreasing wait. While the mean absolute error
/// exceeds `opts.mae_threshold` and more than [`MIN_FIT_SAMPLES`] samples
/// remain, the last (shortest-wait) sample is dropped and the model refitted.
/// Returns `None` if no acceptable fit is reached.
pub fn fit_with_trimming(samples: &[Sample], opts: &FitOptions) -> Option<TrimmedFit> {
    if samples.len() < MIN_FIT_SAMPLES {
        return None;
    }
    let mut ordered = samples.to_vec();
    ordered.sort_by(|a, b| b.wait_ms.total_cmp(&a.wait_ms));
    let waits: Vec<f64> = ordered.iter().map(|s| s.wait_ms).collect();
    let speeds: Vec<f64> = ordered.iter().map(|s| s.speed).collect();

    let mut n = ordered.len();
    loop {
        let fit = fit_model(&waits[..n], &speeds[..n], opts);
        let mae = fit.map_or(f64::INFINITY, |p| {
            finite_or_inf(mean_absolute_error(&p, &waits[..n], &speeds[..n]))
        });
        trace!(samples = n, mae, "step fit");
        if let Some(params) = fit
            && mae <= opts.mae_threshold
        {
            ordered.truncate(n);
            return Some(TrimmedFit {
                params,
                mae,
                kept: ordered,
                dropped: samples.len() - n,
            });
        }
        if n <= MIN_FIT_SAMPLES {
            return None;
        }
        n -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(threshold: f64) -> FitOptions {
        FitOptions {
            mae_threshold: threshold,
            ..FitOptions::default()
        }
    }

    fn synthetic(step: u32, p: FitParams, waits: &[f64]) -> Vec<Sample> {
        waits
            .iter()
            .map(|w| Sample {
                step,
                wait_ms: *w,
                speed: p.speed_at(*w),
            })
            .collect()
    }

    #[test]
    fn minimize_finds_quadratic_bowl() {
        let m = minimize(
            |x: &[f64; 2]| (x[0] - 3.0).powi(2) + 10.0 * (x[1] + 1.0).powi(2),
            [0.0, 0.0],
            1e-12,
            5000,
        )
        .unwrap();
        assert!((m.x[0] - 3.0).abs() < 1e-4, "{m:?}");
        assert!((m.x[1] + 1.0).abs() < 1e-4, "{m:?}");
    }

    #[test]
    fn minimize_rejects_non_finite_start() {
        assert!(minimize(|_: &[f64; 1]| f64::NAN, [1.0], 1e-9, 100).is_none());
    }

    #[test]
    fn fit_recovers_exact_parameters_from_default_guess() {
        let truth = FitParams::new(24.36, 3.63);
        let waits = [4.0, 3.0, 2.0, 1.5, 1.0, 0.75, 0.5, 0.25];
        let speeds: Vec<f64> = waits.iter().map(|w| truth.speed_at(*w)).collect();
        let p = fit_model(&waits, &speeds, &FitOptions::default()).unwrap();
        assert!((p.a - truth.a).abs() < 1e-3, "{p:?}");
        assert!((p.b - truth.b).abs() < 1e-3, "{p:?}");
    }

    #[test]
    fn fit_rejects_non_positive_wait() {
        let o = FitOptions::default();
        assert!(fit_model(&[1.0, 0.0], &[10.0, 20.0], &o).is_none());
        assert!(fit_model(&[1.0, -2.0], &[10.0, 20.0], &o).is_none());
        assert!(fit_model(&[], &[], &o).is_none());
        assert!(fit_model(&[1.0], &[1.0, 2.0], &o).is_none());
    }

    #[test]
    fn clean_data_keeps_every_sample() {
        let samples = synthetic(2, FitParams::new(60.0, 5.0), &[0.5, 1.0, 2.0, 3.0, 4.0]);
        let fit = fit_with_trimming(&samples, &opts(0.5)).unwrap();
        assert_eq!(fit.dropped, 0);
        assert_eq!(fit.kept.len(), 5);
        assert!(fit.mae < 1e-3);
        assert!((fit.max_speed() - 125.0).abs() < 1e-9);
        assert!((fit.min_speed() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn shortest_wait_outlier_is_trimmed() {
        let truth = FitParams::new(60.0, 5.0);
        let mut samples = synthetic(3, truth, &[4.0, 3.0, 2.0, 1.5, 1.0, 0.8]);
        // Saturated servo: the fastest setting undershoots the model badly
        samples[5].speed = 20.0;
        let fit = fit_with_trimming(&samples, &opts(0.5)).unwrap();
        assert_eq!(fit.dropped, 1);
        assert!(fit.kept.iter().all(|s| s.wait_ms > 0.8));
        assert!((fit.params.a - truth.a).abs() < 1e-2, "{:?}", fit.params);
    }

    #[test]
    fn four_samples_still_refit_at_three() {
        let truth = FitParams::new(60.0, 5.0);
        let mut samples = synthetic(1, truth, &[3.0, 2.0, 1.0, 0.5]);
        samples[3].speed = 500.0;
        let fit = fit_with_trimming(&samples, &opts(0.5)).unwrap();
        assert_eq!(fit.kept.len(), 3);
        assert_eq!(fit.dropped, 1);
    }

    #[test]
    fn unfittable_step_yields_no_fit() {
        // Speeds that no a/w + b curve follows within the threshold
        let samples = vec![
            Sample { step: 1, wait_ms: 4.0, speed: 10.0 },
            Sample { step: 1, wait_ms: 3.0, speed: 300.0 },
            Sample { step: 1, wait_ms: 2.0, speed: 15.0 },
            Sample { step: 1, wait_ms: 1.0, speed: 290.0 },
        ];
        assert!(fit_with_trimming(&samples, &opts(0.5)).is_none());
    }

    #[test]
    fn too_few_samples_are_never_fitted() {
        let samples = synthetic(1, FitParams::new(10.0, 1.0), &[1.0, 2.0]);
        assert!(fit_with_trimming(&samples, &opts(100.0)).is_none());
    }
}
