use std::collections::BTreeMap;

use proptest::prelude::*;
use servo_core::fit::{MIN_FIT_SAMPLES, fit_with_trimming};
use servo_core::{FitOptions, FitParams, Sample, SpeedConfig, StepModel, select_covering_steps};

prop_compose! {
    fn intervals()(raw in prop::collection::vec((1.0f64..500.0, 0.0f64..200.0), 1..12)) -> BTreeMap<u32, StepModel> {
        raw.into_iter()
            .enumerate()
            .map(|(i, (lo, width))| {
                let step = i as u32 + 1;
                (step, StepModel {
                    step,
                    min_speed: lo,
                    max_speed: lo + width,
                    params: FitParams::new(1.0, 0.0),
                    mae: 0.0,
                })
            })
            .collect()
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn selection_keeps_global_extremes(models in intervals()) {
        let selected = select_covering_steps(&models);
        let max_all = models.values().map(|m| m.max_speed).fold(f64::NEG_INFINITY, f64::max);
        let min_all = models.values().map(|m| m.min_speed).fold(f64::INFINITY, f64::min);
        prop_assert!(selected.iter().any(|s| models[s].max_speed == max_all));
        prop_assert!(selected.iter().any(|s| models[s].min_speed == min_all));
        prop_assert!(selected.len() <= 3);
    }

    #[test]
    fn overlapping_extremes_select_at_most_two(models in intervals()) {
        let selected = select_covering_steps(&models);
        let sel: Vec<&StepModel> = selected.iter().map(|s| &models[s]).collect();
        let max_all = models.values().map(|m| m.max_speed).fold(f64::NEG_INFINITY, f64::max);
        let min_all = models.values().map(|m| m.min_speed).fold(f64::INFINITY, f64::min);
        let hi = sel.iter().find(|m| m.max_speed == max_all).copied();
        let lo = sel.iter().find(|m| m.min_speed == min_all).copied();
        if let (Some(hi), Some(lo)) = (hi, lo)
            && lo.max_speed >= hi.min_speed
        {
            prop_assert!(selected.len() <= 2);
        }
    }

    #[test]
    fn trimming_terminates_with_fit_or_none(
        a in 5.0f64..200.0,
        b in -5.0f64..20.0,
        noise in prop::collection::vec(-40.0f64..40.0, 3..10),
    ) {
        let truth = FitParams::new(a, b);
        let samples: Vec<Sample> = noise
            .iter()
            .enumerate()
            .map(|(i, n)| {
                let wait_ms = 0.25 * (i as f64 + 1.0);
                Sample { step: 1, wait_ms, speed: truth.speed_at(wait_ms) + n }
            })
            .collect();
        let opts = FitOptions { mae_threshold: 5.0, ..FitOptions::default() };
        match fit_with_trimming(&samples, &opts) {
            Some(fit) => {
                prop_assert!(fit.mae <= opts.mae_threshold);
                prop_assert!(fit.kept.len() >= MIN_FIT_SAMPLES);
                prop_assert_eq!(fit.kept.len() + fit.dropped, samples.len());
                // Only the shortest waits are ever dropped
                let shortest_kept = fit.kept.iter().map(|s| s.wait_ms).fold(f64::INFINITY, f64::min);
                prop_assert!((shortest_kept - 0.25 * (fit.dropped as f64 + 1.0)).abs() < 1e-12);
            }
            None => prop_assert!(samples.len() >= MIN_FIT_SAMPLES),
        }
    }

    #[test]
    fn inversion_recovers_wait(a in 1.0f64..500.0, b in -10.0f64..10.0, wait_ms in 0.02f64..4.0) {
        let p = FitParams::new(a, b);
        let speed = p.speed_at(wait_ms);
        prop_assume!(speed > 0.0);
        prop_assert!((p.wait_for(speed) - wait_ms).abs() < 1e-9 * wait_ms.max(1.0));
    }

    #[test]
    fn percent_endpoints_hit_range(lo in 0.0f64..300.0, width in 0.0f64..300.0) {
        let models = BTreeMap::from([(1, StepModel {
            step: 1,
            min_speed: lo,
            max_speed: lo + width,
            params: FitParams::new(1.0, -1.0),
            mae: 0.0,
        })]);
        let cfg = SpeedConfig::from_models(models).unwrap();
        prop_assert_eq!(cfg.percent_to_speed(0.0).unwrap(), cfg.min_speed_all());
        prop_assert_eq!(cfg.percent_to_speed(100.0).unwrap(), cfg.max_speed_all());
    }
}
