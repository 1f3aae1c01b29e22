use servo_config::{SampleRow, ServoParams, load_params_json, load_samples_csv, save_params_json, write_samples_csv};
use servo_core::conversions::store_speed_config;
use servo_core::{AcquisitionPlan, CalibrationOptions, FitParams, Sample, ServoError, SpeedConfig, Timing, calibrate};

/// Noise-free samples on the acquisition wait grid for steps 1..=6, where
/// step `s` follows `speed = 30 s / wait_ms + 2`, plus a two-sample step 7.
fn synthetic_samples() -> Vec<Sample> {
    let grid = AcquisitionPlan::default().wait_grid_us();
    let mut out = Vec::new();
    for step in 1..=6u32 {
        let p = FitParams::new(30.0 * f64::from(step), 2.0);
        for &wait_us in &grid {
            let wait_ms = wait_us as f64 / 1000.0;
            out.push(Sample { step, wait_ms, speed: p.speed_at(wait_ms) });
        }
    }
    out.push(Sample { step: 7, wait_ms: 1.0, speed: 80.0 });
    out.push(Sample { step: 7, wait_ms: 2.0, speed: 60.0 });
    out
}

#[test]
fn calibration_selects_extreme_steps_and_inverts() {
    let report = calibrate(&synthetic_samples(), &CalibrationOptions::default()).unwrap();

    // 1 sample of steps 1-4 and 2 of steps 5-6 exceed 600 deg/s
    assert_eq!(report.over_spec, 8);
    assert_eq!(report.trimmed, 0);
    assert_eq!(report.excluded, vec![7]);
    assert_eq!(report.fitted.len(), 6);
    assert!(report.gaps.is_empty());

    let cfg = &report.config;
    assert_eq!(cfg.steps().keys().copied().collect::<Vec<_>>(), vec![1, 4]);
    assert!((cfg.min_speed_all() - 9.892_659_826).abs() < 1e-6);
    assert!((cfg.max_speed_all() - 549.945_205_479).abs() < 1e-6);

    let step4 = &cfg.steps()[&4];
    assert!((step4.params.a - 120.0).abs() < 1e-4, "{:?}", step4.params);
    assert!((step4.params.b - 2.0).abs() < 1e-4, "{:?}", step4.params);

    assert_eq!(cfg.timing_for_percent(100.0).unwrap(), Timing { step: 4, wait_us: 219 });
    assert_eq!(cfg.timing_for_percent(0.0).unwrap(), Timing { step: 1, wait_us: 3801 });
}

#[test]
fn csv_to_params_json_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("samples.csv");
    let json_path = dir.path().join("params").join("servo_params.json");

    let rows: Vec<SampleRow> = synthetic_samples().iter().map(SampleRow::from).collect();
    write_samples_csv(&csv_path, &rows).unwrap();

    let loaded: Vec<Sample> = load_samples_csv(&csv_path).unwrap().iter().map(Sample::from).collect();
    let report = calibrate(&loaded, &CalibrationOptions::default()).unwrap();

    let mut params = ServoParams::default();
    store_speed_config(params.entry_mut_or_default("servo_1"), &report.config);
    save_params_json(&json_path, &params).unwrap();

    let reloaded = load_params_json(&json_path).unwrap();
    let cfg = SpeedConfig::try_from(reloaded.entry("servo_1").unwrap()).unwrap();
    assert_eq!(cfg.steps().keys().copied().collect::<Vec<_>>(), vec![1, 4]);
    assert_eq!(
        cfg.timing_for_percent(50.0).unwrap(),
        report.config.timing_for_percent(50.0).unwrap()
    );
}

#[test]
fn all_steps_unfittable_is_reported() {
    let samples = vec![
        Sample { step: 1, wait_ms: 1.0, speed: 10.0 },
        Sample { step: 2, wait_ms: 1.0, speed: 10.0 },
    ];
    let err = calibrate(&samples, &CalibrationOptions::default()).unwrap_err();
    assert_eq!(err.downcast_ref::<ServoError>(), Some(&ServoError::NoUsableSteps));
}
