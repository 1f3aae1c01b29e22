use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use servo_core::{
    AcquisitionPlan, FitParams, ServoController, ServoError, ServoGeometry, SpeedConfig, StepModel, SweepPlan,
    VerifyPlan, acquire_samples, linear_fit, measure_percent_sweep, run_sweep,
};
use servo_hardware::{SimulatedEndStop, SimulatedPwm};
use servo_traits::SimClock;

fn table() -> SpeedConfig {
    let step = |step: u32, min_speed: f64, max_speed: f64, a: f64| {
        (
            step,
            StepModel {
                step,
                min_speed,
                max_speed,
                params: FitParams::new(a, 2.0),
                mae: 0.2,
            },
        )
    };
    SpeedConfig::from_models(BTreeMap::from([step(1, 10.0, 140.0, 30.0), step(4, 120.0, 550.0, 120.0)])).unwrap()
}

#[test]
fn acquisition_times_every_grid_point() {
    let clock = SimClock::new();
    let pwm = SimulatedPwm::new().with_clock(clock.clone(), Duration::from_micros(20));
    let log = pwm.log();
    let mut servo = ServoController::new(pwm, clock, ServoGeometry::default());
    let plan = AcquisitionPlan {
        max_step: 2,
        percent_increment: 50,
        pause: Duration::ZERO,
        ..AcquisitionPlan::default()
    };

    let mut seen = 0;
    let samples = acquire_samples(&mut servo, &plan, |_| seen += 1).unwrap();
    assert_eq!(seen, 4);
    assert_eq!(samples.len(), plan.run_count());
    assert_eq!(
        samples.iter().map(|s| (s.step, s.wait_ms)).collect::<Vec<_>>(),
        vec![(1, 0.02), (1, 2.01), (2, 0.02), (2, 2.01)]
    );

    // step 1 at 2010 us over 6000 duty counts: 6001 writes at 20 us and 6000 waits
    let expected = 180.0 * 1e6 / (6001.0 * 20.0 + 6000.0 * 2010.0);
    assert!((samples[1].speed - expected).abs() < 1e-9, "{}", samples[1].speed);
    assert!(samples[0].speed > samples[1].speed);
    assert!(samples[2].speed > samples[0].speed);

    // Parked back at the start of travel
    assert_eq!(log.last(), Some(7500));
    assert_eq!(servo.current_angle(), -90.0);
}

fn quarter_turn_servo(latency_us: u64) -> (ServoController<SimulatedPwm, SimClock>, servo_hardware::DutyLog) {
    let clock = SimClock::new();
    let pwm = SimulatedPwm::new().with_clock(clock.clone(), Duration::from_micros(latency_us));
    let log = pwm.log();
    let geometry = ServoGeometry {
        max_angle: 90,
        ..ServoGeometry::default()
    };
    (ServoController::new(pwm, clock, geometry), log)
}

#[test]
fn acquisition_speed_uses_clamped_travel() {
    let plan = |from_angle, to_angle| AcquisitionPlan {
        from_angle,
        to_angle,
        max_step: 1,
        percent_increment: 50,
        pause: Duration::ZERO,
        ..AcquisitionPlan::default()
    };

    let (mut servo, _) = quarter_turn_servo(20);
    let wide = acquire_samples(&mut servo, &plan(-90.0, 90.0), |_| {}).unwrap();
    let (mut servo, _) = quarter_turn_servo(20);
    let exact = acquire_samples(&mut servo, &plan(-45.0, 45.0), |_| {}).unwrap();

    let speeds = |s: &[servo_core::Sample]| s.iter().map(|s| s.speed).collect::<Vec<_>>();
    assert_eq!(speeds(&wide), speeds(&exact));
    // 90 degrees over the same 6000 duty counts
    let expected = 90.0 * 1e6 / (6001.0 * 20.0 + 6000.0 * 2010.0);
    assert!((wide[1].speed - expected).abs() < 1e-9, "{}", wide[1].speed);
}

#[test]
fn verification_speed_uses_clamped_travel() {
    let plan = |from_angle, to_angle| VerifyPlan {
        from_angle,
        to_angle,
        percent_increment: 50,
        pause: Duration::ZERO,
        ..VerifyPlan::default()
    };
    let run = |from_angle, to_angle| {
        let (servo, log) = quarter_turn_servo(5);
        let mut servo = servo.with_speed_config(table());
        let mut sensor = SimulatedEndStop::new(log, 1500);
        measure_percent_sweep(&mut servo, &mut sensor, &plan(from_angle, to_angle), |_| {}).unwrap()
    };
    assert_eq!(run(-90.0, 90.0), run(-45.0, 45.0));
}

#[test]
fn verification_measures_each_percent() {
    let clock = SimClock::new();
    let pwm = SimulatedPwm::new().with_clock(clock.clone(), Duration::from_micros(5));
    let mut sensor = SimulatedEndStop::new(pwm.log(), 1500);
    let mut servo = ServoController::new(pwm, clock, ServoGeometry::default()).with_speed_config(table());
    let plan = VerifyPlan {
        percent_increment: 50,
        pause: Duration::ZERO,
        ..VerifyPlan::default()
    };

    let rows = measure_percent_sweep(&mut servo, &mut sensor, &plan, |_| {}).unwrap();
    assert_eq!(rows.iter().map(|m| m.percent).collect::<Vec<_>>(), vec![0.0, 50.0, 100.0]);
    assert!(rows.windows(2).all(|w| w[0].speed < w[1].speed), "{rows:?}");

    let points: Vec<(f64, f64)> = rows.iter().map(|m| (m.percent, m.speed)).collect();
    let fit = linear_fit(&points).unwrap();
    assert!(fit.slope > 0.0);
}

#[test]
fn verification_times_out_without_sensor() {
    let clock = SimClock::new();
    let pwm = SimulatedPwm::new();
    let mut sensor = SimulatedEndStop::new(pwm.log(), 1);
    let mut servo = ServoController::new(pwm, clock, ServoGeometry::default()).with_speed_config(table());
    let plan = VerifyPlan {
        pause: Duration::ZERO,
        sensor_timeout: Duration::from_millis(2),
        ..VerifyPlan::default()
    };
    let err = measure_percent_sweep(&mut servo, &mut sensor, &plan, |_| {}).unwrap_err();
    assert_eq!(err.downcast_ref::<ServoError>(), Some(&ServoError::Timeout));
}

#[test]
fn sweep_visits_every_percent() {
    let pwm = SimulatedPwm::new();
    let log = pwm.log();
    let mut servo = ServoController::new(pwm, SimClock::new(), ServoGeometry::default()).with_speed_config(table());
    let used = run_sweep(&mut servo, &SweepPlan::default()).unwrap();
    assert_eq!(used.len(), 11);
    assert_eq!(used[0].1.step, 1);
    assert_eq!(used[10].1.step, 4);
    assert_eq!(log.last(), Some(7500));
}

#[test]
fn sweep_stops_and_releases_on_flag() {
    let pwm = SimulatedPwm::new();
    let log = pwm.log();
    let mut servo = ServoController::new(pwm, SimClock::new(), ServoGeometry::default())
        .with_speed_config(table())
        .with_stop_flag(Arc::new(AtomicBool::new(true)));
    let err = run_sweep(&mut servo, &SweepPlan::default()).unwrap_err();
    assert_eq!(err.downcast_ref::<ServoError>(), Some(&ServoError::Interrupted));
    assert!(log.released());
}
