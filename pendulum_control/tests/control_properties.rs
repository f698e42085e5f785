//! Property tests for the controller state machine.

use pendulum_common::config::Direction;
use pendulum_control::control::{BasicPid, ControlLaw, Controller, Gains, Lqr, Mode, VelocityPid};
use pendulum_control::inputs::{ControlInputs, InputSource, ManualInputs};
use proptest::prelude::*;
use std::time::{Duration, Instant};

const SAMPLE: Duration = Duration::from_millis(20);

fn controller<L: ControlLaw>(law: L, gains: Gains) -> (Controller<L, ManualInputs>, ManualInputs) {
    let inputs = ManualInputs::new();
    let mut c = Controller::new(law, inputs.clone(), gains, Direction::Direct);
    c.set_sample_time(20);
    (c, inputs)
}

fn state() -> impl Strategy<Value = ControlInputs> {
    (-4.0..4.0f64, -50.0..50.0f64, -20.0..20.0f64, -500.0..500.0f64).prop_map(|(pa, pv, ma, mv)| {
        ControlInputs {
            pendulum_angle: pa,
            pendulum_velocity: pv,
            motor_angle: ma,
            motor_velocity: mv,
        }
    })
}

fn pid_gains() -> impl Strategy<Value = Gains> {
    (0.0..50.0f64, 0.0..50.0f64, 0.0..5.0f64).prop_map(|(kp, ki, kd)| Gains::Pid { kp, ki, kd })
}

fn limits() -> impl Strategy<Value = (f64, f64)> {
    (-5000.0..5000.0f64, 1.0..5000.0f64).prop_map(|(min, span)| (min, min + span))
}

fn run_sequence<L: ControlLaw, S: InputSource>(
    c: &mut Controller<L, S>,
    drive: impl Fn(&ControlInputs),
    states: &[ControlInputs],
    (min, max): (f64, f64),
) {
    let t0 = Instant::now();
    c.set_mode_at(Mode::Automatic, t0);
    c.set_output_limits(min, max);
    for (i, s) in states.iter().enumerate() {
        drive(s);
        let out = c
            .compute_at(t0 + SAMPLE * (i as u32 + 1))
            .expect("sample period elapsed");
        assert_in_range(out, min, max);
    }
}

fn assert_in_range(value: f64, min: f64, max: f64) {
    assert!(value >= min && value <= max, "{value} outside [{min}, {max}]");
}

proptest! {
    #[test]
    fn basic_output_and_integral_stay_within_limits(
        gains in pid_gains(),
        bounds in limits(),
        states in prop::collection::vec(state(), 1..40),
    ) {
        let (mut c, inputs) = controller(BasicPid::new(0.0), gains);
        run_sequence(&mut c, |s| inputs.set(*s), &states, bounds);
        prop_assert!(c.law().integral() >= bounds.0 && c.law().integral() <= bounds.1);
    }

    #[test]
    fn velocity_output_stays_within_limits(
        gains in pid_gains(),
        bounds in limits(),
        states in prop::collection::vec(state(), 1..20),
    ) {
        let (mut c, inputs) = controller(VelocityPid::new(11.7), gains);
        run_sequence(&mut c, |s| inputs.set(*s), &states, bounds);
    }

    #[test]
    fn lqr_output_stays_within_limits(
        k in prop::array::uniform4(-200.0..200.0f64),
        bounds in limits(),
        states in prop::collection::vec(state(), 1..20),
    ) {
        let (mut c, inputs) = controller(Lqr::new(11.7), Gains::Lqr(k));
        run_sequence(&mut c, |s| inputs.set(*s), &states, bounds);
    }

    #[test]
    fn narrowing_limits_clamps_held_output(
        held in -10_000.0..10_000.0f64,
        bounds in limits(),
    ) {
        let (mut c, _) = controller(BasicPid::new(0.0), Gains::Pid { kp: 1.0, ki: 1.0, kd: 1.0 });
        c.set_output_limits(-1e6, 1e6);
        c.set_manual_output(held);
        c.set_output_limits(bounds.0, bounds.1);
        prop_assert!(c.output() >= bounds.0 && c.output() <= bounds.1);
    }

    #[test]
    fn negative_pid_gains_are_ignored(
        before in pid_gains(),
        kp in -10.0..10.0f64,
        ki in -10.0..10.0f64,
        kd in -10.0..10.0f64,
    ) {
        prop_assume!(kp < 0.0 || ki < 0.0 || kd < 0.0);
        let (mut c, _) = controller(BasicPid::new(0.0), before);
        let live = c.live_gains();
        c.set_tunings(Gains::Pid { kp, ki, kd });
        prop_assert_eq!(c.gains(), before);
        prop_assert_eq!(c.live_gains(), live);
    }

    #[test]
    fn double_direction_toggle_restores_gains(gains in pid_gains(), k in prop::array::uniform4(-50.0..50.0f64)) {
        let (mut pid, _) = controller(BasicPid::new(0.0), gains);
        let live = pid.live_gains();
        pid.set_controller_direction(Direction::Reverse);
        pid.set_controller_direction(Direction::Direct);
        prop_assert_eq!(pid.live_gains(), live);

        let (mut lqr, _) = controller(Lqr::new(11.7), Gains::Lqr(k));
        lqr.set_controller_direction(Direction::Reverse);
        prop_assert_eq!(lqr.live_gains(), Gains::Lqr(k.map(|x| -x)));
        lqr.set_controller_direction(Direction::Direct);
        prop_assert_eq!(lqr.live_gains(), Gains::Lqr(k));
    }

    #[test]
    fn manual_to_automatic_is_bumpless(
        gains in pid_gains(),
        held in -3200.0..3200.0f64,
    ) {
        let (mut c, _) = controller(BasicPid::new(0.0), gains);
        c.set_output_limits(-3200.0, 3200.0);
        c.set_manual_output(held);

        let t0 = Instant::now();
        c.set_mode_at(Mode::Automatic, t0);
        let first = c.compute_at(t0 + SAMPLE).expect("due");
        prop_assert!((first - held).abs() < 1e-9, "first {} vs held {}", first, held);
    }
}
