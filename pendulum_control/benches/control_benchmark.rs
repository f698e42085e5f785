//! Control law micro-benchmark.
//!
//! Measures one computation per law, plus the full controller path
//! (input snapshot, law, clamp, publish) and speed shaping.

use criterion::{Criterion, criterion_group, criterion_main};
use pendulum_common::config::{ControllerConfig, ControllerKind, Direction};
use pendulum_control::balance::shape_speed;
use pendulum_control::control::{BasicPid, ControlLaw, Controller, Gains, Lqr, Mode, OutputLimits, VelocityPid};
use pendulum_control::inputs::{ControlInputs, ManualInputs};
use std::hint::black_box;
use std::time::{Duration, Instant};

const DT: f64 = 0.02;

fn limits() -> OutputLimits {
    OutputLimits::new(-3200.0, 3200.0).expect("valid limits")
}

fn oscillating(cycle: u64) -> ControlInputs {
    let t = cycle as f64 * DT;
    ControlInputs {
        pendulum_angle: 0.05 * t.sin(),
        pendulum_velocity: 0.05 * t.cos(),
        motor_angle: 0.5 * (0.3 * t).sin(),
        motor_velocity: 0.15 * (0.3 * t).cos(),
    }
}

fn bench_law<L: ControlLaw>(c: &mut Criterion, name: &str, mut law: L, gains: Gains) {
    law.set_tunings(gains, DT);
    let limits = limits();
    let mut cycle = 0u64;

    c.bench_function(name, |b| {
        b.iter(|| {
            cycle += 1;
            law.compute(black_box(&oscillating(cycle)), &limits)
        });
    });
}

fn bench_laws(c: &mut Criterion) {
    let pid = Gains::Pid {
        kp: 6.0,
        ki: 0.75,
        kd: 1.5,
    };
    bench_law(c, "basic_pid_compute", BasicPid::new(0.0), pid);
    bench_law(c, "velocity_pid_compute", VelocityPid::new(11.7), pid);
    bench_law(
        c,
        "lqr_compute",
        Lqr::new(11.7),
        Gains::Lqr(ControllerConfig::default().lqr_gains),
    );
}

fn bench_controller(c: &mut Criterion) {
    let config = ControllerConfig {
        kind: ControllerKind::Basic,
        kp: 6.0,
        ki: 0.75,
        kd: 1.5,
        direction: Direction::Reverse,
        ..ControllerConfig::default()
    };
    let inputs = ManualInputs::new();
    let mut controller = Controller::from_config(&config, inputs.clone());
    let t0 = Instant::now();
    controller.set_mode_at(Mode::Automatic, t0);
    let period = Duration::from_millis(u64::from(config.sample_time_ms));
    let mut cycle = 0u64;

    c.bench_function("controller_compute_at", |b| {
        b.iter(|| {
            cycle += 1;
            inputs.set(oscillating(cycle));
            controller.compute_at(black_box(t0 + period * cycle as u32))
        });
    });
}

fn bench_shape_speed(c: &mut Criterion) {
    let mut cycle = 0u64;
    c.bench_function("shape_speed", |b| {
        b.iter(|| {
            cycle += 1;
            let t = cycle as f64 * DT;
            shape_speed(black_box(4000.0 * t.sin()), 350, 3200, black_box(40.0 * t.cos()), 30.0)
        });
    });
}

criterion_group!(benches, bench_laws, bench_controller, bench_shape_speed);
criterion_main!(benches);
