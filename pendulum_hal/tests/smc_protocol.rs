//! SMC wire protocol integration tests.
//!
//! Drives `SmcLink` against the in-memory controller and checks the exact
//! bytes on the wire plus the transient-error contract.

use pendulum_common::consts::{SERIAL_ERROR, SMC_MAX_SPEED};
use pendulum_common::hal::SerialError;
use pendulum_hal::smc::{
    CMD_AUTO_BAUD, CMD_EXIT_SAFE_START, CMD_GET_VARIABLE, SimulatedSmc, SmcLink, Variable,
    decode_speed, encode_speed,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

fn link() -> (SmcLink<SimulatedSmc>, SimulatedSmc) {
    let smc = SimulatedSmc::new();
    let link = SmcLink::with_transport("sim", smc.clone()).expect("handshake");
    (link, smc)
}

#[test]
fn test_speed_frames_on_the_wire() {
    let (link, smc) = link();
    link.set_target_speed(200).unwrap();
    link.set_target_speed(-200).unwrap();

    assert_eq!(
        smc.written(),
        vec![
            CMD_AUTO_BAUD,
            CMD_EXIT_SAFE_START,
            0x85,
            0x08,
            0x06,
            0x86,
            0x08,
            0x06
        ]
    );
    assert_eq!(smc.target_speed(), -200);
}

#[test]
fn test_get_variable_frame_and_value() {
    let (link, smc) = link();
    smc.set_variable(Variable::InputVoltage, 0x2EE0);

    assert_eq!(link.get_variable(23).unwrap(), 12_000);
    let written = smc.written();
    assert_eq!(&written[written.len() - 2..], &[CMD_GET_VARIABLE, 23]);
}

#[test]
fn test_short_read_maps_to_serial_error_sentinel() {
    let (link, smc) = link();
    smc.short_reads(true);

    let err = link.get_variable(Variable::ErrorStatus.id()).unwrap_err();
    assert_eq!(err, SerialError::ShortRead { expected: 2, read: 1 });
    assert_eq!(err.code(), SERIAL_ERROR);

    // The link stays usable after a transient failure.
    smc.short_reads(false);
    assert!(link.get_variable(Variable::ErrorStatus.id()).is_ok());
}

#[test]
fn test_write_failure_is_transient() {
    let (link, smc) = link();
    smc.fail_writes(true);
    assert_eq!(link.set_target_speed(100), Err(SerialError::WriteFailed));
    assert_eq!(link.last_speed(), 0);

    smc.fail_writes(false);
    link.set_target_speed(100).unwrap();
    assert_eq!(smc.target_speed(), 100);
}

#[test]
fn test_signed_target_speed_readback() {
    let (link, _smc) = link();
    link.set_target_speed(-1234).unwrap();
    assert_eq!(link.target_speed().unwrap(), -1234);
}

#[test]
fn test_concurrent_queries_do_not_interleave() {
    let (link, smc) = link();
    smc.set_variable(Variable::Temperature, 250);
    smc.set_variable(Variable::InputVoltage, 11_700);
    let link = Arc::new(link);

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let link = Arc::clone(&link);
            thread::spawn(move || {
                for _ in 0..200 {
                    if i % 2 == 0 {
                        assert_eq!(link.variable(Variable::Temperature).unwrap(), 250);
                    } else {
                        assert_eq!(link.variable(Variable::InputVoltage).unwrap(), 11_700);
                    }
                }
            })
        })
        .collect();

    for w in workers {
        w.join().unwrap();
    }
}

proptest! {
    #[test]
    fn prop_speed_frame_is_clamped(speed in -100_000i32..100_000) {
        let frame = encode_speed(speed);
        let decoded = decode_speed(frame).unwrap();
        prop_assert!(decoded.abs() <= SMC_MAX_SPEED);
        prop_assert_eq!(decoded, speed.clamp(-SMC_MAX_SPEED, SMC_MAX_SPEED));
        prop_assert!(frame[1] < 0x20 && frame[2] < 0x80);
    }
}
