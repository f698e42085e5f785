//! In-memory motor controller.

use super::transport::SerialTransport;
use super::{
    CMD_AUTO_BAUD, CMD_EXIT_SAFE_START, CMD_GET_VARIABLE, CMD_MOTOR_FORWARD, CMD_MOTOR_REVERSE,
    Variable, decode_speed,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;

/// Default simulated supply [mV].
const SIM_INPUT_MV: u16 = 12_000;

#[derive(Debug, Default)]
struct SimSmcState {
    written: Vec<u8>,
    reply: VecDeque<u8>,
    variables: HashMap<u8, u16>,
    target_speed: i32,
    speeds: Vec<i32>,
    baud_detected: bool,
    safe_start_exited: bool,
    fail_writes: bool,
    short_reads: bool,
}

impl SimSmcState {
    fn handle(&mut self, frame: &[u8]) {
        self.written.extend_from_slice(frame);
        match frame {
            [CMD_AUTO_BAUD] => self.baud_detected = true,
            [CMD_EXIT_SAFE_START] => self.safe_start_exited = true,
            [cmd @ (CMD_MOTOR_FORWARD | CMD_MOTOR_REVERSE), lo, hi] => {
                if self.safe_start_exited {
                    if let Some(speed) = decode_speed([*cmd, *lo, *hi]) {
                        self.target_speed = speed;
                        self.speeds.push(speed);
                    }
                }
            }
            [CMD_GET_VARIABLE, id] => {
                let value = self.variable(*id);
                let [lo, hi] = value.to_le_bytes();
                self.reply.push_back(lo);
                if !self.short_reads {
                    self.reply.push_back(hi);
                }
            }
            _ => {}
        }
    }

    fn variable(&self, id: u8) -> u16 {
        if id == Variable::TargetSpeed.id() {
            return self.target_speed as i16 as u16;
        }
        self.variables.get(&id).copied().unwrap_or_else(|| {
            if id == Variable::InputVoltage.id() {
                SIM_INPUT_MV
            } else {
                0
            }
        })
    }
}

/// Motor controller that decodes frames in memory.
///
/// Clones share state: hand one to [`SmcLink::with_transport`] and keep
/// another to inspect or perturb the controller.
///
/// [`SmcLink::with_transport`]: super::SmcLink::with_transport
#[derive(Debug, Clone, Default)]
pub struct SimulatedSmc {
    state: Arc<Mutex<SimSmcState>>,
}

impl SimulatedSmc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every byte written so far.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// Speed last accepted by the controller.
    pub fn target_speed(&self) -> i32 {
        self.state.lock().target_speed
    }

    /// Every speed accepted by the controller, in order.
    pub fn commanded_speeds(&self) -> Vec<i32> {
        self.state.lock().speeds.clone()
    }

    /// Whether the handshake has completed.
    pub fn is_ready(&self) -> bool {
        let state = self.state.lock();
        state.baud_detected && state.safe_start_exited
    }

    /// Preset a variable value.
    pub fn set_variable(&self, var: Variable, value: u16) {
        self.state.lock().variables.insert(var.id(), value);
    }

    /// Make writes fail.
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Answer variable reads with a single byte.
    pub fn short_reads(&self, short: bool) {
        self.state.lock().short_reads = short;
    }
}

impl SerialTransport for SimulatedSmc {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated write failure"));
        }
        state.handle(bytes);
        Ok(bytes.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        let mut n = 0;
        while n < buf.len() {
            match state.reply.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}
