//! Test doubles for the rig hardware

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::digital::{self, ErrorKind, ErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;

use crate::app_state::SharedStatus;
use crate::sensors::{AnalogChannel, Reading, SensorReader};

/// Shared view of a mock pin's level.
#[derive(Clone, Default)]
pub struct PinProbe(Rc<Cell<bool>>);

impl PinProbe {
    pub fn get(&self) -> bool {
        self.0.get()
    }
}

#[derive(Debug)]
pub struct MockPinError;

impl digital::Error for MockPinError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

pub struct MockPin {
    level: PinProbe,
    broken: bool,
}

impl MockPin {
    pub fn new() -> Self {
        Self {
            level: PinProbe::default(),
            broken: false,
        }
    }

    /// A pin whose every write fails.
    pub fn broken() -> Self {
        Self {
            level: PinProbe::default(),
            broken: true,
        }
    }

    pub fn probe(&self) -> PinProbe {
        self.level.clone()
    }
}

impl ErrorType for MockPin {
    type Error = MockPinError;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.broken {
            return Err(MockPinError);
        }
        self.level.0.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if self.broken {
            return Err(MockPinError);
        }
        self.level.0.set(true);
        Ok(())
    }
}

#[derive(Debug)]
pub struct ChannelOff;

/// Replays a fixed list of readings, then repeats the last one.
pub struct ScriptedChannel {
    script: VecDeque<Reading>,
    last: Reading,
    reads: Rc<Cell<usize>>,
    gate: Option<PinProbe>,
}

impl ScriptedChannel {
    pub fn new(script: &[Reading]) -> Self {
        Self {
            script: script.iter().copied().collect(),
            last: 0,
            reads: Rc::default(),
            gate: None,
        }
    }

    /// Fail every read taken while `pin` is low.
    pub fn gated_by(mut self, pin: PinProbe) -> Self {
        self.gate = Some(pin);
        self
    }

    pub fn reads(&self) -> Rc<Cell<usize>> {
        self.reads.clone()
    }
}

impl AnalogChannel for ScriptedChannel {
    type Error = ChannelOff;

    fn read_u16(&mut self) -> Result<Reading, Self::Error> {
        if let Some(gate) = &self.gate {
            if !gate.get() {
                return Err(ChannelOff);
            }
        }
        self.reads.set(self.reads.get() + 1);
        if let Some(next) = self.script.pop_front() {
            self.last = next;
        }
        Ok(self.last)
    }
}

/// An ADC channel that never converts.
pub struct FailingChannel;

impl AnalogChannel for FailingChannel {
    type Error = ChannelOff;

    fn read_u16(&mut self) -> Result<Reading, Self::Error> {
        Err(ChannelOff)
    }
}

pub type TestSensors = SensorReader<ScriptedChannel, ScriptedChannel, ScriptedChannel, MockPin>;

/// Handles into a scripted rig for assertions after a run.
pub struct RigProbe {
    pub emitter: PinProbe,
    pub thermistor_reads: Rc<Cell<usize>>,
    pub light_reads: Rc<Cell<usize>>,
    pub ir_reads: Rc<Cell<usize>>,
}

/// Build a sensor reader from three scripts. The IR channel only answers
/// once the emitter is on.
pub fn scripted_sensors(
    thermistor: &[Reading],
    light: &[Reading],
    ir: &[Reading],
) -> (TestSensors, RigProbe) {
    let emitter = MockPin::new();
    let thermistor = ScriptedChannel::new(thermistor);
    let light = ScriptedChannel::new(light);
    let ir = ScriptedChannel::new(ir).gated_by(emitter.probe());
    let probe = RigProbe {
        emitter: emitter.probe(),
        thermistor_reads: thermistor.reads(),
        light_reads: light.reads(),
        ir_reads: ir.reads(),
    };
    (SensorReader::new(thermistor, light, ir, emitter), probe)
}

/// Delay that returns immediately and records what was asked of it.
///
/// Optionally requests an abort once a given amount of virtual time has
/// passed, to exercise mid-run emergency stops.
pub struct MockDelay<'a> {
    elapsed_ns: u64,
    history_ms: Vec<u32>,
    abort_at: Option<(&'a SharedStatus, u64)>,
}

impl MockDelay<'static> {
    pub fn new() -> Self {
        Self {
            elapsed_ns: 0,
            history_ms: Vec::new(),
            abort_at: None,
        }
    }
}

impl<'a> MockDelay<'a> {
    pub fn aborting(status: &'a SharedStatus, after_ms: u64) -> Self {
        Self {
            elapsed_ns: 0,
            history_ms: Vec::new(),
            abort_at: Some((status, after_ms)),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }

    pub fn calls(&self) -> usize {
        self.history_ms.len()
    }

    pub fn history_ms(&self) -> &[u32] {
        &self.history_ms
    }

    fn advance(&mut self, ns: u64) {
        self.elapsed_ns += ns;
        if let Some((status, after_ms)) = self.abort_at {
            if self.elapsed_ms() >= after_ms {
                status.abort();
            }
        }
    }
}

impl DelayNs for MockDelay<'_> {
    async fn delay_ns(&mut self, ns: u32) {
        self.history_ms.push(ns / 1_000_000);
        self.advance(ns as u64);
    }

    async fn delay_us(&mut self, us: u32) {
        self.history_ms.push(us / 1_000);
        self.advance(us as u64 * 1_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.history_ms.push(ms);
        self.advance(ms as u64 * 1_000_000);
    }
}
