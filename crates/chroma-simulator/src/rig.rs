//! Simulated rig hardware
//!
//! A tiny plant model that reacts to the sequencer the way the bench rig
//! does: the paper slides into the IR beam after a while, the thermistor
//! jumps when the solvent front reaches it, and the light sensor only sees a
//! usable signal while the illumination LED is on.

use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;
use std::time::Duration;

use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;
use log::debug;

use chroma_core::sensors::{AnalogChannel, Reading};
use chroma_core::{
    ActuatorController, ColourBand, ExperimentConfig, ExperimentContext, ExperimentSequencer,
    SensorReader, SharedStatus,
};

/// IR samples taken before the paper reaches the beam.
const PAPER_ARRIVES_AFTER: u32 = 20;
const IR_CLEAR: Reading = 900;
const IR_BLOCKED: Reading = 5600;

/// Thermistor samples before the solvent front arrives. Odd so the jump
/// lands between the two samples of one detector poll.
const FRONT_ARRIVES_AFTER: u32 = 7;
const THERMISTOR_BASELINE: Reading = 30_000;
const THERMISTOR_WET: Reading = 32_500;

const LIGHT_AMBIENT: Reading = 1_200;
const LIGHT_ENGAGED: Reading = 61_000;

/// Plant state shared between the simulated channels and pins.
struct Plant {
    colour: ColourBand,
    stall_position: bool,
    ir_samples: Cell<u32>,
    thermistor_samples: Cell<u32>,
    lit_samples: Cell<u32>,
    illumination: Rc<Cell<bool>>,
}

fn bump(counter: &Cell<u32>) -> u32 {
    let n = counter.get();
    counter.set(n + 1);
    n
}

/// Centre of the band, where a developed spot reads on the bench.
fn band_midpoint(colour: ColourBand) -> Reading {
    let (start, end) = colour.range();
    start + (end - start) / 2
}

pub struct SimChannel {
    plant: Rc<Plant>,
    sample: fn(&Plant) -> Reading,
}

impl AnalogChannel for SimChannel {
    type Error = Infallible;

    fn read_u16(&mut self) -> Result<Reading, Self::Error> {
        Ok((self.sample)(&self.plant))
    }
}

fn sample_ir(plant: &Plant) -> Reading {
    let n = bump(&plant.ir_samples);
    if !plant.stall_position && n >= PAPER_ARRIVES_AFTER {
        IR_BLOCKED
    } else {
        IR_CLEAR + (n % 5) as Reading * 40
    }
}

fn sample_thermistor(plant: &Plant) -> Reading {
    let n = bump(&plant.thermistor_samples);
    if n >= FRONT_ARRIVES_AFTER {
        THERMISTOR_WET
    } else {
        THERMISTOR_BASELINE + (n % 3) as Reading * 60
    }
}

fn sample_light(plant: &Plant) -> Reading {
    if !plant.illumination.get() {
        return LIGHT_AMBIENT;
    }
    match bump(&plant.lit_samples) {
        0 => LIGHT_ENGAGED,
        _ => band_midpoint(plant.colour),
    }
}

/// Output pin that just remembers its level.
pub struct SimPin {
    name: &'static str,
    level: Rc<Cell<bool>>,
}

impl SimPin {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            level: Rc::default(),
        }
    }

    fn wired_to(name: &'static str, level: Rc<Cell<bool>>) -> Self {
        Self { name, level }
    }

    fn set(&mut self, high: bool) {
        if self.level.replace(high) != high {
            debug!("{} -> {}", self.name, if high { "on" } else { "off" });
        }
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.set(true);
        Ok(())
    }
}

/// Wall-clock delay for the host.
pub struct StdDelay;

impl DelayNs for StdDelay {
    async fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns as u64));
    }

    async fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}

pub type SimSensors = SensorReader<SimChannel, SimChannel, SimChannel, SimPin>;

pub struct SimulatedRig {
    plant: Rc<Plant>,
}

impl SimulatedRig {
    pub fn new(colour: ColourBand, stall_position: bool) -> Self {
        Self {
            plant: Rc::new(Plant {
                colour,
                stall_position,
                ir_samples: Cell::new(0),
                thermistor_samples: Cell::new(0),
                lit_samples: Cell::new(0),
                illumination: Rc::default(),
            }),
        }
    }

    fn channel(&self, sample: fn(&Plant) -> Reading) -> SimChannel {
        SimChannel {
            plant: self.plant.clone(),
            sample,
        }
    }

    /// Wire the simulated hardware into a ready-to-run sequencer.
    pub fn sequencer<'a>(
        &self,
        config: ExperimentConfig,
        status: &'a SharedStatus,
    ) -> ExperimentSequencer<'a, SimSensors, SimPin, StdDelay> {
        let sensors = SensorReader::from_config(
            self.channel(sample_thermistor),
            self.channel(sample_light),
            self.channel(sample_ir),
            SimPin::new("IR emitter"),
            &config,
        );
        let actuators = ActuatorController::new(
            [
                SimPin::new("Stage LED 0 (saturating)"),
                SimPin::new("Stage LED 1 (spraying)"),
                SimPin::new("Stage LED 2 (complete)"),
            ],
            SimPin::wired_to("Illumination LED", self.plant.illumination.clone()),
        );
        ExperimentSequencer::new(
            ExperimentContext::new(sensors, actuators, StdDelay),
            config,
            status,
        )
    }
}
