//! Sensor access for the rig's analog inputs
//!
//! The rig has three analog channels (thermistor, light sensor, IR sensor)
//! and one digital output driving the IR emitter. Raw ADC samples are
//! passed through unchanged; this layer only checks that a sample is
//! plausible for its channel before handing it to the decision logic.

pub mod thermistor;

use embedded_hal::digital::OutputPin;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::config::ExperimentConfig;

pub use thermistor::ThermistorCalibration;

/// Raw ADC sample, scaled to the full 16-bit range.
pub type Reading = u16;

/// Errors raised while talking to the rig's sensors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: read failed ({details})")]
    ReadFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: reading {value} outside {min}..={max}")]
    OutOfRange {
        sensor: &'static str,
        value: Reading,
        min: Reading,
        max: Reading,
    },
    #[error("{sensor}: output pin could not be driven")]
    PinFault { sensor: &'static str },
}

/// One of the rig's analog inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorChannel {
    Thermistor,
    Light,
    Infrared,
}

impl SensorChannel {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Thermistor => "thermistor",
            Self::Light => "light sensor",
            Self::Infrared => "IR sensor",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Thermistor => 0,
            Self::Light => 1,
            Self::Infrared => 2,
        }
    }
}

/// A single ADC channel that yields 16-bit scaled samples.
///
/// embedded-hal 1.0 has no ADC abstraction, so platform crates implement
/// this for their channel types (or a closure over their ADC driver).
pub trait AnalogChannel {
    type Error: core::fmt::Debug;

    /// Take one sample, scaled to `0..=65535`.
    fn read_u16(&mut self) -> Result<Reading, Self::Error>;
}

/// Inclusive range a channel's readings must fall in to be trusted.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingLimits {
    pub min: Reading,
    pub max: Reading,
}

impl ReadingLimits {
    pub const FULL_RANGE: Self = Self {
        min: 0,
        max: Reading::MAX,
    };

    pub const fn contains(&self, value: Reading) -> bool {
        value >= self.min && value <= self.max
    }
}

impl Default for ReadingLimits {
    fn default() -> Self {
        Self::FULL_RANGE
    }
}

/// Per-channel plausibility limits.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorLimits {
    pub thermistor: ReadingLimits,
    pub light: ReadingLimits,
    pub infrared: ReadingLimits,
}

impl SensorLimits {
    const fn for_channel(&self, channel: SensorChannel) -> ReadingLimits {
        match channel {
            SensorChannel::Thermistor => self.thermistor,
            SensorChannel::Light => self.light,
            SensorChannel::Infrared => self.infrared,
        }
    }
}

impl Default for SensorLimits {
    fn default() -> Self {
        Self {
            // A divider pinned to either rail means an open or shorted thermistor
            thermistor: ReadingLimits {
                min: 64,
                max: Reading::MAX - 64,
            },
            light: ReadingLimits::FULL_RANGE,
            infrared: ReadingLimits::FULL_RANGE,
        }
    }
}

/// Sensor operations the experiment sequencer depends on.
pub trait RigSensors {
    fn read_thermistor(&mut self) -> Result<Reading, SensorError>;
    fn read_light(&mut self) -> Result<Reading, SensorError>;
    fn read_ir(&mut self) -> Result<Reading, SensorError>;

    /// Switch the IR emitter on. Must be called once before a position
    /// check starts sampling the IR sensor.
    fn enable_ir_emitter(&mut self) -> Result<(), SensorError>;
}

/// Concrete sensor front-end over three ADC channels and the IR emitter pin.
pub struct SensorReader<T, L, R, E> {
    thermistor: T,
    light: L,
    infrared: R,
    ir_emitter: E,
    limits: SensorLimits,
    last_raw: [Option<Reading>; 3],
}

impl<T, L, R, E> SensorReader<T, L, R, E>
where
    T: AnalogChannel,
    L: AnalogChannel,
    R: AnalogChannel,
    E: OutputPin,
{
    pub fn new(thermistor: T, light: L, infrared: R, ir_emitter: E) -> Self {
        Self::with_limits(thermistor, light, infrared, ir_emitter, SensorLimits::default())
    }

    pub fn with_limits(
        thermistor: T,
        light: L,
        infrared: R,
        ir_emitter: E,
        limits: SensorLimits,
    ) -> Self {
        Self {
            thermistor,
            light,
            infrared,
            ir_emitter,
            limits,
            last_raw: [None; 3],
        }
    }

    /// Build a reader that rejects readings outside the config's limits.
    pub fn from_config(
        thermistor: T,
        light: L,
        infrared: R,
        ir_emitter: E,
        config: &ExperimentConfig,
    ) -> Self {
        Self::with_limits(thermistor, light, infrared, ir_emitter, config.limits)
    }

    pub fn set_limits(&mut self, limits: SensorLimits) {
        self.limits = limits;
    }

    /// Last raw value seen on a channel, including rejected ones.
    pub fn last_raw(&self, channel: SensorChannel) -> Option<Reading> {
        self.last_raw[channel.index()]
    }

    /// Give back the underlying channels and emitter pin.
    pub fn release(self) -> (T, L, R, E) {
        (self.thermistor, self.light, self.infrared, self.ir_emitter)
    }

    fn check(&mut self, channel: SensorChannel, value: Reading) -> Result<Reading, SensorError> {
        self.last_raw[channel.index()] = Some(value);
        let limits = self.limits.for_channel(channel);
        if !limits.contains(value) {
            error!(
                "{} reading {} outside {}..={}",
                channel.name(),
                value,
                limits.min,
                limits.max
            );
            return Err(SensorError::OutOfRange {
                sensor: channel.name(),
                value,
                min: limits.min,
                max: limits.max,
            });
        }
        Ok(value)
    }
}

fn sample<C: AnalogChannel>(channel: &mut C, which: SensorChannel) -> Result<Reading, SensorError> {
    channel.read_u16().map_err(|e| {
        error!("{} ADC read failed: {:?}", which.name(), e);
        SensorError::ReadFailed {
            sensor: which.name(),
            details: "ADC conversion error",
        }
    })
}

impl<T, L, R, E> RigSensors for SensorReader<T, L, R, E>
where
    T: AnalogChannel,
    L: AnalogChannel,
    R: AnalogChannel,
    E: OutputPin,
{
    fn read_thermistor(&mut self) -> Result<Reading, SensorError> {
        let value = sample(&mut self.thermistor, SensorChannel::Thermistor)?;
        self.check(SensorChannel::Thermistor, value)
    }

    fn read_light(&mut self) -> Result<Reading, SensorError> {
        let value = sample(&mut self.light, SensorChannel::Light)?;
        self.check(SensorChannel::Light, value)
    }

    fn read_ir(&mut self) -> Result<Reading, SensorError> {
        let value = sample(&mut self.infrared, SensorChannel::Infrared)?;
        self.check(SensorChannel::Infrared, value)
    }

    fn enable_ir_emitter(&mut self) -> Result<(), SensorError> {
        self.ir_emitter.set_high().map_err(|e| {
            error!("IR emitter could not be switched on: {:?}", e);
            SensorError::PinFault {
                sensor: "IR emitter",
            }
        })?;
        debug!("IR emitter on");
        Ok(())
    }
}
