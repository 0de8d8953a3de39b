//! Hardware-independent core library for chroma-rs
//!
//! This crate contains all platform-agnostic logic for the chromatography
//! experiment rig: sensor interpretation, colour classification, actuator
//! bookkeeping, and the experiment sequencer that ties them together.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod actuators;
pub mod app_state;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod sensors;
pub mod sequencer;

#[cfg(test)]
pub(crate) mod testing;

pub use actuators::{ActuatorController, ActuatorState};
pub use app_state::{
    ExperimentError, ExperimentPhase, FaultKind, SharedStatus, StatusReport, StatusSnapshot,
};
pub use classifier::{ColourBand, ColourClassifier};
pub use config::ExperimentConfig;
pub use detector::{TemperatureChangeDetector, TemperatureThreshold};
pub use sensors::{AnalogChannel, Reading, RigSensors, SensorError, SensorReader};
pub use sequencer::{ExperimentContext, ExperimentOutcome, ExperimentSequencer};
