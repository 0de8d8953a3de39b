//! Saturation triggers
//!
//! Saturation ends when the solvent front reaches the thermistor on the TLC
//! plate. The primary trigger looks for a sharp swing between two raw
//! thermistor samples; the absolute trigger converts to degrees Celsius and
//! compares against a fixed threshold.

use embedded_hal_async::delay::DelayNs;
use log::{debug, info};

use crate::sensors::{Reading, RigSensors, SensorError, ThermistorCalibration};

/// Default raw-count swing that counts as a temperature transition.
pub const DEFAULT_DELTA_THRESHOLD: u16 = 1000;

/// Default absolute trigger temperature in degrees Celsius.
pub const DEFAULT_THRESHOLD_C: f32 = 25.0;

/// One-shot delta test between two thermistor samples.
#[derive(Debug, Clone, Copy)]
pub struct TemperatureChangeDetector {
    threshold: u16,
    sample_gap_ms: u32,
}

impl TemperatureChangeDetector {
    pub const fn new(threshold: u16, sample_gap_ms: u32) -> Self {
        Self {
            threshold,
            sample_gap_ms,
        }
    }

    pub const fn threshold(&self) -> u16 {
        self.threshold
    }

    /// Swing strictly larger than the threshold, in either direction.
    pub const fn is_significant(&self, first: Reading, second: Reading) -> bool {
        first.abs_diff(second) > self.threshold
    }

    /// Sample, wait one gap, sample again, and compare.
    pub async fn detect_change<S, D>(
        &self,
        sensors: &mut S,
        delay: &mut D,
    ) -> Result<bool, SensorError>
    where
        S: RigSensors,
        D: DelayNs,
    {
        let first = sensors.read_thermistor()?;
        delay.delay_ms(self.sample_gap_ms).await;
        let second = sensors.read_thermistor()?;

        let changed = self.is_significant(first, second);
        if changed {
            info!("Temperature swing {} -> {}", first, second);
        } else {
            debug!("Thermistor steady: {} -> {}", first, second);
        }
        Ok(changed)
    }
}

/// Absolute temperature trigger using the calibrated thermistor curve.
#[derive(Debug, Clone, Copy)]
pub struct TemperatureThreshold {
    calibration: ThermistorCalibration,
    threshold_c: f32,
}

impl TemperatureThreshold {
    pub const fn new(calibration: ThermistorCalibration, threshold_c: f32) -> Self {
        Self {
            calibration,
            threshold_c,
        }
    }

    /// Whether a raw reading is at or above the threshold. Readings with no
    /// defined temperature never count.
    pub fn reached(&self, raw: Reading) -> bool {
        match self.calibration.celsius(raw) {
            Some(temp) => {
                debug!("Thermistor {} = {} C", raw, temp);
                temp >= self.threshold_c
            }
            None => false,
        }
    }
}
