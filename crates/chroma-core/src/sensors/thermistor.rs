//! Thermistor calibration
//!
//! Converts a raw thermistor divider reading into degrees Celsius using the
//! B-parameter form of the Steinhart-Hart equation. The sequencer's primary
//! saturation trigger works on raw deltas; this conversion backs the
//! absolute-temperature trigger.

use serde::{Deserialize, Serialize};

use super::Reading;

/// 25 °C in kelvin.
const REFERENCE_TEMP_K: f32 = 298.15;
const KELVIN_OFFSET: f32 = 273.15;

/// Thermistor and divider parameters.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ThermistorCalibration {
    /// B constant of the thermistor
    pub b_constant: f32,
    /// Thermistor resistance at 25 °C, in ohms
    pub resistance_at_25c: f32,
    /// Fixed resistor in the voltage divider, in ohms
    pub series_resistor: f32,
}

impl ThermistorCalibration {
    /// 10k NTC (B = 3950) with a 10k series resistor.
    pub const NTC_10K: Self = Self {
        b_constant: 3950.0,
        resistance_at_25c: 10_000.0,
        series_resistor: 10_000.0,
    };

    /// Thermistor resistance for a raw reading, `None` if the divider
    /// output is at either rail.
    ///
    /// The supply voltage cancels out of the divider equation, so only the
    /// reading's fraction of full scale matters.
    pub fn resistance(&self, raw: Reading) -> Option<f32> {
        if raw == 0 || raw == Reading::MAX {
            return None;
        }
        Some(self.series_resistor * (Reading::MAX - raw) as f32 / raw as f32)
    }

    /// Temperature in degrees Celsius for a raw reading.
    pub fn celsius(&self, raw: Reading) -> Option<f32> {
        let resistance = self.resistance(raw)?;
        let inverse_k =
            libm::logf(resistance / self.resistance_at_25c) / self.b_constant + 1.0 / REFERENCE_TEMP_K;
        Some(1.0 / inverse_k - KELVIN_OFFSET)
    }
}

impl Default for ThermistorCalibration {
    fn default() -> Self {
        Self::NTC_10K
    }
}
