//! Experiment configuration
//!
//! Every threshold, hold time and poll budget the sequencer uses. Defaults
//! are the values the rig was calibrated with. The config can be stored as a
//! compact postcard blob (e.g. in a flash page) and read back at boot.

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::classifier::SCAN_ENGAGED_THRESHOLD;
use crate::detector::DEFAULT_DELTA_THRESHOLD;
use crate::sensors::{Reading, SensorLimits, ThermistorCalibration};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config could not be encoded")]
    Encode,
    #[error("config could not be decoded")]
    Decode,
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Bounded polling: how long to wait between checks and how many to make.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval_ms: u32,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub const fn new(interval_ms: u32, max_attempts: u32) -> Self {
        Self {
            interval_ms,
            max_attempts,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionConfig {
    /// IR reading at or above which the paper counts as in position
    pub ir_threshold: Reading,
    pub poll: PollPolicy,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            ir_threshold: 5000,
            // One minute at 50 ms
            poll: PollPolicy::new(50, 1200),
        }
    }
}

/// What ends the saturation phase.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum SaturationTrigger {
    /// Raw thermistor swing above the delta threshold between two samples
    TemperatureSwing,
    /// Calibrated temperature at or above `threshold_c`
    AbsoluteTemperature { threshold_c: f32 },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SaturationConfig {
    pub trigger: SaturationTrigger,
    pub delta_threshold: u16,
    /// Give up after this many polls. `None` waits until aborted.
    pub max_polls: Option<u32>,
}

impl Default for SaturationConfig {
    fn default() -> Self {
        Self {
            trigger: SaturationTrigger::TemperatureSwing,
            delta_threshold: DEFAULT_DELTA_THRESHOLD,
            max_polls: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    /// Light reading above which the scan counts as engaged
    pub engage_threshold: Reading,
    pub poll: PollPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            engage_threshold: SCAN_ENGAGED_THRESHOLD,
            poll: PollPolicy::new(10, 500),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ExperimentConfig {
    /// Base delay for detector gaps and phase holds
    pub time_unit_ms: u32,
    pub position: PositionConfig,
    pub saturation: SaturationConfig,
    pub spray_settle_units: u32,
    pub scan: ScanConfig,
    pub scan_hold_units: u32,
    pub cooldown_units: u32,
    /// Applied by `SensorReader::from_config`
    pub limits: SensorLimits,
    pub thermistor: ThermistorCalibration,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            time_unit_ms: 1000,
            position: PositionConfig::default(),
            saturation: SaturationConfig::default(),
            spray_settle_units: 3,
            scan: ScanConfig::default(),
            scan_hold_units: 1,
            cooldown_units: 10,
            limits: SensorLimits::default(),
            thermistor: ThermistorCalibration::default(),
        }
    }
}

impl ExperimentConfig {
    /// Milliseconds in `units` time units.
    pub const fn units_ms(&self, units: u32) -> u32 {
        self.time_unit_ms.saturating_mul(units)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.time_unit_ms == 0 {
            return Err(ConfigError::Invalid("time unit must be non-zero"));
        }
        if self.position.poll.max_attempts == 0 {
            return Err(ConfigError::Invalid("position poll budget must be non-zero"));
        }
        if self.scan.poll.max_attempts == 0 {
            return Err(ConfigError::Invalid("scan poll budget must be non-zero"));
        }
        if self.saturation.max_polls == Some(0) {
            return Err(ConfigError::Invalid("saturation poll budget must be non-zero"));
        }
        if let SaturationTrigger::AbsoluteTemperature { threshold_c } = self.saturation.trigger {
            if !threshold_c.is_finite() {
                return Err(ConfigError::Invalid("temperature threshold must be finite"));
            }
        }
        for limits in [self.limits.thermistor, self.limits.light, self.limits.infrared] {
            if limits.min > limits.max {
                return Err(ConfigError::Invalid("sensor limits are inverted"));
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Encode)
    }

    /// Decode and validate a stored config.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Decode)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_calibration() {
        let config = ExperimentConfig::default();
        assert_eq!(config.time_unit_ms, 1000);
        assert_eq!(config.position.ir_threshold, 5000);
        assert_eq!(config.saturation.delta_threshold, 1000);
        assert_eq!(config.scan.engage_threshold, 50_000);
        assert_eq!(config.spray_settle_units, 3);
        assert_eq!(config.scan_hold_units, 1);
        assert_eq!(config.cooldown_units, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_units_ms_saturates() {
        let config = ExperimentConfig {
            time_unit_ms: u32::MAX,
            ..ExperimentConfig::default()
        };
        assert_eq!(config.units_ms(10), u32::MAX);
        assert_eq!(ExperimentConfig::default().units_ms(3), 3000);
    }

    #[test]
    fn test_validate_rejects_zero_budgets() {
        let mut config = ExperimentConfig::default();
        config.time_unit_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ExperimentConfig::default();
        config.position.poll.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ExperimentConfig::default();
        config.scan.poll.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ExperimentConfig::default();
        config.saturation.max_polls = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stored_config_restores() {
        let mut config = ExperimentConfig::default();
        config.time_unit_ms = 250;
        config.saturation.trigger = SaturationTrigger::AbsoluteTemperature { threshold_c: 27.5 };
        config.saturation.max_polls = Some(90);

        let bytes = config.to_bytes().unwrap();
        assert_eq!(ExperimentConfig::from_bytes(&bytes), Ok(config));
    }

    #[test]
    fn test_garbage_does_not_decode() {
        assert_eq!(ExperimentConfig::from_bytes(&[0xff]), Err(ConfigError::Decode));
    }
}
