//! Colour classification of the optical scan
//!
//! The light sensor reading under the illumination LED is matched against a
//! fixed table of empirically calibrated bands. The band edges are tight
//! (yellow and white sit only 600 counts apart) and must not be merged or
//! rounded.

use core::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::sensors::Reading;

/// Light reading above which the scan counts as engaged.
pub const SCAN_ENGAGED_THRESHOLD: Reading = 50_000;

/// Named colour readout of an experiment.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourBand {
    Blue,
    RedPink,
    Pink,
    Yellow,
    White,
}

impl ColourBand {
    /// Lookup order; first match wins. Order matches the rig's calibration
    /// sheet.
    pub const ALL: [ColourBand; 5] = [
        Self::Blue,
        Self::RedPink,
        Self::Pink,
        Self::Yellow,
        Self::White,
    ];

    /// Label reported to the status page.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::RedPink => "red-pink",
            Self::Pink => "pink",
            Self::Yellow => "yellow",
            Self::White => "white",
        }
    }

    /// The half-open `[start, end)` light range of this band.
    pub const fn range(self) -> (Reading, Reading) {
        match self {
            Self::Blue => (19_600, 20_200),
            Self::RedPink => (29_000, 29_600),
            Self::Pink => (34_500, 34_900),
            Self::Yellow => (32_000, 32_800),
            Self::White => (33_400, 34_200),
        }
    }

    pub const fn contains(self, light: Reading) -> bool {
        let (start, end) = self.range();
        light >= start && light < end
    }

    /// Look a light reading up in the band table.
    pub fn from_reading(light: Reading) -> Option<Self> {
        Self::ALL.into_iter().find(|band| band.contains(light))
    }
}

impl fmt::Display for ColourBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateful classifier for one scan.
///
/// Readings only become meaningful once the sensor has reported a value above
/// the engage threshold, which happens when the illumination LED lights the
/// plate. Until then every sample is ignored. After engagement each sample is
/// looked up in the band table; `None` means the caller should sample again.
#[derive(Debug, Clone)]
pub struct ColourClassifier {
    engage_threshold: Reading,
    engaged: bool,
}

impl ColourClassifier {
    pub const fn new(engage_threshold: Reading) -> Self {
        Self {
            engage_threshold,
            engaged: false,
        }
    }

    pub const fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// Forget engagement, ready for a new scan.
    pub fn reset(&mut self) {
        self.engaged = false;
    }

    pub fn classify(&mut self, light: Reading) -> Option<ColourBand> {
        if !self.engaged {
            if light > self.engage_threshold {
                debug!("Scan engaged at light reading {}", light);
                self.engaged = true;
            }
            return None;
        }

        let band = ColourBand::from_reading(light);
        debug!("Light reading {} -> {:?}", light, band);
        band
    }
}

impl Default for ColourClassifier {
    fn default() -> Self {
        Self::new(SCAN_ENGAGED_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engaged() -> ColourClassifier {
        let mut classifier = ColourClassifier::default();
        assert_eq!(classifier.classify(60_000), None);
        assert!(classifier.is_engaged());
        classifier
    }

    #[test]
    fn test_band_boundaries_are_half_open() {
        for band in ColourBand::ALL {
            let (start, end) = band.range();
            assert_eq!(ColourBand::from_reading(start), Some(band), "{band} start");
            assert_eq!(ColourBand::from_reading(end - 1), Some(band), "{band} last");
            assert_ne!(ColourBand::from_reading(end), Some(band), "{band} end");
            assert_ne!(ColourBand::from_reading(start - 1), Some(band), "{band} below");
        }
    }

    #[test]
    fn test_band_ranges_are_disjoint() {
        for (i, a) in ColourBand::ALL.iter().enumerate() {
            let (a_start, a_end) = a.range();
            assert!(a_start < a_end, "{a} is empty");
            for b in &ColourBand::ALL[i + 1..] {
                let (b_start, b_end) = b.range();
                assert!(a_end <= b_start || b_end <= a_start, "{a} overlaps {b}");
            }
        }
    }

    #[test]
    fn test_exact_calibrated_edges() {
        assert_eq!(ColourBand::from_reading(19_600), Some(ColourBand::Blue));
        assert_eq!(ColourBand::from_reading(20_199), Some(ColourBand::Blue));
        assert_eq!(ColourBand::from_reading(20_200), None);
        assert_eq!(ColourBand::from_reading(32_799), Some(ColourBand::Yellow));
        assert_eq!(ColourBand::from_reading(32_800), None);
        assert_eq!(ColourBand::from_reading(33_399), None);
        assert_eq!(ColourBand::from_reading(33_400), Some(ColourBand::White));
        assert_eq!(ColourBand::from_reading(34_199), Some(ColourBand::White));
        assert_eq!(ColourBand::from_reading(34_200), None);
        assert_eq!(ColourBand::from_reading(34_500), Some(ColourBand::Pink));
        assert_eq!(ColourBand::from_reading(29_599), Some(ColourBand::RedPink));
    }

    #[test]
    fn test_gaps_match_nothing() {
        for light in [0, 10_000, 25_000, 31_999, 34_300, 40_000, 50_000, 65_535] {
            assert_eq!(ColourBand::from_reading(light), None, "{light}");
        }
    }

    #[test]
    fn test_gate_blocks_first_call() {
        for light in [0, 19_900, 29_300, 34_700, 32_400, 33_800, 50_000] {
            let mut classifier = ColourClassifier::default();
            assert_eq!(classifier.classify(light), None, "{light}");
            assert!(!classifier.is_engaged());
        }
    }

    #[test]
    fn test_gate_is_strictly_greater() {
        let mut classifier = ColourClassifier::default();
        classifier.classify(50_000);
        assert!(!classifier.is_engaged());
        classifier.classify(50_001);
        assert!(classifier.is_engaged());
    }

    #[test]
    fn test_classifies_after_engagement() {
        let mut classifier = engaged();
        assert_eq!(classifier.classify(19_900), Some(ColourBand::Blue));
        assert_eq!(classifier.classify(29_300), Some(ColourBand::RedPink));
        assert_eq!(classifier.classify(34_700), Some(ColourBand::Pink));
        assert_eq!(classifier.classify(32_400), Some(ColourBand::Yellow));
        assert_eq!(classifier.classify(33_800), Some(ColourBand::White));
    }

    #[test]
    fn test_unmatched_reading_asks_for_resample() {
        let mut classifier = engaged();
        assert_eq!(classifier.classify(61_000), None);
        assert_eq!(classifier.classify(25_000), None);
        assert!(classifier.is_engaged());
        assert_eq!(classifier.classify(19_900), Some(ColourBand::Blue));
    }

    #[test]
    fn test_reset_disengages() {
        let mut classifier = engaged();
        classifier.reset();
        assert_eq!(classifier.classify(19_900), None);
    }

    #[test]
    fn test_labels() {
        assert_eq!(ColourBand::RedPink.as_str(), "red-pink");
        assert_eq!(ColourBand::Blue.to_string(), "blue");
    }
}
