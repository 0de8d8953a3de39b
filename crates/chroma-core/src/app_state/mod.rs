//! Experiment state shared between the sequencer and status reporters

mod status;

pub use status::*;

use core::cell::Cell;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::warn;
use serde::Serialize;
use thiserror_no_std::Error;

use crate::classifier::ColourBand;
use crate::sensors::SensorError;

/// Phase of an experiment run.
///
/// The first five run strictly in order, once each. `Aborted` and `Faulted`
/// are terminal states reached from any of them.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentPhase {
    AwaitingPosition,
    Saturating,
    Spraying,
    Scanning,
    Complete,
    Aborted,
    Faulted,
}

impl ExperimentPhase {
    pub const fn label(self) -> &'static str {
        match self {
            Self::AwaitingPosition => "AwaitingPosition",
            Self::Saturating => "Saturating",
            Self::Spraying => "Spraying",
            Self::Scanning => "Scanning",
            Self::Complete => "Complete",
            Self::Aborted => "Aborted",
            Self::Faulted => "Faulted",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Aborted | Self::Faulted)
    }

    /// The phase that follows this one in a successful run.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::AwaitingPosition => Some(Self::Saturating),
            Self::Saturating => Some(Self::Spraying),
            Self::Spraying => Some(Self::Scanning),
            Self::Scanning => Some(Self::Complete),
            Self::Complete | Self::Aborted | Self::Faulted => None,
        }
    }
}

impl fmt::Display for ExperimentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fault recorded in the status snapshot of a failed run.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    PositionTimeout,
    SaturationTimeout,
    ClassificationTimeout,
    SensorFault,
}

impl FaultKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::PositionTimeout => "position-timeout",
            Self::SaturationTimeout => "saturation-timeout",
            Self::ClassificationTimeout => "classification-timeout",
            Self::SensorFault => "sensor-fault",
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentError {
    #[error("paper not in position after {attempts} IR checks")]
    PositionTimeout { attempts: u32 },
    #[error("no temperature transition after {polls} polls")]
    SaturationTimeout { polls: u32 },
    #[error("light reading matched no colour band after {attempts} samples")]
    ClassificationTimeout { attempts: u32 },
    #[error("sensor fault: {0}")]
    SensorFault(SensorError),
    #[error("aborted during {phase}")]
    Aborted { phase: ExperimentPhase },
    #[error("sequencer already ran; build a new one")]
    AlreadyRun,
}

impl ExperimentError {
    /// Fault kind to publish, `None` for errors that are not rig faults.
    pub const fn kind(&self) -> Option<FaultKind> {
        match self {
            Self::PositionTimeout { .. } => Some(FaultKind::PositionTimeout),
            Self::SaturationTimeout { .. } => Some(FaultKind::SaturationTimeout),
            Self::ClassificationTimeout { .. } => Some(FaultKind::ClassificationTimeout),
            Self::SensorFault(_) => Some(FaultKind::SensorFault),
            Self::Aborted { .. } | Self::AlreadyRun => None,
        }
    }
}

impl From<SensorError> for ExperimentError {
    fn from(value: SensorError) -> Self {
        Self::SensorFault(value)
    }
}

/// Consistent view of a run, copied out whole by readers.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub phase: ExperimentPhase,
    pub colour: Option<ColourBand>,
    pub illumination_on: bool,
    /// Latched once the illumination LED has been switched on for the scan
    pub illumination_engaged: bool,
    pub fault: Option<FaultKind>,
}

impl StatusSnapshot {
    pub const INITIAL: Self = Self {
        phase: ExperimentPhase::AwaitingPosition,
        colour: None,
        illumination_on: false,
        illumination_engaged: false,
        fault: None,
    };
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self::INITIAL
    }
}

/// Status cell and abort flag shared by the sequencer and its observers.
///
/// The sequencer replaces the whole snapshot at each transition; readers
/// copy it out inside a critical section a few instructions long, so they
/// never see a half-written update and never hold up the sequencer.
///
/// `new` is `const` so a firmware image can keep this in a `static`:
///
/// ```rust,ignore
/// static STATUS: SharedStatus = SharedStatus::new();
/// ```
pub struct SharedStatus {
    snapshot: Mutex<CriticalSectionRawMutex, Cell<StatusSnapshot>>,
    abort_requested: AtomicBool,
}

impl SharedStatus {
    pub const fn new() -> Self {
        Self {
            snapshot: Mutex::new(Cell::new(StatusSnapshot::INITIAL)),
            abort_requested: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot.lock(|cell| cell.get())
    }

    /// Snapshot rendered for the status page.
    pub fn report(&self) -> StatusReport {
        StatusReport::from(self.snapshot())
    }

    pub(crate) fn publish(&self, snapshot: StatusSnapshot) {
        self.snapshot.lock(|cell| cell.set(snapshot));
    }

    /// Emergency stop. Safe to call from any task or thread at any time; the
    /// sequencer stops at its next checkpoint.
    pub fn abort(&self) {
        if !self.abort_requested.swap(true, Ordering::AcqRel) {
            warn!("Emergency stop requested");
        }
    }

    pub fn abort_requested(&self) -> bool {
        self.abort_requested.load(Ordering::Acquire)
    }
}

impl Default for SharedStatus {
    fn default() -> Self {
        Self::new()
    }
}
