//! Status page report

use serde::Serialize;

use super::{ExperimentPhase, StatusSnapshot};

/// What the status endpoint returns for a snapshot.
///
/// Serializes as
/// `{"output_status": ..., "completion_status": ..., "phase": ..., "error": ...}`
/// with absent values as `null`.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub output_status: Option<&'static str>,
    pub completion_status: Option<&'static str>,
    pub phase: &'static str,
    pub error: Option<&'static str>,
}

fn output_status(snapshot: &StatusSnapshot) -> Option<&'static str> {
    let colour = snapshot.colour.map(|c| c.as_str());
    match snapshot.phase {
        ExperimentPhase::AwaitingPosition => None,
        ExperimentPhase::Saturating => Some("Saturating"),
        ExperimentPhase::Spraying => Some("Spraying"),
        ExperimentPhase::Scanning => colour.or(Some("Scanning")),
        ExperimentPhase::Complete => colour,
        ExperimentPhase::Aborted => Some("Aborted"),
        ExperimentPhase::Faulted => Some("Error"),
    }
}

impl From<StatusSnapshot> for StatusReport {
    fn from(snapshot: StatusSnapshot) -> Self {
        Self {
            output_status: output_status(&snapshot),
            completion_status: snapshot.illumination_engaged.then_some("on"),
            phase: snapshot.phase.label(),
            error: snapshot.fault.map(|f| f.label()),
        }
    }
}
