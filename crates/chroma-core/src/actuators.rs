//! Stage and illumination LED control
//!
//! Three stage LEDs mark saturating, spraying and completion. The
//! illumination LED lights the TLC plate while it is scanned. The controller
//! keeps a copy of what it last wrote successfully so status reporting never
//! has to touch the pins.

use embedded_hal::digital::{OutputPin, PinState};
use log::{debug, warn};
use serde::Serialize;

pub const STAGE_SATURATING: usize = 0;
pub const STAGE_SPRAYING: usize = 1;
pub const STAGE_COMPLETE: usize = 2;
pub const STAGE_COUNT: usize = 3;

/// On/off state of every actuator LED.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActuatorState {
    pub stages: [bool; STAGE_COUNT],
    pub illumination: bool,
}

impl ActuatorState {
    pub const ALL_OFF: Self = Self {
        stages: [false; STAGE_COUNT],
        illumination: false,
    };

    pub fn stages_off(&self) -> bool {
        self.stages.iter().all(|on| !on)
    }

    pub fn all_off(&self) -> bool {
        self.stages_off() && !self.illumination
    }
}

pub struct ActuatorController<P> {
    stage_pins: [P; STAGE_COUNT],
    illumination_pin: P,
    state: ActuatorState,
}

impl<P: OutputPin> ActuatorController<P> {
    /// Take ownership of the pins and drive them all low.
    pub fn new(stage_pins: [P; STAGE_COUNT], illumination_pin: P) -> Self {
        let mut controller = Self {
            stage_pins,
            illumination_pin,
            state: ActuatorState::ALL_OFF,
        };
        for index in 0..STAGE_COUNT {
            controller.write_stage(index, false);
        }
        controller.write_illumination(false);
        controller
    }

    pub const fn state(&self) -> ActuatorState {
        self.state
    }

    /// Switch one stage LED. Indices outside `0..3` are ignored.
    pub fn set_stage(&mut self, index: usize, on: bool) {
        if index >= STAGE_COUNT {
            debug!("Ignoring stage LED index {}", index);
            return;
        }
        self.write_stage(index, on);
    }

    pub fn set_illumination(&mut self, on: bool) {
        self.write_illumination(on);
    }

    /// Turn every stage LED off. The illumination LED is left alone.
    pub fn reset_all(&mut self) {
        for index in 0..STAGE_COUNT {
            self.write_stage(index, false);
        }
    }

    /// Turn every LED off, illumination included.
    pub fn force_all_off(&mut self) {
        self.reset_all();
        self.write_illumination(false);
    }

    /// Give back the pins.
    pub fn release(self) -> ([P; STAGE_COUNT], P) {
        (self.stage_pins, self.illumination_pin)
    }

    fn write_stage(&mut self, index: usize, on: bool) {
        match self.stage_pins[index].set_state(PinState::from(on)) {
            Ok(()) => self.state.stages[index] = on,
            Err(e) => warn!("Stage LED {} could not be set to {}: {:?}", index, on, e),
        }
    }

    fn write_illumination(&mut self, on: bool) {
        match self.illumination_pin.set_state(PinState::from(on)) {
            Ok(()) => self.state.illumination = on,
            Err(e) => warn!("Illumination LED could not be set to {}: {:?}", on, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockPin, PinProbe};

    fn controller() -> (ActuatorController<MockPin>, [PinProbe; 4]) {
        let pins = [MockPin::new(), MockPin::new(), MockPin::new(), MockPin::new()];
        let probes = [pins[0].probe(), pins[1].probe(), pins[2].probe(), pins[3].probe()];
        let [a, b, c, light] = pins;
        (ActuatorController::new([a, b, c], light), probes)
    }

    #[test]
    fn test_starts_all_off() {
        let (ctl, probes) = controller();
        assert!(ctl.state().all_off());
        assert!(probes.iter().all(|p| !p.get()));
    }

    #[test]
    fn test_set_stage_drives_pin() {
        let (mut ctl, probes) = controller();
        ctl.set_stage(STAGE_SPRAYING, true);

        assert_eq!(ctl.state().stages, [false, true, false]);
        assert!(probes[1].get());
        assert!(!probes[0].get());
    }

    #[test]
    fn test_out_of_range_stage_is_noop() {
        let (mut ctl, _) = controller();
        ctl.set_stage(3, true);
        ctl.set_stage(usize::MAX, true);
        assert!(ctl.state().all_off());
    }

    #[test]
    fn test_reset_all_leaves_illumination() {
        let (mut ctl, probes) = controller();
        ctl.set_stage(STAGE_SATURATING, true);
        ctl.set_stage(STAGE_COMPLETE, true);
        ctl.set_illumination(true);

        ctl.reset_all();

        assert!(ctl.state().stages_off());
        assert!(ctl.state().illumination);
        assert!(probes[3].get());
    }

    #[test]
    fn test_reset_all_is_idempotent() {
        let (mut ctl, _) = controller();
        for stage in 0..STAGE_COUNT {
            ctl.reset_all();
            ctl.set_stage(stage, true);
            ctl.set_stage(stage, true);
            ctl.reset_all();
            ctl.reset_all();
            assert!(ctl.state().stages_off());
        }
    }

    #[test]
    fn test_force_all_off() {
        let (mut ctl, probes) = controller();
        ctl.set_stage(STAGE_SATURATING, true);
        ctl.set_illumination(true);

        ctl.force_all_off();

        assert!(ctl.state().all_off());
        assert!(probes.iter().all(|p| !p.get()));
    }

    #[test]
    fn test_failed_write_keeps_recorded_state() {
        let mut ctl = ActuatorController::new(
            [MockPin::new(), MockPin::broken(), MockPin::new()],
            MockPin::new(),
        );
        ctl.set_stage(STAGE_SPRAYING, true);
        assert!(!ctl.state().stages[STAGE_SPRAYING]);
    }
}
