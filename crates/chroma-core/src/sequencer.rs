//! Experiment sequencer
//!
//! Drives one experiment run through its phases:
//!
//! | Phase            | Actuators                 | Leaves when                |
//! |------------------|---------------------------|----------------------------|
//! | AwaitingPosition | stage LEDs off            | IR reading >= threshold    |
//! | Saturating       | stage 0 on                | saturation trigger fires   |
//! | Spraying         | stage 1 on                | settle hold elapsed        |
//! | Scanning         | illumination on, then off | light reading matches band |
//! | Complete         | stage 2 on, then reset    | terminal                   |
//!
//! Every wait goes through the context's `DelayNs`, so on an embassy
//! executor other tasks keep running while the sequencer polls. Every loop
//! is bounded (except saturation, which is optional) and checks the abort
//! flag before each poll. Holds, the cool-down included, check it once per
//! time unit.

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use heapless::Vec;
use log::{debug, error, info, warn};

use crate::actuators::{
    ActuatorController, ActuatorState, STAGE_COMPLETE, STAGE_SATURATING, STAGE_SPRAYING,
};
use crate::app_state::{ExperimentError, ExperimentPhase, SharedStatus, StatusSnapshot};
use crate::classifier::{ColourBand, ColourClassifier};
use crate::config::{ExperimentConfig, SaturationTrigger};
use crate::detector::{TemperatureChangeDetector, TemperatureThreshold};
use crate::sensors::RigSensors;

/// Maximum number of phases a single run can pass through.
pub const MAX_TRACE: usize = 8;

/// Hardware the sequencer owns for the duration of a run.
pub struct ExperimentContext<S, P, D> {
    pub sensors: S,
    pub actuators: ActuatorController<P>,
    pub delay: D,
}

impl<S, P, D> ExperimentContext<S, P, D>
where
    S: RigSensors,
    P: OutputPin,
    D: DelayNs,
{
    pub fn new(sensors: S, actuators: ActuatorController<P>, delay: D) -> Self {
        Self {
            sensors,
            actuators,
            delay,
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentOutcome {
    pub colour: ColourBand,
    pub position_polls: u32,
    pub temperature_polls: u32,
    pub light_polls: u32,
    pub phases: Vec<ExperimentPhase, MAX_TRACE>,
}

#[derive(Debug, Default, Clone, Copy)]
struct PollCounters {
    position: u32,
    temperature: u32,
    light: u32,
}

pub struct ExperimentSequencer<'a, S, P, D> {
    context: ExperimentContext<S, P, D>,
    config: ExperimentConfig,
    status: &'a SharedStatus,
    detector: TemperatureChangeDetector,
    classifier: ColourClassifier,
    snapshot: StatusSnapshot,
    trace: Vec<ExperimentPhase, MAX_TRACE>,
    polls: PollCounters,
    started: bool,
}

impl<'a, S, P, D> ExperimentSequencer<'a, S, P, D>
where
    S: RigSensors,
    P: OutputPin,
    D: DelayNs,
{
    pub fn new(
        context: ExperimentContext<S, P, D>,
        config: ExperimentConfig,
        status: &'a SharedStatus,
    ) -> Self {
        Self {
            detector: TemperatureChangeDetector::new(
                config.saturation.delta_threshold,
                config.time_unit_ms,
            ),
            classifier: ColourClassifier::new(config.scan.engage_threshold),
            context,
            config,
            status,
            snapshot: StatusSnapshot::INITIAL,
            trace: Vec::new(),
            polls: PollCounters::default(),
            started: false,
        }
    }

    pub fn phase(&self) -> ExperimentPhase {
        self.snapshot.phase
    }

    pub fn actuator_state(&self) -> ActuatorState {
        self.context.actuators.state()
    }

    /// Phases entered so far, in order.
    pub fn trace(&self) -> &[ExperimentPhase] {
        &self.trace
    }

    pub fn context(&self) -> &ExperimentContext<S, P, D> {
        &self.context
    }

    /// Hand the hardware back once the run is over.
    pub fn into_context(self) -> ExperimentContext<S, P, D> {
        self.context
    }

    /// Run the experiment once.
    ///
    /// Failures are logged, all actuators are switched off, and the shared
    /// status moves to `Aborted` or `Faulted` before the error is returned.
    /// A sequencer can only run once; later calls return `AlreadyRun`.
    pub async fn run(&mut self) -> Result<ExperimentOutcome, ExperimentError> {
        if self.started {
            return Err(ExperimentError::AlreadyRun);
        }
        self.started = true;

        match self.sequence().await {
            Ok(colour) => {
                info!("Experiment complete: {}", colour);
                Ok(ExperimentOutcome {
                    colour,
                    position_polls: self.polls.position,
                    temperature_polls: self.polls.temperature,
                    light_polls: self.polls.light,
                    phases: self.trace.clone(),
                })
            }
            Err(err) => {
                self.fail(err);
                Err(err)
            }
        }
    }

    async fn sequence(&mut self) -> Result<ColourBand, ExperimentError> {
        self.enter(ExperimentPhase::AwaitingPosition);
        self.context.actuators.reset_all();
        self.publish();
        self.await_position().await?;
        self.checkpoint()?;

        self.enter(ExperimentPhase::Saturating);
        self.context.actuators.set_stage(STAGE_SATURATING, true);
        self.publish();
        self.await_saturation().await?;
        self.checkpoint()?;

        self.enter(ExperimentPhase::Spraying);
        self.context.actuators.set_stage(STAGE_SPRAYING, true);
        self.publish();
        self.hold(self.config.spray_settle_units).await?;
        self.checkpoint()?;

        self.enter(ExperimentPhase::Scanning);
        self.context.actuators.set_illumination(true);
        self.publish();
        let colour = self.scan().await?;
        info!("Light intensity/colour: {}", colour);
        self.snapshot.colour = Some(colour);
        self.publish();
        self.hold(self.config.scan_hold_units).await?;
        self.context.actuators.set_illumination(false);
        self.publish();
        self.checkpoint()?;

        self.enter(ExperimentPhase::Complete);
        self.context.actuators.set_stage(STAGE_COMPLETE, true);
        self.publish();
        self.hold(self.config.cooldown_units).await?;
        self.context.actuators.reset_all();
        self.publish();

        Ok(colour)
    }

    async fn await_position(&mut self) -> Result<(), ExperimentError> {
        let policy = self.config.position.poll;
        let threshold = self.config.position.ir_threshold;

        info!("Checking paper position...");
        self.context.sensors.enable_ir_emitter()?;

        for attempt in 1..=policy.max_attempts {
            self.checkpoint()?;
            let ir = self.context.sensors.read_ir()?;
            self.polls.position = self.polls.position.saturating_add(1);
            if ir >= threshold {
                info!("Paper in position (IR {})", ir);
                return Ok(());
            }
            debug!("IR {} below {} (attempt {})", ir, threshold, attempt);
            if attempt < policy.max_attempts {
                self.context.delay.delay_ms(policy.interval_ms).await;
            }
        }

        Err(ExperimentError::PositionTimeout {
            attempts: policy.max_attempts,
        })
    }

    async fn await_saturation(&mut self) -> Result<(), ExperimentError> {
        let saturation = self.config.saturation;
        info!("Monitoring temperature...");

        loop {
            self.checkpoint()?;
            let reached = match saturation.trigger {
                SaturationTrigger::TemperatureSwing => {
                    self.detector
                        .detect_change(&mut self.context.sensors, &mut self.context.delay)
                        .await?
                }
                SaturationTrigger::AbsoluteTemperature { threshold_c } => {
                    let trigger = TemperatureThreshold::new(self.config.thermistor, threshold_c);
                    let raw = self.context.sensors.read_thermistor()?;
                    let reached = trigger.reached(raw);
                    if !reached {
                        self.context
                            .delay
                            .delay_ms(self.config.time_unit_ms)
                            .await;
                    }
                    reached
                }
            };
            self.polls.temperature = self.polls.temperature.saturating_add(1);

            if reached {
                info!("Temperature transition detected");
                return Ok(());
            }
            if let Some(max) = saturation.max_polls {
                if self.polls.temperature >= max {
                    return Err(ExperimentError::SaturationTimeout {
                        polls: self.polls.temperature,
                    });
                }
            }
        }
    }

    async fn scan(&mut self) -> Result<ColourBand, ExperimentError> {
        let policy = self.config.scan.poll;
        info!("Collecting data");
        self.classifier.reset();

        for attempt in 1..=policy.max_attempts {
            self.checkpoint()?;
            let light = self.context.sensors.read_light()?;
            self.polls.light = self.polls.light.saturating_add(1);
            if let Some(colour) = self.classifier.classify(light) {
                return Ok(colour);
            }
            if attempt < policy.max_attempts {
                self.context.delay.delay_ms(policy.interval_ms).await;
            }
        }

        Err(ExperimentError::ClassificationTimeout {
            attempts: policy.max_attempts,
        })
    }

    /// Wait `units` time units, one unit at a time, checking for abort
    /// between units.
    async fn hold(&mut self, units: u32) -> Result<(), ExperimentError> {
        for _ in 0..units {
            self.checkpoint()?;
            self.context.delay.delay_ms(self.config.time_unit_ms).await;
        }
        Ok(())
    }

    fn checkpoint(&self) -> Result<(), ExperimentError> {
        if self.status.abort_requested() {
            return Err(ExperimentError::Aborted {
                phase: self.snapshot.phase,
            });
        }
        Ok(())
    }

    fn enter(&mut self, phase: ExperimentPhase) {
        info!("Phase: {}", phase);
        self.snapshot.phase = phase;
        if self.trace.push(phase).is_err() {
            warn!("Phase trace full, dropping {}", phase);
        }
    }

    /// Copy actuator state into the snapshot and publish it.
    fn publish(&mut self) {
        let actuators = self.context.actuators.state();
        self.snapshot.illumination_on = actuators.illumination;
        if actuators.illumination && self.snapshot.phase == ExperimentPhase::Scanning {
            self.snapshot.illumination_engaged = true;
        }
        self.status.publish(self.snapshot);
    }

    fn fail(&mut self, err: ExperimentError) {
        self.context.actuators.force_all_off();
        match err {
            ExperimentError::Aborted { phase } => {
                warn!("Experiment aborted during {}", phase);
                self.enter(ExperimentPhase::Aborted);
            }
            _ => {
                error!("Experiment failed in {}: {}", self.snapshot.phase, err);
                self.snapshot.fault = err.kind();
                self.enter(ExperimentPhase::Faulted);
            }
        }
        self.publish();
    }
}
