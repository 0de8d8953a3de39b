//! Desktop simulator for the chroma-rs experiment sequencer.
//!
//! Runs the real `chroma-core` sequencer on a worker thread against a
//! simulated rig, while the main thread plays the status page: it prints the
//! JSON status report whenever it changes and can trigger an emergency stop.
//!
//! ```text
//! RUST_LOG=debug chroma-simulator --colour yellow --time-unit-ms 50
//! chroma-simulator --stall-position          # paper never arrives
//! chroma-simulator --abort-after-ms 800      # emergency stop mid-run
//! chroma-simulator --config rig.json         # JSON ExperimentConfig
//! ```

mod rig;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use log::{error, info, warn};

use chroma_core::{
    ColourBand, ExperimentConfig, ExperimentError, ExperimentOutcome, SharedStatus, StatusReport,
};

use rig::SimulatedRig;

/// Time unit used when neither the CLI nor a config file sets one.
const DEFAULT_TIME_UNIT_MS: u32 = 100;

/// Shared with the sequencer thread, as a firmware image would keep it.
static STATUS: SharedStatus = SharedStatus::new();

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Colour {
    Blue,
    RedPink,
    Pink,
    Yellow,
    White,
}

impl From<Colour> for ColourBand {
    fn from(value: Colour) -> Self {
        match value {
            Colour::Blue => ColourBand::Blue,
            Colour::RedPink => ColourBand::RedPink,
            Colour::Pink => ColourBand::Pink,
            Colour::Yellow => ColourBand::Yellow,
            Colour::White => ColourBand::White,
        }
    }
}

#[derive(Debug, Parser)]
#[command(about = "Run the chromatography experiment sequencer against a simulated rig")]
struct Args {
    /// Colour band the simulated plate develops
    #[arg(long, value_enum, default_value = "blue")]
    colour: Colour,

    /// Base time unit in milliseconds (overrides the config file)
    #[arg(long)]
    time_unit_ms: Option<u32>,

    /// Never move the paper into position
    #[arg(long)]
    stall_position: bool,

    /// Request an emergency stop after this many milliseconds
    #[arg(long)]
    abort_after_ms: Option<u64>,

    /// How often the status page polls, in milliseconds
    #[arg(long, default_value_t = 50)]
    report_interval_ms: u64,

    /// JSON file holding an ExperimentConfig
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(path: &Path) -> Result<ExperimentConfig, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("cannot parse {}: {}", path.display(), e))
}

fn build_config(args: &Args) -> Result<ExperimentConfig, String> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ExperimentConfig {
            time_unit_ms: DEFAULT_TIME_UNIT_MS,
            ..ExperimentConfig::default()
        },
    };
    if let Some(ms) = args.time_unit_ms {
        config.time_unit_ms = ms;
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn render(report: &StatusReport) -> String {
    serde_json::to_string(report).unwrap_or_else(|e| format!("<unrenderable status: {e}>"))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let colour = ColourBand::from(args.colour);
    let stall_position = args.stall_position;
    info!(
        "Simulating a {} plate, time unit {} ms",
        colour, config.time_unit_ms
    );

    let worker = thread::spawn(move || -> Result<ExperimentOutcome, ExperimentError> {
        let rig = SimulatedRig::new(colour, stall_position);
        let mut sequencer = rig.sequencer(config, &STATUS);
        embassy_futures::block_on(sequencer.run())
    });

    let started = Instant::now();
    let interval = Duration::from_millis(args.report_interval_ms.max(1));
    let mut last_report = None;

    while !worker.is_finished() {
        if let Some(after) = args.abort_after_ms {
            if !STATUS.abort_requested() && started.elapsed() >= Duration::from_millis(after) {
                warn!("Pressing emergency stop");
                STATUS.abort();
            }
        }

        let report = STATUS.report();
        if last_report != Some(report) {
            println!("{}", render(&report));
            last_report = Some(report);
        }
        thread::sleep(interval);
    }

    let result = match worker.join() {
        Ok(result) => result,
        Err(_) => {
            error!("Sequencer thread panicked");
            return ExitCode::FAILURE;
        }
    };
    println!("{}", render(&STATUS.report()));

    match result {
        Ok(outcome) => {
            info!(
                "Result {} after {} IR, {} temperature and {} light polls",
                outcome.colour, outcome.position_polls, outcome.temperature_polls, outcome.light_polls
            );
            ExitCode::SUCCESS
        }
        Err(ExperimentError::Aborted { phase }) => {
            warn!("Run aborted during {}", phase);
            ExitCode::from(2)
        }
        Err(e) => {
            error!("Run failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
