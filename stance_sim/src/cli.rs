// stance_sim/src/cli.rs

use clap::Parser;
use std::path::PathBuf;

/// Stance: headless evaluation of the floating-base state estimator.
///
/// Generates ground-truth biped motion, synthesizes noisy sensors, runs the
/// estimator every control tick and reports RMS estimation errors.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(short, long, default_value = "assets/scenarios/default.toml")]
    pub scenario: PathBuf,

    /// Overrides the scenario duration, in seconds.
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Overrides the noise seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print the resolved scenario as TOML and exit.
    #[arg(long, default_value_t = false)]
    pub print_config: bool,
}
