// stance_sim/src/main.rs

use std::process::ExitCode;

use clap::Parser;
use stance_sim::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // A good filter for focusing on our crates' logs during development.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stance_core=debug,stance_sim=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Loading scenario from: {}", cli.scenario.display());
    let mut config = match ScenarioConfig::load(&cli.scenario) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(duration) = cli.duration {
        config.simulation.duration_seconds = duration;
    }
    if let Some(seed) = cli.seed {
        config.simulation.seed = Some(seed);
    }

    if cli.print_config {
        return match toml::to_string_pretty(&config) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("failed to render scenario: {e}");
                ExitCode::FAILURE
            }
        };
    }

    match evaluate(&config) {
        Ok(report) => {
            report.log();
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("evaluation aborted: {e}");
            ExitCode::FAILURE
        }
    }
}
