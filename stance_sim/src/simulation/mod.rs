// stance_sim/src/simulation/mod.rs

//! Headless evaluation of the estimator against analytic ground truth.

pub mod config;
pub mod evaluator;
pub mod prng;
pub mod robot;
pub mod sensors;
pub mod trajectory;

use stance_core::error::{ConfigError, EstimationError, KinematicsError};
use thiserror::Error;

pub use config::ScenarioConfig;
pub use evaluator::{evaluate, EvaluationReport};

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("failed to load scenario: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("estimator configuration rejected: {0}")]
    Estimator(#[from] ConfigError),

    #[error("estimator faulted: {0}")]
    Estimation(#[from] EstimationError),

    #[error("ground-truth kinematics failed: {0}")]
    Kinematics(#[from] KinematicsError),
}
