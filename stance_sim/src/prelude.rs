// stance_sim/src/prelude.rs

// Re-export the entire stance_core prelude so you can easily access
// estimator types like `OrientationAndComEstimator`, `SensorSample`, etc.
pub use stance_core::prelude::*;

// Re-export common simulation-specific types.
pub use crate::cli::Cli;
pub use crate::simulation::config::{ScenarioConfig, SensorNoiseConfig, SimulationSection, TrajectoryConfig};
pub use crate::simulation::evaluator::{evaluate, EvaluationReport};
pub use crate::simulation::robot::DemoBiped;
pub use crate::simulation::trajectory::{GroundTruth, Trajectory};
pub use crate::simulation::SimulationError;
