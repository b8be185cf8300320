// stance_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::estimation::PostStateChange;
pub use crate::kinematics::KinematicTree;
pub use crate::models::measurement::MeasurementModelElement;
pub use crate::models::process::ProcessModelElement;

// --- Core Data Structures ---
pub use crate::messages::{JointReading, ProcessInputs, SensorReadings, SensorSample};
pub use crate::state::{BlockKind, GlobalState, StateLayout};
pub use crate::types::{BlockId, BodyId, JointId, JointState, SensorId};

// --- Estimation ---
pub use crate::estimation::{EstimationEngine, MeasurementModel, ProcessModel, TickReport};
pub use crate::estimator::{EstimatorBuilder, EstimatorTelemetry, OrientationAndComEstimator, OrientationEstimator};

// --- Configuration and Errors ---
pub use crate::config::{EstimatorParameters, NoiseCovariance, NoiseSpec, Pose, SensorConfiguration};
pub use crate::error::{ConfigError, EstimationError, KinematicsError};

// --- Concrete Implementations ---
pub use crate::kinematics::{JointKind, RigidBodyTree};
