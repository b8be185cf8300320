// stance_core/src/estimation/mod.rs

use dyn_clone::DynClone;
use std::fmt::Debug;

use crate::error::EstimationError;
use crate::kinematics::KinematicTree;
use crate::state::GlobalState;

pub mod engine;
pub mod measurement_model;
pub mod process_model;

pub use engine::{EngineParameters, EstimationEngine, TickReport};
pub use measurement_model::{MeasurementModel, StackedMeasurement};
pub use process_model::{LinearizedProcess, ProcessModel};

// --- POST-STATE-CHANGE HOOK ---
// Runs synchronously after every predict and every correct, so that the
// kinematic tree reflects the state before any measurement is evaluated again.
pub trait PostStateChange: DynClone + Debug + Send + Sync {
    fn on_state_change(&mut self, state: &GlobalState, tree: &mut dyn KinematicTree) -> Result<(), EstimationError>;
}

// This macro automatically generates the implementation of `Clone` for `Box<dyn PostStateChange>`.
dyn_clone::clone_trait_object!(PostStateChange);
