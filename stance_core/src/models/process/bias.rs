// stance_core/src/models/process/bias.rs

use super::{ElementLinearization, ProcessModelElement, TimeDomain};
use crate::config::NoiseCovariance;
use crate::messages::ProcessInputs;
use crate::state::GlobalState;
use crate::types::BlockId;

/// A random-walk sensor offset: `b_dot = w`.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorBiasElement {
    pub block: BlockId,
    pub noise: NoiseCovariance,
}

impl SensorBiasElement {
    pub fn new(block: BlockId, noise: NoiseCovariance) -> Self {
        Self { block, noise }
    }
}

impl ProcessModelElement for SensorBiasElement {
    fn block(&self) -> BlockId {
        self.block
    }

    fn time_domain(&self) -> TimeDomain {
        TimeDomain::Continuous
    }

    fn dependencies(&self) -> Vec<BlockId> {
        Vec::new()
    }

    fn linearize(&self, _state: &GlobalState) -> ElementLinearization {
        ElementLinearization {
            state: Vec::new(),
            input: Vec::new(),
            noise: Some(*self.noise.matrix()),
        }
    }

    fn propagate(&self, prior: &GlobalState, _inputs: &ProcessInputs, _dt: f64, posterior: &mut GlobalState) {
        posterior.set_vector3(self.block, &prior.vector3(self.block));
    }
}
