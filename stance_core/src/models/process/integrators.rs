// stance_core/src/models/process/integrators.rs

//! Driven integrator chains for the angular and center of mass kinematics.
//!
//! The acceleration levels are discrete pass-throughs of the desired input;
//! the velocity levels integrate that same input; positions integrate
//! velocity. Each level carries its own process noise.

use nalgebra::Matrix3;

use super::{ElementLinearization, ProcessInput, ProcessModelElement, TimeDomain};
use crate::config::NoiseCovariance;
use crate::messages::ProcessInputs;
use crate::state::GlobalState;
use crate::types::BlockId;

// --- Angular ---

/// `omega_dot = u_alpha + w`.
#[derive(Debug, Clone, PartialEq)]
pub struct AngularVelocityElement {
    pub block: BlockId,
    pub noise: NoiseCovariance,
}

impl AngularVelocityElement {
    pub fn new(block: BlockId, noise: NoiseCovariance) -> Self {
        Self { block, noise }
    }
}

impl ProcessModelElement for AngularVelocityElement {
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
            input: vec![(ProcessInput::DesiredAngularAcceleration, Matrix3::identity())],
            noise: Some(*self.noise.matrix()),
        }
    }

    fn propagate(&self, prior: &GlobalState, inputs: &ProcessInputs, dt: f64, posterior: &mut GlobalState) {
        let omega = prior.vector3(self.block) + inputs.desired_angular_acceleration * dt;
        posterior.set_vector3(self.block, &omega);
    }
}

/// `alpha_k = u_alpha + w_k`.
#[derive(Debug, Clone, PartialEq)]
pub struct AngularAccelerationElement {
    pub block: BlockId,
    pub noise: NoiseCovariance,
}

impl AngularAccelerationElement {
    pub fn new(block: BlockId, noise: NoiseCovariance) -> Self {
        Self { block, noise }
    }
}

impl ProcessModelElement for AngularAccelerationElement {
    fn block(&self) -> BlockId {
        self.block
    }

    fn time_domain(&self) -> TimeDomain {
        TimeDomain::Discrete
    }

    fn dependencies(&self) -> Vec<BlockId> {
        Vec::new()
    }

    fn linearize(&self, _state: &GlobalState) -> ElementLinearization {
        ElementLinearization {
            state: Vec::new(),
            input: vec![(ProcessInput::DesiredAngularAcceleration, Matrix3::identity())],
            noise: Some(*self.noise.matrix()),
        }
    }

    fn propagate(&self, _prior: &GlobalState, inputs: &ProcessInputs, _dt: f64, posterior: &mut GlobalState) {
        posterior.set_vector3(self.block, &inputs.desired_angular_acceleration);
    }
}

// --- Center of mass ---

/// `p_dot = v`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComPositionElement {
    pub block: BlockId,
    pub velocity: BlockId,
}

impl ComPositionElement {
    pub fn new(block: BlockId, velocity: BlockId) -> Self {
        Self { block, velocity }
    }
}

impl ProcessModelElement for ComPositionElement {
    fn block(&self) -> BlockId {
        self.block
    }

    fn time_domain(&self) -> TimeDomain {
        TimeDomain::Continuous
    }

    fn dependencies(&self) -> Vec<BlockId> {
        vec![self.velocity]
    }

    fn linearize(&self, _state: &GlobalState) -> ElementLinearization {
        ElementLinearization {
            state: vec![(self.velocity, Matrix3::identity())],
            input: Vec::new(),
            noise: None,
        }
    }

    fn propagate(&self, prior: &GlobalState, _inputs: &ProcessInputs, dt: f64, posterior: &mut GlobalState) {
        let position = prior.vector3(self.block) + prior.vector3(self.velocity) * dt;
        posterior.set_vector3(self.block, &position);
    }
}

/// `v_dot = u_a + w`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComVelocityElement {
    pub block: BlockId,
    pub noise: NoiseCovariance,
}

impl ComVelocityElement {
    pub fn new(block: BlockId, noise: NoiseCovariance) -> Self {
        Self { block, noise }
    }
}

impl ProcessModelElement for ComVelocityElement {
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
            input: vec![(ProcessInput::DesiredCenterOfMassAcceleration, Matrix3::identity())],
            noise: Some(*self.noise.matrix()),
        }
    }

    fn propagate(&self, prior: &GlobalState, inputs: &ProcessInputs, dt: f64, posterior: &mut GlobalState) {
        let velocity = prior.vector3(self.block) + inputs.desired_com_acceleration * dt;
        posterior.set_vector3(self.block, &velocity);
    }
}

/// `a_k = u_a + w_k`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComAccelerationElement {
    pub block: BlockId,
    pub noise: NoiseCovariance,
}

impl ComAccelerationElement {
    pub fn new(block: BlockId, noise: NoiseCovariance) -> Self {
        Self { block, noise }
    }
}

impl ProcessModelElement for ComAccelerationElement {
    fn block(&self) -> BlockId {
        self.block
    }

    fn time_domain(&self) -> TimeDomain {
        TimeDomain::Discrete
    }

    fn dependencies(&self) -> Vec<BlockId> {
        Vec::new()
    }

    fn linearize(&self, _state: &GlobalState) -> ElementLinearization {
        ElementLinearization {
            state: Vec::new(),
            input: vec![(ProcessInput::DesiredCenterOfMassAcceleration, Matrix3::identity())],
            noise: Some(*self.noise.matrix()),
        }
    }

    fn propagate(&self, _prior: &GlobalState, inputs: &ProcessInputs, _dt: f64, posterior: &mut GlobalState) {
        posterior.set_vector3(self.block, &inputs.desired_com_acceleration);
    }
}
