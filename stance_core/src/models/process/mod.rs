// stance_core/src/models/process/mod.rs

use nalgebra::{Matrix3, Vector3};

use crate::messages::ProcessInputs;
use crate::state::GlobalState;
use crate::types::BlockId;

pub mod bias;
pub mod integrators;
pub mod orientation;

pub use bias::SensorBiasElement;
pub use integrators::{
    AngularAccelerationElement, AngularVelocityElement, ComAccelerationElement, ComPositionElement,
    ComVelocityElement,
};
pub use orientation::OrientationElement;

/// Whether an element's rows describe `x_dot = F x + G u + w` or
/// `x_k+1 = A x_k + B u_k + w_k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeDomain {
    Continuous,
    Discrete,
}

/// The inputs a process element may be driven by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessInput {
    DesiredAngularAcceleration,
    DesiredCenterOfMassAcceleration,
}

impl ProcessInput {
    pub const ALL: [ProcessInput; 2] = [
        ProcessInput::DesiredAngularAcceleration,
        ProcessInput::DesiredCenterOfMassAcceleration,
    ];

    /// Offset of this input in the stacked input vector `u`.
    pub fn offset(self) -> usize {
        match self {
            ProcessInput::DesiredAngularAcceleration => 0,
            ProcessInput::DesiredCenterOfMassAcceleration => 3,
        }
    }

    pub fn value(self, inputs: &ProcessInputs) -> Vector3<f64> {
        match self {
            ProcessInput::DesiredAngularAcceleration => inputs.desired_angular_acceleration,
            ProcessInput::DesiredCenterOfMassAcceleration => inputs.desired_com_acceleration,
        }
    }
}

/// Dimension of the stacked input vector.
pub const INPUT_DIM: usize = 6;

/// The rows one element contributes to the system matrices, in its own time
/// domain. Blocks it does not mention are zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementLinearization {
    pub state: Vec<(BlockId, Matrix3<f64>)>,
    pub input: Vec<(ProcessInput, Matrix3<f64>)>,
    pub noise: Option<Matrix3<f64>>,
}

// --- PROCESS MODEL ELEMENT TRAIT ---
// Owns one block of the global state and describes how it evolves.
pub trait ProcessModelElement {
    /// The block this element owns.
    fn block(&self) -> BlockId;

    fn time_domain(&self) -> TimeDomain;

    /// Every block appearing in this element's state rows.
    fn dependencies(&self) -> Vec<BlockId>;

    /// Rows of F/G/Q_c (continuous) or A/B/Q_d (discrete) at `state`.
    fn linearize(&self, state: &GlobalState) -> ElementLinearization;

    /// Writes the propagated value of `self.block()` into `posterior`,
    /// reading only from `prior`.
    fn propagate(&self, prior: &GlobalState, inputs: &ProcessInputs, dt: f64, posterior: &mut GlobalState);

    /// Applies this block's slice of a correction.
    fn correct(&self, delta: &Vector3<f64>, state: &mut GlobalState) {
        state.perturb(self.block(), delta);
    }
}

/// The closed set of process elements.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessElement {
    Orientation(OrientationElement),
    AngularVelocity(AngularVelocityElement),
    AngularAcceleration(AngularAccelerationElement),
    ComPosition(ComPositionElement),
    ComVelocity(ComVelocityElement),
    ComAcceleration(ComAccelerationElement),
    SensorBias(SensorBiasElement),
}

impl ProcessElement {
    fn inner(&self) -> &dyn ProcessModelElement {
        match self {
            ProcessElement::Orientation(e) => e,
            ProcessElement::AngularVelocity(e) => e,
            ProcessElement::AngularAcceleration(e) => e,
            ProcessElement::ComPosition(e) => e,
            ProcessElement::ComVelocity(e) => e,
            ProcessElement::ComAcceleration(e) => e,
            ProcessElement::SensorBias(e) => e,
        }
    }
}

impl ProcessModelElement for ProcessElement {
    fn block(&self) -> BlockId {
        self.inner().block()
    }

    fn time_domain(&self) -> TimeDomain {
        self.inner().time_domain()
    }

    fn dependencies(&self) -> Vec<BlockId> {
        self.inner().dependencies()
    }

    fn linearize(&self, state: &GlobalState) -> ElementLinearization {
        self.inner().linearize(state)
    }

    fn propagate(&self, prior: &GlobalState, inputs: &ProcessInputs, dt: f64, posterior: &mut GlobalState) {
        self.inner().propagate(prior, inputs, dt, posterior)
    }

    fn correct(&self, delta: &Vector3<f64>, state: &mut GlobalState) {
        self.inner().correct(delta, state)
    }
}

macro_rules! impl_from_element {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(impl From<$ty> for ProcessElement {
            fn from(element: $ty) -> Self {
                ProcessElement::$variant(element)
            }
        })*
    };
}

impl_from_element!(
    Orientation => OrientationElement,
    AngularVelocity => AngularVelocityElement,
    AngularAcceleration => AngularAccelerationElement,
    ComPosition => ComPositionElement,
    ComVelocity => ComVelocityElement,
    ComAcceleration => ComAccelerationElement,
    SensorBias => SensorBiasElement,
);
