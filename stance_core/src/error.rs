// stance_core/src/error.rs

use thiserror::Error;

use crate::types::{BodyId, JointId};

/// Failures detected while assembling an estimator. None of these can be
/// recovered at runtime; the estimator must not start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("noise covariance for '{name}' is not symmetric positive definite")]
    NoiseNotPositiveDefinite { name: String },

    #[error("exactly one orientation sensor is required, found {0}")]
    OrientationSourceCount(usize),

    #[error("state block '{0}' is registered twice")]
    DuplicateBlock(String),

    #[error("no state blocks are registered")]
    EmptyState,

    #[error("state block '{0}' has no process model element")]
    UnmodelledBlock(String),

    #[error("element '{element}' depends on unregistered state block '{block}'")]
    MissingBlock { element: String, block: String },

    #[error("element '{element}' depends on block '{block}' from the other time domain")]
    CrossDomainCoupling { element: String, block: String },

    #[error("block '{0}' is owned by more than one process element")]
    DuplicateProcessElement(String),

    #[error("gravity must be finite and non-negative, got {0}")]
    InvalidGravity(f64),

    #[error("unknown body '{0}'")]
    UnknownBody(String),

    #[error("sensor '{sensor}' of kind {kind} needs center-of-mass blocks this estimator does not have")]
    UnsupportedSensor { sensor: String, kind: &'static str },

    #[error("sensor name '{0}' is used more than once")]
    DuplicateSensor(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("covariance initialization failed: {0}")]
    Initialization(#[from] EstimationError),
}

/// Faults raised while running a tick. A fatal fault leaves the estimator in a
/// faulted state until the caller restores a state explicitly.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EstimationError {
    #[error("innovation covariance of dimension {rows} is not invertible")]
    SingularInnovation { rows: usize },

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("sensor '{sensor}' received a sample of the wrong kind, expected {expected}")]
    SampleMismatch {
        sensor: String,
        expected: &'static str,
    },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("covariance is not symmetric")]
    AsymmetricCovariance,

    #[error("covariance is not positive semi-definite")]
    IndefiniteCovariance,

    #[error("estimator is faulted; restore a state before ticking again")]
    Faulted,

    #[error(transparent)]
    Kinematics(#[from] KinematicsError),
}

/// Failures of the kinematic tree collaborator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KinematicsError {
    #[error("unknown {0}")]
    UnknownBody(BodyId),

    #[error("unknown {0}")]
    UnknownJoint(JointId),

    #[error("{0} is fixed and has no state")]
    FixedJoint(JointId),

    #[error("non-finite state for {0}")]
    NonFiniteJointState(JointId),

    #[error("parent {parent} must be added before its children")]
    InvalidParent { parent: BodyId },
}
