// stance_core/src/types.rs

use nalgebra::{DVector, Vector3};
use std::fmt;

/// The flat state vector `x` of the filter.
pub type State = DVector<f64>;

// --- Identifiers ---
// Plain indices. Bodies and joints index into the kinematic tree, sensors and
// blocks into the estimator's insertion-ordered registries.

/// Identifies a rigid body of the kinematic tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub usize);

/// Identifies a one-DOF joint of the kinematic tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointId(pub usize);

/// Identifies a configured sensor, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorId(pub usize);

/// Identifies a state block inside a `StateLayout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body#{}", self.0)
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "joint#{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block#{}", self.0)
    }
}

// =========================================================================
// == Motion Value Types ==
// =========================================================================

/// Angular and linear velocity of one body relative to another.
///
/// `linear` is the velocity of the body's origin. Both parts are expressed in
/// whichever frame the producing query documents.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Twist {
    pub angular: Vector3<f64>,
    pub linear: Vector3<f64>,
}

impl Twist {
    pub fn new(angular: Vector3<f64>, linear: Vector3<f64>) -> Self {
        Self { angular, linear }
    }
}

/// Angular acceleration plus the classical (not spatial) acceleration of the
/// body's origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpatialAcceleration {
    pub angular: Vector3<f64>,
    pub linear: Vector3<f64>,
}

impl SpatialAcceleration {
    pub fn new(angular: Vector3<f64>, linear: Vector3<f64>) -> Self {
        Self { angular, linear }
    }
}

/// Position, velocity and acceleration of a point, all in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointMotion {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub acceleration: Vector3<f64>,
}

impl std::ops::Sub for PointMotion {
    type Output = PointMotion;

    fn sub(self, rhs: PointMotion) -> PointMotion {
        PointMotion {
            position: self.position - rhs.position,
            velocity: self.velocity - rhs.velocity,
            acceleration: self.acceleration - rhs.acceleration,
        }
    }
}

/// Position, velocity and acceleration of a one-DOF joint.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointState {
    pub position: f64,
    pub velocity: f64,
    pub acceleration: f64,
}

impl JointState {
    pub fn new(position: f64, velocity: f64, acceleration: f64) -> Self {
        Self {
            position,
            velocity,
            acceleration,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.velocity.is_finite() && self.acceleration.is_finite()
    }
}
