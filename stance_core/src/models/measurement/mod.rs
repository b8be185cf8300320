// stance_core/src/models/measurement/mod.rs

use nalgebra::{Isometry3, Matrix3, UnitQuaternion, Vector3};

use crate::error::EstimationError;
use crate::kinematics::KinematicTree;
use crate::messages::SensorSample;
use crate::state::GlobalState;
use crate::types::{BlockId, BodyId, PointMotion};

pub mod angular_velocity;
pub mod linear_acceleration;
pub mod orientation;
pub mod point;

pub use angular_velocity::AngularVelocitySensorElement;
pub use linear_acceleration::LinearAccelerationSensorElement;
pub use orientation::OrientationSensorElement;
pub use point::{PointPositionSensorElement, PointVelocitySensorElement};

/// Read access to everything a measurement element may consult.
#[derive(Clone, Copy)]
pub struct MeasurementContext<'a> {
    pub state: &'a GlobalState,
    pub tree: &'a dyn KinematicTree,
    /// The body whose frame the orientation and angular velocity blocks describe.
    pub estimation_body: BodyId,
}

/// A predicted sensor output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PredictedMeasurement {
    Rotation(UnitQuaternion<f64>),
    Vector(Vector3<f64>),
}

// --- MEASUREMENT MODEL TRAIT ---
// Represents the mathematical model of a sensor, `z = h(x) + v`, linearized
// with the local tangent-space orientation error.
pub trait MeasurementModelElement {
    fn name(&self) -> &str;

    /// Every state block this element's Jacobian may touch.
    fn dependencies(&self) -> Vec<BlockId>;

    /// The ideal measurement `h(x)` for the current state and tree.
    fn predict(&self, ctx: &MeasurementContext, sample: &SensorSample) -> Result<PredictedMeasurement, EstimationError>;

    /// `z - h(x)`, taken on the tangent space for rotations.
    fn residual(&self, ctx: &MeasurementContext, sample: &SensorSample) -> Result<Vector3<f64>, EstimationError>;

    /// `dh/dx`, one 3x3 block per dependency.
    fn jacobian_blocks(
        &self,
        ctx: &MeasurementContext,
        sample: &SensorSample,
    ) -> Result<Vec<(BlockId, Matrix3<f64>)>, EstimationError>;

    /// The measurement noise covariance `R`.
    fn noise_covariance(&self) -> &Matrix3<f64>;
}

/// The closed set of measurement elements.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementElement {
    Orientation(OrientationSensorElement),
    AngularVelocity(AngularVelocitySensorElement),
    LinearAcceleration(LinearAccelerationSensorElement),
    PointVelocity(PointVelocitySensorElement),
    PointPosition(PointPositionSensorElement),
}

impl MeasurementElement {
    fn inner(&self) -> &dyn MeasurementModelElement {
        match self {
            MeasurementElement::Orientation(e) => e,
            MeasurementElement::AngularVelocity(e) => e,
            MeasurementElement::LinearAcceleration(e) => e,
            MeasurementElement::PointVelocity(e) => e,
            MeasurementElement::PointPosition(e) => e,
        }
    }
}

impl MeasurementModelElement for MeasurementElement {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn dependencies(&self) -> Vec<BlockId> {
        self.inner().dependencies()
    }

    fn predict(&self, ctx: &MeasurementContext, sample: &SensorSample) -> Result<PredictedMeasurement, EstimationError> {
        self.inner().predict(ctx, sample)
    }

    fn residual(&self, ctx: &MeasurementContext, sample: &SensorSample) -> Result<Vector3<f64>, EstimationError> {
        self.inner().residual(ctx, sample)
    }

    fn jacobian_blocks(
        &self,
        ctx: &MeasurementContext,
        sample: &SensorSample,
    ) -> Result<Vec<(BlockId, Matrix3<f64>)>, EstimationError> {
        self.inner().jacobian_blocks(ctx, sample)
    }

    fn noise_covariance(&self) -> &Matrix3<f64> {
        self.inner().noise_covariance()
    }
}

impl From<OrientationSensorElement> for MeasurementElement {
    fn from(element: OrientationSensorElement) -> Self {
        MeasurementElement::Orientation(element)
    }
}

impl From<AngularVelocitySensorElement> for MeasurementElement {
    fn from(element: AngularVelocitySensorElement) -> Self {
        MeasurementElement::AngularVelocity(element)
    }
}

impl From<LinearAccelerationSensorElement> for MeasurementElement {
    fn from(element: LinearAccelerationSensorElement) -> Self {
        MeasurementElement::LinearAcceleration(element)
    }
}

impl From<PointVelocitySensorElement> for MeasurementElement {
    fn from(element: PointVelocitySensorElement) -> Self {
        MeasurementElement::PointVelocity(element)
    }
}

impl From<PointPositionSensorElement> for MeasurementElement {
    fn from(element: PointPositionSensorElement) -> Self {
        MeasurementElement::PointPosition(element)
    }
}

// =========================================================================
// == Shared Helpers ==
// =========================================================================

/// Where a body-mounted sensor sits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorMount {
    pub body: BodyId,
    /// Measurement frame in body coordinates.
    pub mounting: Isometry3<f64>,
}

impl SensorMount {
    pub fn new(body: BodyId, mounting: Isometry3<f64>) -> Self {
        Self { body, mounting }
    }

    /// Measurement frame in estimation-frame coordinates.
    pub fn pose_in_estimation_frame(&self, ctx: &MeasurementContext) -> Result<Isometry3<f64>, EstimationError> {
        Ok(ctx.tree.relative_pose(ctx.estimation_body, self.body)? * self.mounting)
    }

    /// Rotation taking estimation-frame vectors into the measurement frame.
    pub fn estimation_to_measurement(&self, ctx: &MeasurementContext) -> Result<UnitQuaternion<f64>, EstimationError> {
        Ok(self.pose_in_estimation_frame(ctx)?.rotation.inverse())
    }
}

/// Motion of a point fixed on `body` relative to the center of mass, in
/// estimation-frame coordinates, with derivatives taken in that frame.
pub(crate) fn lever_arm(
    ctx: &MeasurementContext,
    body: BodyId,
    point: &Vector3<f64>,
) -> Result<PointMotion, EstimationError> {
    let point = ctx.tree.point_motion(ctx.estimation_body, body, point)?;
    let com = ctx.tree.center_of_mass(ctx.estimation_body)?;
    Ok(point - com)
}

pub(crate) fn sample_mismatch(name: &str, expected: &'static str) -> EstimationError {
    EstimationError::SampleMismatch {
        sensor: name.to_string(),
        expected,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Central finite differences over the tangent-space state perturbation.

    use super::*;

    /// Numerically differentiates `h` with respect to `block`.
    pub fn numeric_jacobian<F>(state: &GlobalState, block: BlockId, h: F) -> Matrix3<f64>
    where
        F: Fn(&GlobalState) -> Vector3<f64>,
    {
        let eps = 1e-6;
        let mut jacobian = Matrix3::zeros();
        for axis in 0..3 {
            let mut delta = Vector3::zeros();
            delta[axis] = eps;
            let mut plus = state.clone();
            plus.perturb(block, &delta);
            let mut minus = state.clone();
            minus.perturb(block, &(-delta));
            jacobian.set_column(axis, &((h(&plus) - h(&minus)) / (2.0 * eps)));
        }
        jacobian
    }

    /// Finds the analytic block for `block`, or zero if absent.
    pub fn analytic_block(blocks: &[(BlockId, Matrix3<f64>)], block: BlockId) -> Matrix3<f64> {
        blocks
            .iter()
            .filter(|(id, _)| *id == block)
            .fold(Matrix3::zeros(), |acc, (_, m)| acc + m)
    }
}
