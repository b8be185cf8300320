// stance_core/src/models/measurement/linear_acceleration.rs

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use super::{
    lever_arm, sample_mismatch, MeasurementContext, MeasurementModelElement, PredictedMeasurement, SensorMount,
};
use crate::config::NoiseCovariance;
use crate::error::{ConfigError, EstimationError};
use crate::messages::SensorSample;
use crate::types::{BlockId, PointMotion};
use crate::utils::so3::skew;

/// The blocks an accelerometer reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelerometerBlocks {
    pub orientation: BlockId,
    pub angular_velocity: BlockId,
    pub angular_acceleration: BlockId,
    pub com_acceleration: BlockId,
    pub bias: Option<BlockId>,
}

/// An accelerometer on any body of the tree.
///
/// With `rho` the sensor position relative to the center of mass in the
/// estimation frame, the specific force in the measurement frame is
///
/// ```text
/// z = R_em (alpha x rho + w x (w x rho) + 2 w x rho_dot + rho_ddot + R^T (a_com + g)) + b
/// ```
///
/// where `g = (0, 0, gravity_z)` cancels gravity in world.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearAccelerationSensorElement {
    pub name: String,
    pub mount: SensorMount,
    pub blocks: AccelerometerBlocks,
    pub gravity_z: f64,
    pub noise: NoiseCovariance,
}

/// Quantities shared by the prediction and the Jacobian.
struct Terms {
    r_em: UnitQuaternion<f64>,
    rho: PointMotion,
    omega: Vector3<f64>,
    alpha: Vector3<f64>,
    rotation: UnitQuaternion<f64>,
    /// `R^T (a_com + g)`.
    gravity_and_com: Vector3<f64>,
    bias: Vector3<f64>,
}

impl LinearAccelerationSensorElement {
    pub fn new(
        name: impl Into<String>,
        mount: SensorMount,
        blocks: AccelerometerBlocks,
        gravity_z: f64,
        noise: NoiseCovariance,
    ) -> Result<Self, ConfigError> {
        if !(gravity_z.is_finite() && gravity_z >= 0.0) {
            return Err(ConfigError::InvalidGravity(gravity_z));
        }
        Ok(Self {
            name: name.into(),
            mount,
            blocks,
            gravity_z,
            noise,
        })
    }

    fn terms(&self, ctx: &MeasurementContext) -> Result<Terms, EstimationError> {
        let b = &self.blocks;
        let state = ctx.state;
        let rotation = state.orientation(b.orientation);
        let com_acceleration = state.vector3(b.com_acceleration);
        let gravity = Vector3::new(0.0, 0.0, self.gravity_z);

        Ok(Terms {
            r_em: self.mount.estimation_to_measurement(ctx)?,
            rho: lever_arm(ctx, self.mount.body, &self.mount.mounting.translation.vector)?,
            omega: state.vector3(b.angular_velocity),
            alpha: state.vector3(b.angular_acceleration),
            rotation,
            gravity_and_com: rotation.inverse() * (com_acceleration + gravity),
            bias: b.bias.map_or_else(Vector3::zeros, |id| state.vector3(id)),
        })
    }

    fn predicted(&self, ctx: &MeasurementContext) -> Result<Vector3<f64>, EstimationError> {
        let t = self.terms(ctx)?;
        let rho = &t.rho;
        let w = t.omega;
        let specific_force = t.alpha.cross(&rho.position)
            + w.cross(&w.cross(&rho.position))
            + 2.0 * w.cross(&rho.velocity)
            + rho.acceleration
            + t.gravity_and_com;
        Ok(t.r_em * specific_force + t.bias)
    }
}

impl MeasurementModelElement for LinearAccelerationSensorElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<BlockId> {
        let b = &self.blocks;
        [b.orientation, b.angular_velocity, b.angular_acceleration, b.com_acceleration]
            .into_iter()
            .chain(b.bias)
            .collect()
    }

    fn predict(&self, ctx: &MeasurementContext, _sample: &SensorSample) -> Result<PredictedMeasurement, EstimationError> {
        Ok(PredictedMeasurement::Vector(self.predicted(ctx)?))
    }

    fn residual(&self, ctx: &MeasurementContext, sample: &SensorSample) -> Result<Vector3<f64>, EstimationError> {
        match sample {
            SensorSample::LinearAcceleration(measured) => Ok(measured - self.predicted(ctx)?),
            _ => Err(sample_mismatch(&self.name, "LinearAcceleration")),
        }
    }

    fn jacobian_blocks(
        &self,
        ctx: &MeasurementContext,
        _sample: &SensorSample,
    ) -> Result<Vec<(BlockId, Matrix3<f64>)>, EstimationError> {
        let t = self.terms(ctx)?;
        let b = &self.blocks;
        let r_em = t.r_em.to_rotation_matrix().into_inner();
        let rho = t.rho.position;
        let rho_dot = t.rho.velocity;
        let w = t.omega;

        let d_orientation = r_em * skew(&t.gravity_and_com);
        let d_omega = r_em * (-skew(&w.cross(&rho)) - skew(&w) * skew(&rho) - 2.0 * skew(&rho_dot));
        let d_alpha = -r_em * skew(&rho);
        let d_com_acceleration = r_em * t.rotation.inverse().to_rotation_matrix().into_inner();

        let mut blocks = vec![
            (b.orientation, d_orientation),
            (b.angular_velocity, d_omega),
            (b.angular_acceleration, d_alpha),
            (b.com_acceleration, d_com_acceleration),
        ];
        if let Some(bias) = b.bias {
            blocks.push((bias, Matrix3::identity()));
        }
        Ok(blocks)
    }

    fn noise_covariance(&self) -> &Matrix3<f64> {
        self.noise.matrix()
    }
}
