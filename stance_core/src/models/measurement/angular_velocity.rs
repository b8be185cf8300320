// stance_core/src/models/measurement/angular_velocity.rs

use nalgebra::{Matrix3, Vector3};

use super::{sample_mismatch, MeasurementContext, MeasurementModelElement, PredictedMeasurement, SensorMount};
use crate::config::NoiseCovariance;
use crate::error::EstimationError;
use crate::messages::SensorSample;
use crate::types::BlockId;

/// A gyroscope on any body of the tree.
///
/// The reading is the estimation-frame angular velocity plus the joint-driven
/// angular velocity of the sensor body relative to the estimation body, both
/// in the measurement frame, plus an optional bias.
#[derive(Debug, Clone, PartialEq)]
pub struct AngularVelocitySensorElement {
    pub name: String,
    pub mount: SensorMount,
    pub angular_velocity: BlockId,
    pub bias: Option<BlockId>,
    pub noise: NoiseCovariance,
}

impl AngularVelocitySensorElement {
    pub fn new(
        name: impl Into<String>,
        mount: SensorMount,
        angular_velocity: BlockId,
        bias: Option<BlockId>,
        noise: NoiseCovariance,
    ) -> Self {
        Self {
            name: name.into(),
            mount,
            angular_velocity,
            bias,
            noise,
        }
    }

    fn predicted(&self, ctx: &MeasurementContext) -> Result<Vector3<f64>, EstimationError> {
        let r_em = self.mount.estimation_to_measurement(ctx)?;
        let relative = ctx.tree.relative_twist(ctx.estimation_body, self.mount.body)?.angular;
        let omega = ctx.state.vector3(self.angular_velocity);
        let bias = self.bias.map_or_else(Vector3::zeros, |b| ctx.state.vector3(b));
        Ok(r_em * (omega + relative) + bias)
    }
}

impl MeasurementModelElement for AngularVelocitySensorElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<BlockId> {
        std::iter::once(self.angular_velocity).chain(self.bias).collect()
    }

    fn predict(&self, ctx: &MeasurementContext, _sample: &SensorSample) -> Result<PredictedMeasurement, EstimationError> {
        Ok(PredictedMeasurement::Vector(self.predicted(ctx)?))
    }

    fn residual(&self, ctx: &MeasurementContext, sample: &SensorSample) -> Result<Vector3<f64>, EstimationError> {
        match sample {
            SensorSample::AngularVelocity(measured) => Ok(measured - self.predicted(ctx)?),
            _ => Err(sample_mismatch(&self.name, "AngularVelocity")),
        }
    }

    fn jacobian_blocks(
        &self,
        ctx: &MeasurementContext,
        _sample: &SensorSample,
    ) -> Result<Vec<(BlockId, Matrix3<f64>)>, EstimationError> {
        let r_em = self.mount.estimation_to_measurement(ctx)?;
        let mut blocks = vec![(self.angular_velocity, r_em.to_rotation_matrix().into_inner())];
        if let Some(bias) = self.bias {
            blocks.push((bias, Matrix3::identity()));
        }
        Ok(blocks)
    }

    fn noise_covariance(&self) -> &Matrix3<f64> {
        self.noise.matrix()
    }
}
