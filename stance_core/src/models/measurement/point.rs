// stance_core/src/models/measurement/point.rs

//! World-frame point sensors, typically a stance foot that the contact logic
//! has declared stationary.

use nalgebra::{Matrix3, Vector3};

use super::{lever_arm, sample_mismatch, MeasurementContext, MeasurementModelElement, PredictedMeasurement};
use crate::config::NoiseCovariance;
use crate::error::EstimationError;
use crate::messages::SensorSample;
use crate::types::{BlockId, BodyId};
use crate::utils::so3::skew;

// --- Velocity ---

/// `z = v_com + R (w x rho + rho_dot)`, with `rho` the point relative to the
/// center of mass in the estimation frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PointVelocitySensorElement {
    pub name: String,
    pub orientation: BlockId,
    pub angular_velocity: BlockId,
    pub com_velocity: BlockId,
    pub noise: NoiseCovariance,
}

impl PointVelocitySensorElement {
    pub fn new(
        name: impl Into<String>,
        orientation: BlockId,
        angular_velocity: BlockId,
        com_velocity: BlockId,
        noise: NoiseCovariance,
    ) -> Self {
        Self {
            name: name.into(),
            orientation,
            angular_velocity,
            com_velocity,
            noise,
        }
    }

    fn unpack(&self, sample: &SensorSample) -> Result<(BodyId, Vector3<f64>, Vector3<f64>), EstimationError> {
        match sample {
            SensorSample::PointVelocity { body, point, velocity } => Ok((*body, *point, *velocity)),
            _ => Err(sample_mismatch(&self.name, "PointVelocity")),
        }
    }

    /// Returns the prediction and the estimation-frame relative velocity `u`.
    fn predicted(&self, ctx: &MeasurementContext, body: BodyId, point: &Vector3<f64>) -> Result<(Vector3<f64>, Vector3<f64>), EstimationError> {
        let rho = lever_arm(ctx, body, point)?;
        let omega = ctx.state.vector3(self.angular_velocity);
        let u = omega.cross(&rho.position) + rho.velocity;
        let predicted = ctx.state.vector3(self.com_velocity) + ctx.state.orientation(self.orientation) * u;
        Ok((predicted, u))
    }
}

impl MeasurementModelElement for PointVelocitySensorElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<BlockId> {
        vec![self.orientation, self.angular_velocity, self.com_velocity]
    }

    fn predict(&self, ctx: &MeasurementContext, sample: &SensorSample) -> Result<PredictedMeasurement, EstimationError> {
        let (body, point, _) = self.unpack(sample)?;
        Ok(PredictedMeasurement::Vector(self.predicted(ctx, body, &point)?.0))
    }

    fn residual(&self, ctx: &MeasurementContext, sample: &SensorSample) -> Result<Vector3<f64>, EstimationError> {
        let (body, point, measured) = self.unpack(sample)?;
        Ok(measured - self.predicted(ctx, body, &point)?.0)
    }

    fn jacobian_blocks(
        &self,
        ctx: &MeasurementContext,
        sample: &SensorSample,
    ) -> Result<Vec<(BlockId, Matrix3<f64>)>, EstimationError> {
        let (body, point, _) = self.unpack(sample)?;
        let (_, u) = self.predicted(ctx, body, &point)?;
        let rho = lever_arm(ctx, body, &point)?.position;
        let rotation = ctx.state.orientation(self.orientation).to_rotation_matrix().into_inner();

        Ok(vec![
            (self.orientation, -rotation * skew(&u)),
            (self.angular_velocity, -rotation * skew(&rho)),
            (self.com_velocity, Matrix3::identity()),
        ])
    }

    fn noise_covariance(&self) -> &Matrix3<f64> {
        self.noise.matrix()
    }
}

// --- Position ---

/// `z = p_com + R rho`.
#[derive(Debug, Clone, PartialEq)]
pub struct PointPositionSensorElement {
    pub name: String,
    pub orientation: BlockId,
    pub com_position: BlockId,
    pub noise: NoiseCovariance,
}

impl PointPositionSensorElement {
    pub fn new(name: impl Into<String>, orientation: BlockId, com_position: BlockId, noise: NoiseCovariance) -> Self {
        Self {
            name: name.into(),
            orientation,
            com_position,
            noise,
        }
    }

    fn unpack(&self, sample: &SensorSample) -> Result<(BodyId, Vector3<f64>, Vector3<f64>), EstimationError> {
        match sample {
            SensorSample::PointPosition { body, point, position } => Ok((*body, *point, *position)),
            _ => Err(sample_mismatch(&self.name, "PointPosition")),
        }
    }

    fn predicted(&self, ctx: &MeasurementContext, body: BodyId, point: &Vector3<f64>) -> Result<Vector3<f64>, EstimationError> {
        let rho = lever_arm(ctx, body, point)?.position;
        Ok(ctx.state.vector3(self.com_position) + ctx.state.orientation(self.orientation) * rho)
    }
}

impl MeasurementModelElement for PointPositionSensorElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<BlockId> {
        vec![self.orientation, self.com_position]
    }

    fn predict(&self, ctx: &MeasurementContext, sample: &SensorSample) -> Result<PredictedMeasurement, EstimationError> {
        let (body, point, _) = self.unpack(sample)?;
        Ok(PredictedMeasurement::Vector(self.predicted(ctx, body, &point)?))
    }

    fn residual(&self, ctx: &MeasurementContext, sample: &SensorSample) -> Result<Vector3<f64>, EstimationError> {
        let (body, point, measured) = self.unpack(sample)?;
        Ok(measured - self.predicted(ctx, body, &point)?)
    }

    fn jacobian_blocks(
        &self,
        ctx: &MeasurementContext,
        sample: &SensorSample,
    ) -> Result<Vec<(BlockId, Matrix3<f64>)>, EstimationError> {
        let (body, point, _) = self.unpack(sample)?;
        let rho = lever_arm(ctx, body, &point)?.position;
        let rotation = ctx.state.orientation(self.orientation).to_rotation_matrix().into_inner();
        Ok(vec![
            (self.orientation, -rotation * skew(&rho)),
            (self.com_position, Matrix3::identity()),
        ])
    }

    fn noise_covariance(&self) -> &Matrix3<f64> {
        self.noise.matrix()
    }
}
