// stance_core/src/models/measurement/orientation.rs

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use super::{sample_mismatch, MeasurementContext, MeasurementModelElement, PredictedMeasurement, SensorMount};
use crate::config::NoiseCovariance;
use crate::error::EstimationError;
use crate::messages::SensorSample;
use crate::types::BlockId;
use crate::utils::so3;

/// An attitude sensor reporting the measurement frame's rotation to world.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientationSensorElement {
    pub name: String,
    pub mount: SensorMount,
    pub orientation: BlockId,
    pub noise: NoiseCovariance,
}

impl OrientationSensorElement {
    pub fn new(name: impl Into<String>, mount: SensorMount, orientation: BlockId, noise: NoiseCovariance) -> Self {
        Self {
            name: name.into(),
            mount,
            orientation,
            noise,
        }
    }

    fn measured<'a>(&self, sample: &'a SensorSample) -> Result<&'a UnitQuaternion<f64>, EstimationError> {
        match sample {
            SensorSample::Orientation(q) => Ok(q),
            _ => Err(sample_mismatch(&self.name, "Orientation")),
        }
    }

    fn predicted(&self, ctx: &MeasurementContext) -> Result<UnitQuaternion<f64>, EstimationError> {
        let measurement_in_estimation = self.mount.pose_in_estimation_frame(ctx)?.rotation;
        Ok(ctx.state.orientation(self.orientation) * measurement_in_estimation)
    }
}

impl MeasurementModelElement for OrientationSensorElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<BlockId> {
        vec![self.orientation]
    }

    fn predict(&self, ctx: &MeasurementContext, _sample: &SensorSample) -> Result<PredictedMeasurement, EstimationError> {
        Ok(PredictedMeasurement::Rotation(self.predicted(ctx)?))
    }

    fn residual(&self, ctx: &MeasurementContext, sample: &SensorSample) -> Result<Vector3<f64>, EstimationError> {
        let measured = self.measured(sample)?;
        Ok(so3::local_difference(&self.predicted(ctx)?, measured))
    }

    fn jacobian_blocks(
        &self,
        ctx: &MeasurementContext,
        _sample: &SensorSample,
    ) -> Result<Vec<(BlockId, Matrix3<f64>)>, EstimationError> {
        // q * exp(d) * q_me = q * q_me * exp(R_em d)
        let r_em = self.mount.estimation_to_measurement(ctx)?;
        Ok(vec![(self.orientation, r_em.to_rotation_matrix().into_inner())])
    }

    fn noise_covariance(&self) -> &Matrix3<f64> {
        self.noise.matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::{JointKind, KinematicTree, RigidBodyTree};
    use crate::models::measurement::test_support::{analytic_block, numeric_jacobian};
    use crate::state::{BlockKind, GlobalState, StateLayout};
    use approx::assert_relative_eq;
    use nalgebra::Isometry3;

    #[test]
    fn test_residual_and_jacobian_on_tilted_mount() {
        let mut tree = RigidBodyTree::new("pelvis", 1.0, Vector3::zeros());
        let (chest, _) = tree
            .add_body(
                tree.root_body(),
                "chest",
                JointKind::Fixed,
                Isometry3::rotation(Vector3::new(0.0, 0.3, 0.0)),
                1.0,
                Vector3::zeros(),
            )
            .unwrap();

        let mut layout = StateLayout::new();
        let q = layout.add_block("orientation", BlockKind::Orientation).unwrap();
        let mut state = GlobalState::new(layout);
        state.set_orientation(q, &UnitQuaternion::from_euler_angles(0.2, 0.1, -0.4));

        let mount = SensorMount::new(chest, Isometry3::rotation(Vector3::new(0.1, 0.0, 0.5)));
        let element = OrientationSensorElement::new(
            "imu",
            mount,
            q,
            NoiseCovariance::from_std_dev("imu", 0.01).unwrap(),
        );

        let ctx = MeasurementContext {
            state: &state,
            tree: &tree,
            estimation_body: tree.root_body(),
        };
        let predicted = match element.predict(&ctx, &SensorSample::Orientation(UnitQuaternion::identity())).unwrap() {
            PredictedMeasurement::Rotation(r) => r,
            other => panic!("unexpected prediction {other:?}"),
        };
        let sample = SensorSample::Orientation(predicted);
        assert_relative_eq!(element.residual(&ctx, &sample).unwrap(), Vector3::zeros(), epsilon = 1e-12);

        let analytic = element.jacobian_blocks(&ctx, &sample).unwrap();
        // The residual moves opposite to the prediction.
        let numeric = numeric_jacobian(&state, q, |s| {
            let ctx = MeasurementContext {
                state: s,
                tree: &tree,
                estimation_body: tree.root_body(),
            };
            -element.residual(&ctx, &sample).unwrap()
        });
        assert_relative_eq!(analytic_block(&analytic, q), numeric, epsilon = 1e-6);
    }

    #[test]
    fn test_wrong_sample_kind_is_rejected() {
        let tree = RigidBodyTree::new("pelvis", 1.0, Vector3::zeros());
        let mut layout = StateLayout::new();
        let q = layout.add_block("orientation", BlockKind::Orientation).unwrap();
        let state = GlobalState::new(layout);
        let element = OrientationSensorElement::new(
            "imu",
            SensorMount::new(tree.root_body(), Isometry3::identity()),
            q,
            NoiseCovariance::from_std_dev("imu", 0.01).unwrap(),
        );
        let ctx = MeasurementContext {
            state: &state,
            tree: &tree,
            estimation_body: tree.root_body(),
        };
        let result = element.residual(&ctx, &SensorSample::AngularVelocity(Vector3::zeros()));
        assert!(matches!(result, Err(EstimationError::SampleMismatch { .. })));
    }
}
