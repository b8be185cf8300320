// stance_core/src/models/process/orientation.rs

use nalgebra::Matrix3;

use super::{ElementLinearization, ProcessModelElement, TimeDomain};
use crate::messages::ProcessInputs;
use crate::state::GlobalState;
use crate::types::BlockId;
use crate::utils::so3;

/// Rotation from the estimation frame to world, driven by the estimated
/// angular velocity.
///
/// The local error obeys `delta_theta_dot = delta_omega`, so the discrete
/// transition of the orientation block onto itself is the identity.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientationElement {
    pub orientation: BlockId,
    pub angular_velocity: BlockId,
}

impl OrientationElement {
    pub fn new(orientation: BlockId, angular_velocity: BlockId) -> Self {
        Self {
            orientation,
            angular_velocity,
        }
    }
}

impl ProcessModelElement for OrientationElement {
    fn block(&self) -> BlockId {
        self.orientation
    }

    fn time_domain(&self) -> TimeDomain {
        TimeDomain::Continuous
    }

    fn dependencies(&self) -> Vec<BlockId> {
        vec![self.angular_velocity]
    }

    fn linearize(&self, _state: &GlobalState) -> ElementLinearization {
        ElementLinearization {
            state: vec![(self.angular_velocity, Matrix3::identity())],
            input: Vec::new(),
            noise: None,
        }
    }

    fn propagate(&self, prior: &GlobalState, _inputs: &ProcessInputs, dt: f64, posterior: &mut GlobalState) {
        let omega = prior.vector3(self.angular_velocity);
        let rotation = so3::retract(&prior.orientation(self.orientation), &(omega * dt));
        posterior.set_orientation(self.orientation, &rotation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BlockKind, StateLayout};
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};

    #[test]
    fn test_propagate_integrates_body_rate() {
        let mut layout = StateLayout::new();
        let q = layout.add_block("orientation", BlockKind::Orientation).unwrap();
        let w = layout.add_block("angular_velocity", BlockKind::AngularVelocity).unwrap();
        let element = OrientationElement::new(q, w);

        let mut prior = GlobalState::new(layout);
        prior.set_vector3(w, &Vector3::new(0.0, 0.0, 1.0));
        let mut posterior = prior.clone();
        for _ in 0..100 {
            element.propagate(&prior, &ProcessInputs::default(), 0.01, &mut posterior);
            prior = posterior.clone();
        }

        let expected = UnitQuaternion::from_euler_angles(0.0, 0.0, 1.0);
        assert_relative_eq!(posterior.orientation(q).angle_to(&expected), 0.0, epsilon = 1e-9);
        assert_relative_eq!(posterior.orientation(q).quaternion().norm(), 1.0, epsilon = 1e-12);
    }
}
