// stance_core/src/kinematics/reconciler.rs

use nalgebra::{Isometry3, Translation3, Vector3};

use super::KinematicTree;
use crate::error::{EstimationError, KinematicsError};
use crate::estimation::PostStateChange;
use crate::messages::JointReading;
use crate::state::GlobalState;
use crate::types::{BlockId, BodyId, SpatialAcceleration, Twist};

/// The state blocks the root pass reads. Missing acceleration blocks are
/// treated as zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimateBlocks {
    pub orientation: BlockId,
    pub angular_velocity: BlockId,
    pub angular_acceleration: Option<BlockId>,
    pub com_position: BlockId,
    pub com_velocity: BlockId,
    pub com_acceleration: Option<BlockId>,
}

/// Keeps the kinematic tree consistent with the joint sensors and with the
/// floating-base estimate.
#[derive(Debug, Clone)]
pub struct KinematicReconciler {
    estimation_body: BodyId,
    blocks: EstimateBlocks,
}

impl KinematicReconciler {
    pub fn new(estimation_body: BodyId, blocks: EstimateBlocks) -> Self {
        Self {
            estimation_body,
            blocks,
        }
    }

    pub fn estimation_body(&self) -> BodyId {
        self.estimation_body
    }

    /// Copies joint samples into the tree and recomputes all frames.
    pub fn joint_pass(&self, tree: &mut dyn KinematicTree, joints: &[JointReading]) -> Result<(), KinematicsError> {
        joint_pass(tree, joints)
    }

    /// Solves for the root pose, twist and acceleration that make the
    /// estimation body and center of mass match the estimate, then recomputes
    /// all frames.
    ///
    /// Must run after the joint pass of the same tick: every relative term
    /// below depends on the current joint velocities.
    pub fn root_pass(&self, state: &GlobalState, tree: &mut dyn KinematicTree) -> Result<(), KinematicsError> {
        let root = tree.root_body();
        let b = &self.blocks;

        let rotation = state.orientation(b.orientation);
        let omega = state.vector3(b.angular_velocity);
        let alpha = b.angular_acceleration.map_or_else(Vector3::zeros, |id| state.vector3(id));
        let com_position = state.vector3(b.com_position);
        let com_velocity = state.vector3(b.com_velocity);
        let com_acceleration = b.com_acceleration.map_or_else(Vector3::zeros, |id| state.vector3(id));

        // Estimation body relative to the root, in root coordinates.
        let root_to_estimation = tree.relative_pose(root, self.estimation_body)?;
        let estimation_twist = tree.relative_twist(root, self.estimation_body)?;
        let estimation_acceleration = tree.relative_acceleration(root, self.estimation_body)?;
        // Center of mass relative to the root, in root coordinates.
        let com = tree.center_of_mass(root)?;

        // --- Pose ---
        // Composed rotations drift off unit norm; the root must not inherit it.
        let mut root_rotation = rotation * root_to_estimation.rotation.inverse();
        root_rotation.renormalize();
        let root_position = com_position - root_rotation * com.position;
        let root_pose = Isometry3::from_parts(Translation3::from(root_position), root_rotation);

        // --- Twist, in root coordinates ---
        let omega_root = root_to_estimation.rotation * omega - estimation_twist.angular;
        let world_to_root = root_rotation.inverse();
        let v_root = world_to_root * com_velocity - omega_root.cross(&com.position) - com.velocity;

        // --- Acceleration, in root coordinates ---
        let alpha_root = root_to_estimation.rotation * alpha
            - omega_root.cross(&estimation_twist.angular)
            - estimation_acceleration.angular;
        let a_root = world_to_root * com_acceleration
            - alpha_root.cross(&com.position)
            - omega_root.cross(&omega_root.cross(&com.position))
            - 2.0 * omega_root.cross(&com.velocity)
            - com.acceleration;

        tree.set_root_pose(root_pose);
        tree.set_root_twist(Twist::new(omega_root, v_root));
        tree.set_root_acceleration(SpatialAcceleration::new(alpha_root, a_root));
        tree.update_frames();
        Ok(())
    }
}

/// Copies joint samples into the tree and recomputes all frames. The root is
/// left where it is.
pub fn joint_pass(tree: &mut dyn KinematicTree, joints: &[JointReading]) -> Result<(), KinematicsError> {
    for reading in joints {
        tree.set_joint_state(reading.joint, reading.state)?;
    }
    tree.update_frames();
    Ok(())
}

impl PostStateChange for KinematicReconciler {
    fn on_state_change(&mut self, state: &GlobalState, tree: &mut dyn KinematicTree) -> Result<(), EstimationError> {
        self.root_pass(state, tree)?;
        Ok(())
    }
}
