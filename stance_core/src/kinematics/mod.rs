// stance_core/src/kinematics/mod.rs

use nalgebra::{Isometry3, Point3, Vector3};

use crate::error::KinematicsError;
use crate::types::{BodyId, JointId, JointState, PointMotion, SpatialAcceleration, Twist};

pub mod reconciler;
pub mod tree;

pub use reconciler::{joint_pass, EstimateBlocks, KinematicReconciler};
pub use tree::{JointKind, RigidBodyTree};

// =========================================================================
// == World-Aligned Body Motion ==
// =========================================================================

/// Pose, velocity and acceleration of one body, all expressed in world.
/// The linear terms describe the body's origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyMotion {
    pub pose: Isometry3<f64>,
    pub angular_velocity: Vector3<f64>,
    pub linear_velocity: Vector3<f64>,
    pub angular_acceleration: Vector3<f64>,
    pub linear_acceleration: Vector3<f64>,
}

impl Default for BodyMotion {
    fn default() -> Self {
        Self {
            pose: Isometry3::identity(),
            angular_velocity: Vector3::zeros(),
            linear_velocity: Vector3::zeros(),
            angular_acceleration: Vector3::zeros(),
            linear_acceleration: Vector3::zeros(),
        }
    }
}

impl BodyMotion {
    pub fn origin(&self) -> Vector3<f64> {
        self.pose.translation.vector
    }

    /// World motion of a point fixed in this body at `local` body coordinates.
    pub fn point_motion(&self, local: &Vector3<f64>) -> PointMotion {
        let r = self.pose.rotation * local;
        let w = self.angular_velocity;
        PointMotion {
            position: self.origin() + r,
            velocity: self.linear_velocity + w.cross(&r),
            acceleration: self.linear_acceleration + self.angular_acceleration.cross(&r) + w.cross(&w.cross(&r)),
        }
    }

    /// Re-expresses a world point motion as seen from this moving frame, in
    /// this frame's coordinates.
    pub fn observe_point(&self, point: &PointMotion) -> PointMotion {
        let w = self.angular_velocity;
        let d = point.position - self.origin();
        let d_dot = point.velocity - self.linear_velocity;
        let d_ddot = point.acceleration - self.linear_acceleration;
        let relative_velocity = d_dot - w.cross(&d);
        let relative_acceleration =
            d_ddot - self.angular_acceleration.cross(&d) - w.cross(&w.cross(&d)) - 2.0 * w.cross(&relative_velocity);

        let to_local = self.pose.rotation.inverse();
        PointMotion {
            position: to_local * d,
            velocity: to_local * relative_velocity,
            acceleration: to_local * relative_acceleration,
        }
    }

    /// Twist and acceleration of `self` relative to `base`, in `base` coordinates.
    pub fn relative_to(&self, base: &BodyMotion) -> (Twist, SpatialAcceleration) {
        let to_base = base.pose.rotation.inverse();
        let delta_omega = self.angular_velocity - base.angular_velocity;
        let angular_velocity = to_base * delta_omega;
        let angular_acceleration = to_base
            * (self.angular_acceleration - base.angular_acceleration - base.angular_velocity.cross(&delta_omega));

        let origin = base.observe_point(&PointMotion {
            position: self.origin(),
            velocity: self.linear_velocity,
            acceleration: self.linear_acceleration,
        });

        (
            Twist::new(angular_velocity, origin.velocity),
            SpatialAcceleration::new(angular_acceleration, origin.acceleration),
        )
    }
}

// =========================================================================
// == Kinematic Tree Collaborator ==
// =========================================================================

/// Forward kinematics of a floating-base tree.
///
/// Queries read the frames computed by the last `update_frames` call. Setters
/// only stage values; nothing is recomputed until `update_frames`.
pub trait KinematicTree {
    fn root_body(&self) -> BodyId;

    fn find_body(&self, name: &str) -> Option<BodyId>;

    fn set_joint_state(&mut self, joint: JointId, state: JointState) -> Result<(), KinematicsError>;

    /// Root-to-world transform.
    fn set_root_pose(&mut self, pose: Isometry3<f64>);

    /// Twist of the root relative to world, expressed in the root frame.
    fn set_root_twist(&mut self, twist: Twist);

    /// Angular and classical linear acceleration of the root relative to
    /// world, expressed in the root frame.
    fn set_root_acceleration(&mut self, acceleration: SpatialAcceleration);

    /// Recursive recomputation of every body frame, twist and acceleration.
    fn update_frames(&mut self);

    /// Body-to-world transform.
    fn body_pose(&self, body: BodyId) -> Result<Isometry3<f64>, KinematicsError>;

    /// Twist of `body` relative to `base`, in `base` coordinates.
    fn relative_twist(&self, base: BodyId, body: BodyId) -> Result<Twist, KinematicsError>;

    /// Acceleration of `body` relative to `base`, in `base` coordinates.
    fn relative_acceleration(&self, base: BodyId, body: BodyId) -> Result<SpatialAcceleration, KinematicsError>;

    /// Motion of the whole-tree center of mass relative to `base`, in `base`
    /// coordinates.
    fn center_of_mass(&self, base: BodyId) -> Result<PointMotion, KinematicsError>;

    /// Transform of `body` in `base` coordinates.
    fn relative_pose(&self, base: BodyId, body: BodyId) -> Result<Isometry3<f64>, KinematicsError> {
        Ok(self.body_pose(base)?.inverse() * self.body_pose(body)?)
    }

    /// Motion of a point fixed on `body` (given in `body` coordinates)
    /// relative to `base`, in `base` coordinates.
    fn point_motion(&self, base: BodyId, body: BodyId, point: &Vector3<f64>) -> Result<PointMotion, KinematicsError> {
        let pose = self.relative_pose(base, body)?;
        let twist = self.relative_twist(base, body)?;
        let acceleration = self.relative_acceleration(base, body)?;

        let r = pose.rotation * point;
        let w = twist.angular;
        Ok(PointMotion {
            position: pose.translation.vector + r,
            velocity: twist.linear + w.cross(&r),
            acceleration: acceleration.linear + acceleration.angular.cross(&r) + w.cross(&w.cross(&r)),
        })
    }

    /// World position of the center of mass.
    fn center_of_mass_position(&self) -> Result<Vector3<f64>, KinematicsError> {
        let root = self.root_body();
        let com = self.center_of_mass(root)?;
        Ok((self.body_pose(root)? * Point3::from(com.position)).coords)
    }
}
