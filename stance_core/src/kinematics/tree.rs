// stance_core/src/kinematics/tree.rs

use nalgebra::{Isometry3, Translation3, Unit, UnitQuaternion, Vector3};

use super::{BodyMotion, KinematicTree};
use crate::error::KinematicsError;
use crate::types::{BodyId, JointId, JointState, PointMotion, SpatialAcceleration, Twist};

/// The joint connecting a body to its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointKind {
    /// Rotation about an axis given in the joint frame.
    Revolute(Unit<Vector3<f64>>),
    /// Translation along an axis given in the joint frame.
    Prismatic(Unit<Vector3<f64>>),
    Fixed,
}

#[derive(Debug, Clone)]
struct Body {
    name: String,
    parent: Option<BodyId>,
    joint: JointKind,
    /// Parent frame to joint frame, at zero joint position.
    offset: Isometry3<f64>,
    mass: f64,
    /// Center of mass in body coordinates.
    com: Vector3<f64>,
    joint_state: JointState,
}

/// A floating-base tree of rigid bodies with one-DOF joints.
///
/// Bodies are stored in the order they were added, which is always a valid
/// topological order because a parent must exist before its children.
#[derive(Debug, Clone)]
pub struct RigidBodyTree {
    bodies: Vec<Body>,
    /// `JointId` to the body that joint moves.
    joints: Vec<BodyId>,
    root_pose: Isometry3<f64>,
    root_twist: Twist,
    root_acceleration: SpatialAcceleration,
    motions: Vec<BodyMotion>,
}

impl RigidBodyTree {
    /// A tree containing only the floating root body.
    pub fn new(root_name: impl Into<String>, mass: f64, com: Vector3<f64>) -> Self {
        let root = Body {
            name: root_name.into(),
            parent: None,
            joint: JointKind::Fixed,
            offset: Isometry3::identity(),
            mass,
            com,
            joint_state: JointState::default(),
        };
        let mut tree = Self {
            bodies: vec![root],
            joints: Vec::new(),
            root_pose: Isometry3::identity(),
            root_twist: Twist::default(),
            root_acceleration: SpatialAcceleration::default(),
            motions: Vec::new(),
        };
        tree.update_frames();
        tree
    }

    /// Attaches a body to `parent`. Returns the new body and, unless the joint
    /// is fixed, the joint that moves it.
    pub fn add_body(
        &mut self,
        parent: BodyId,
        name: impl Into<String>,
        joint: JointKind,
        offset: Isometry3<f64>,
        mass: f64,
        com: Vector3<f64>,
    ) -> Result<(BodyId, Option<JointId>), KinematicsError> {
        if parent.0 >= self.bodies.len() {
            return Err(KinematicsError::InvalidParent { parent });
        }
        self.bodies.push(Body {
            name: name.into(),
            parent: Some(parent),
            joint,
            offset,
            mass,
            com,
            joint_state: JointState::default(),
        });
        let body = BodyId(self.bodies.len() - 1);

        let joint_id = match joint {
            JointKind::Fixed => None,
            _ => {
                self.joints.push(body);
                Some(JointId(self.joints.len() - 1))
            }
        };
        self.update_frames();
        Ok((body, joint_id))
    }

    /// The joint that moves the named body.
    pub fn find_joint(&self, body_name: &str) -> Option<JointId> {
        let body = self.find_body(body_name)?;
        self.joints.iter().position(|b| *b == body).map(JointId)
    }

    pub fn joint_ids(&self) -> impl Iterator<Item = JointId> + '_ {
        (0..self.joints.len()).map(JointId)
    }

    pub fn joint_state(&self, joint: JointId) -> Result<JointState, KinematicsError> {
        let body = self.joint_body(joint)?;
        Ok(self.bodies[body.0].joint_state)
    }

    pub fn body_name(&self, body: BodyId) -> Option<&str> {
        self.bodies.get(body.0).map(|b| b.name.as_str())
    }

    pub fn total_mass(&self) -> f64 {
        self.bodies.iter().map(|b| b.mass).sum()
    }

    /// World-aligned motion of `body` as of the last frame update.
    pub fn body_motion(&self, body: BodyId) -> Result<&BodyMotion, KinematicsError> {
        self.motions.get(body.0).ok_or(KinematicsError::UnknownBody(body))
    }

    /// Motion of the center of mass in world.
    pub fn center_of_mass_world(&self) -> PointMotion {
        let total = self.total_mass();
        if total <= 0.0 {
            return self.motions[0].point_motion(&Vector3::zeros());
        }
        let mut com = PointMotion::default();
        for (body, motion) in self.bodies.iter().zip(&self.motions) {
            let point = motion.point_motion(&body.com);
            com.position += point.position * body.mass;
            com.velocity += point.velocity * body.mass;
            com.acceleration += point.acceleration * body.mass;
        }
        PointMotion {
            position: com.position / total,
            velocity: com.velocity / total,
            acceleration: com.acceleration / total,
        }
    }

    fn joint_body(&self, joint: JointId) -> Result<BodyId, KinematicsError> {
        self.joints.get(joint.0).copied().ok_or(KinematicsError::UnknownJoint(joint))
    }

    fn motion(&self, body: BodyId) -> Result<&BodyMotion, KinematicsError> {
        self.body_motion(body)
    }

    /// Propagates the parent's motion across one joint.
    fn child_motion(parent: &BodyMotion, body: &Body) -> BodyMotion {
        let joint_frame = parent.pose * body.offset;
        let q = body.joint_state;
        let w = parent.angular_velocity;

        let (mut pose, axis) = match body.joint {
            JointKind::Revolute(axis) => (
                joint_frame * UnitQuaternion::from_axis_angle(&axis, q.position),
                Some(axis),
            ),
            JointKind::Prismatic(axis) => (
                joint_frame * Translation3::from(axis.into_inner() * q.position),
                Some(axis),
            ),
            JointKind::Fixed => (joint_frame, None),
        };
        pose.rotation.renormalize();

        let d = pose.translation.vector - parent.origin();
        let mut motion = BodyMotion {
            pose,
            angular_velocity: w,
            linear_velocity: parent.linear_velocity + w.cross(&d),
            angular_acceleration: parent.angular_acceleration,
            linear_acceleration: parent.linear_acceleration
                + parent.angular_acceleration.cross(&d)
                + w.cross(&w.cross(&d)),
        };

        if let Some(axis) = axis {
            let s = pose.rotation * axis.into_inner();
            match body.joint {
                JointKind::Revolute(_) => {
                    motion.angular_velocity += s * q.velocity;
                    motion.angular_acceleration += s * q.acceleration + w.cross(&(s * q.velocity));
                }
                JointKind::Prismatic(_) => {
                    motion.linear_velocity += s * q.velocity;
                    motion.linear_acceleration += s * q.acceleration + 2.0 * w.cross(&(s * q.velocity));
                }
                JointKind::Fixed => {}
            }
        }
        motion
    }
}

impl KinematicTree for RigidBodyTree {
    fn root_body(&self) -> BodyId {
        BodyId(0)
    }

    fn find_body(&self, name: &str) -> Option<BodyId> {
        self.bodies.iter().position(|b| b.name == name).map(BodyId)
    }

    fn set_joint_state(&mut self, joint: JointId, state: JointState) -> Result<(), KinematicsError> {
        let body = self.joint_body(joint)?;
        if !state.is_finite() {
            return Err(KinematicsError::NonFiniteJointState(joint));
        }
        if matches!(self.bodies[body.0].joint, JointKind::Fixed) {
            return Err(KinematicsError::FixedJoint(joint));
        }
        self.bodies[body.0].joint_state = state;
        Ok(())
    }

    fn set_root_pose(&mut self, mut pose: Isometry3<f64>) {
        pose.rotation.renormalize();
        self.root_pose = pose;
    }

    fn set_root_twist(&mut self, twist: Twist) {
        self.root_twist = twist;
    }

    fn set_root_acceleration(&mut self, acceleration: SpatialAcceleration) {
        self.root_acceleration = acceleration;
    }

    fn update_frames(&mut self) {
        let rotation = self.root_pose.rotation;
        let mut motions = Vec::with_capacity(self.bodies.len());
        motions.push(BodyMotion {
            pose: self.root_pose,
            angular_velocity: rotation * self.root_twist.angular,
            linear_velocity: rotation * self.root_twist.linear,
            angular_acceleration: rotation * self.root_acceleration.angular,
            linear_acceleration: rotation * self.root_acceleration.linear,
        });

        for body in self.bodies.iter().skip(1) {
            // Parents always precede children.
            let parent = body.parent.map_or(0, |p| p.0);
            let motion = Self::child_motion(&motions[parent], body);
            motions.push(motion);
        }
        self.motions = motions;
    }

    fn body_pose(&self, body: BodyId) -> Result<Isometry3<f64>, KinematicsError> {
        Ok(self.motion(body)?.pose)
    }

    fn relative_twist(&self, base: BodyId, body: BodyId) -> Result<Twist, KinematicsError> {
        Ok(self.motion(body)?.relative_to(self.motion(base)?).0)
    }

    fn relative_acceleration(&self, base: BodyId, body: BodyId) -> Result<SpatialAcceleration, KinematicsError> {
        Ok(self.motion(body)?.relative_to(self.motion(base)?).1)
    }

    fn center_of_mass(&self, base: BodyId) -> Result<PointMotion, KinematicsError> {
        let frame = self.motion(base)?;
        Ok(frame.observe_point(&self.center_of_mass_world()))
    }
}
