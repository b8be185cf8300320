// stance_sim/src/simulation/trajectory.rs

use nalgebra::{Isometry3, Translation3, Unit, UnitQuaternion, Vector3};
use stance_core::error::KinematicsError;
use stance_core::kinematics::KinematicTree;
use stance_core::types::{JointId, JointState, PointMotion, SpatialAcceleration, Twist};

use super::config::TrajectoryConfig;
use super::robot::DemoBiped;
use super::SimulationError;

/// The true state of the robot at one instant.
#[derive(Debug, Clone)]
pub struct GroundTruth {
    pub time: f64,
    pub joints: Vec<(JointId, JointState)>,
    /// Estimation body orientation in world.
    pub orientation: UnitQuaternion<f64>,
    /// Estimation body angular velocity, in its own frame.
    pub angular_velocity: Vector3<f64>,
    /// Estimation body angular acceleration, in its own frame.
    pub angular_acceleration: Vector3<f64>,
    /// Whole-body center of mass, world.
    pub com: PointMotion,
}

/// Closed-form pelvis and joint motion.
///
/// The pelvis turns about a fixed world axis `a` by
/// `theta(t) = rate t + amplitude sin(frequency t)`, so its angular velocity
/// is `a theta_dot` in world and in the pelvis frame alike.
#[derive(Debug, Clone)]
pub struct Trajectory {
    config: TrajectoryConfig,
    axis: Unit<Vector3<f64>>,
}

impl Trajectory {
    pub fn new(config: TrajectoryConfig) -> Result<Self, SimulationError> {
        let axis = Unit::try_new(config.rotation_axis, 1e-9).ok_or_else(|| {
            SimulationError::InvalidScenario("trajectory rotation_axis must be non-zero".to_string())
        })?;
        Ok(Self { config, axis })
    }

    /// Poses `robot` at time `t` and reads the ground truth back from it.
    pub fn apply(&self, t: f64, robot: &mut DemoBiped) -> Result<GroundTruth, KinematicsError> {
        let c = &self.config;

        // --- Pelvis rotation ---
        let w = c.rotation_frequency;
        let theta = c.rotation_rate * t + c.rotation_amplitude * (w * t).sin();
        let theta_dot = c.rotation_rate + c.rotation_amplitude * w * (w * t).cos();
        let theta_ddot = -c.rotation_amplitude * w * w * (w * t).sin();
        let rotation = UnitQuaternion::from_axis_angle(&self.axis, theta);
        let omega = self.axis.into_inner() * theta_dot;
        let alpha = self.axis.into_inner() * theta_ddot;

        // --- Pelvis translation, world ---
        let f = c.translation_frequency;
        let amplitude = c.translation_amplitude;
        let position = c.base_position + amplitude * (f * t).sin();
        let velocity = amplitude * (f * (f * t).cos());
        let acceleration = amplitude * (-f * f * (f * t).sin());

        let to_root = rotation.inverse();
        robot
            .tree
            .set_root_pose(Isometry3::from_parts(Translation3::from(position), rotation));
        robot.tree.set_root_twist(Twist::new(omega, to_root * velocity));
        robot
            .tree
            .set_root_acceleration(SpatialAcceleration::new(alpha, to_root * acceleration));

        // --- Joints, each with its own phase ---
        let mut joints = Vec::with_capacity(robot.joints.len());
        let jw = c.joint_frequency;
        for (i, &joint) in robot.joints.iter().enumerate() {
            let phase = jw * t + i as f64 * 0.7;
            let state = JointState::new(
                c.joint_amplitude * phase.sin(),
                c.joint_amplitude * jw * phase.cos(),
                -c.joint_amplitude * jw * jw * phase.sin(),
            );
            robot.tree.set_joint_state(joint, state)?;
            joints.push((joint, state));
        }
        robot.tree.update_frames();

        let torso = robot.tree.body_motion(robot.torso)?;
        let torso_to_world = torso.pose.rotation;
        Ok(GroundTruth {
            time: t,
            joints,
            orientation: torso_to_world,
            angular_velocity: torso_to_world.inverse() * torso.angular_velocity,
            angular_acceleration: torso_to_world.inverse() * torso.angular_acceleration,
            com: robot.tree.center_of_mass_world(),
        })
    }
}
