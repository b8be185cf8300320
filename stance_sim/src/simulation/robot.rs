// stance_sim/src/simulation/robot.rs

use nalgebra::{Isometry3, Vector3};
use stance_core::error::KinematicsError;
use stance_core::kinematics::{JointKind, KinematicTree, RigidBodyTree};
use stance_core::types::{BodyId, JointId};

/// A planar-legged demo biped: pelvis root, a torso on a yawing waist, and
/// two legs with pitching hip, knee and ankle.
#[derive(Debug, Clone)]
pub struct DemoBiped {
    pub tree: RigidBodyTree,
    /// Every actuated joint, in the order trajectories are generated for.
    pub joints: Vec<JointId>,
    pub torso: BodyId,
}

impl DemoBiped {
    pub fn new() -> Result<Self, KinematicsError> {
        let mut tree = RigidBodyTree::new("pelvis", 10.0, Vector3::new(0.0, 0.0, 0.02));
        let pelvis = tree.root_body();
        let mut joints = Vec::new();

        let (torso, waist) = tree.add_body(
            pelvis,
            "torso",
            JointKind::Revolute(Vector3::z_axis()),
            Isometry3::translation(0.0, 0.0, 0.1),
            20.0,
            Vector3::new(0.02, 0.0, 0.25),
        )?;
        joints.extend(waist);

        for (side, y) in [("left", 0.1), ("right", -0.1)] {
            let (thigh, hip) = tree.add_body(
                pelvis,
                &format!("{side}_thigh"),
                JointKind::Revolute(Vector3::y_axis()),
                Isometry3::translation(0.0, y, -0.08),
                5.0,
                Vector3::new(0.0, 0.0, -0.2),
            )?;
            let (shin, knee) = tree.add_body(
                thigh,
                &format!("{side}_shin"),
                JointKind::Revolute(Vector3::y_axis()),
                Isometry3::translation(0.0, 0.0, -0.42),
                3.0,
                Vector3::new(0.0, 0.0, -0.2),
            )?;
            let (_, ankle) = tree.add_body(
                shin,
                &format!("{side}_foot"),
                JointKind::Revolute(Vector3::y_axis()),
                Isometry3::translation(0.0, 0.0, -0.42),
                1.0,
                Vector3::new(0.04, 0.0, -0.03),
            )?;
            joints.extend(hip);
            joints.extend(knee);
            joints.extend(ankle);
        }

        tree.update_frames();
        Ok(Self { tree, joints, torso })
    }
}
