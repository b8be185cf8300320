// stance_core/src/state.rs

use nalgebra::{DMatrix, DVector, UnitQuaternion, Vector3};
use std::ops::Range;

use crate::error::ConfigError;
use crate::types::BlockId;
use crate::utils::so3;

/// Every block of this estimator is a 3-vector in the flat state.
pub const BLOCK_DIM: usize = 3;

/// The physical meaning of a state block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Rotation from the estimation frame to world, stored as a rotation vector.
    Orientation,
    /// Estimation-frame angular velocity.
    AngularVelocity,
    /// Estimation-frame angular acceleration.
    AngularAcceleration,
    /// World-frame center of mass position.
    CenterOfMassPosition,
    /// World-frame center of mass velocity.
    CenterOfMassVelocity,
    /// World-frame center of mass acceleration.
    CenterOfMassAcceleration,
    /// A sensor offset, expressed in that sensor's measurement frame.
    SensorBias,
}

impl BlockKind {
    /// Orientation lives on a manifold; all other blocks are Euclidean.
    pub fn is_multiplicative(self) -> bool {
        matches!(self, BlockKind::Orientation)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateBlock {
    pub name: String,
    pub kind: BlockKind,
    pub range: Range<usize>,
}

/// The ordered schema of the state vector.
///
/// Blocks are appended in registration order and occupy contiguous, disjoint
/// index ranges. The layout only grows while the estimator is being built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateLayout {
    blocks: Vec<StateBlock>,
}

impl StateLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a block and returns its id. Block names must be unique.
    pub fn add_block(&mut self, name: impl Into<String>, kind: BlockKind) -> Result<BlockId, ConfigError> {
        let name = name.into();
        if self.find(&name).is_some() {
            return Err(ConfigError::DuplicateBlock(name));
        }
        let start = self.dim();
        self.blocks.push(StateBlock {
            name,
            kind,
            range: start..start + BLOCK_DIM,
        });
        Ok(BlockId(self.blocks.len() - 1))
    }

    /// Total length of the state vector.
    pub fn dim(&self) -> usize {
        self.blocks.last().map_or(0, |b| b.range.end)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, id: BlockId) -> bool {
        id.0 < self.blocks.len()
    }

    /// # Panics
    /// If `id` was not produced by this layout.
    pub fn block(&self, id: BlockId) -> &StateBlock {
        &self.blocks[id.0]
    }

    pub fn offset(&self, id: BlockId) -> usize {
        self.blocks[id.0].range.start
    }

    pub fn name(&self, id: BlockId) -> &str {
        &self.blocks[id.0].name
    }

    pub fn find(&self, name: &str) -> Option<BlockId> {
        self.blocks.iter().position(|b| b.name == name).map(BlockId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &StateBlock)> {
        self.blocks.iter().enumerate().map(|(i, b)| (BlockId(i), b))
    }
}

/// The filter state: layout, mean and covariance, bundled together.
#[derive(Debug, Clone)]
pub struct GlobalState {
    /// The ordered "schema" of the state vector.
    pub layout: StateLayout,
    /// The numerical mean `x`.
    pub vector: DVector<f64>,
    /// The covariance `P` of the tangent-space error.
    pub covariance: DMatrix<f64>,
    /// Time of the last predict, in seconds.
    pub last_update_timestamp: f64,
}

impl GlobalState {
    /// Zero mean (identity orientation) and identity covariance.
    pub fn new(layout: StateLayout) -> Self {
        let dim = layout.dim();
        Self {
            layout,
            vector: DVector::zeros(dim),
            covariance: DMatrix::identity(dim, dim),
            last_update_timestamp: 0.0,
        }
    }

    pub fn dim(&self) -> usize {
        self.layout.dim()
    }

    pub fn vector3(&self, id: BlockId) -> Vector3<f64> {
        let offset = self.layout.offset(id);
        self.vector.fixed_rows::<3>(offset).into_owned()
    }

    pub fn set_vector3(&mut self, id: BlockId, value: &Vector3<f64>) {
        let offset = self.layout.offset(id);
        self.vector.fixed_rows_mut::<3>(offset).copy_from(value);
    }

    /// Reads an Orientation block as a unit quaternion.
    pub fn orientation(&self, id: BlockId) -> UnitQuaternion<f64> {
        so3::exp(&self.vector3(id))
    }

    pub fn set_orientation(&mut self, id: BlockId, rotation: &UnitQuaternion<f64>) {
        self.set_vector3(id, &so3::log(rotation));
    }

    /// Applies a tangent-space increment to one block: multiplicative on the
    /// right for orientation, additive otherwise.
    pub fn perturb(&mut self, id: BlockId, delta: &Vector3<f64>) {
        if self.layout.block(id).kind.is_multiplicative() {
            let rotation = so3::retract(&self.orientation(id), delta);
            self.set_orientation(id, &rotation);
        } else {
            let value = self.vector3(id) + delta;
            self.set_vector3(id, &value);
        }
    }

    /// The `BLOCK_DIM` slice of a full-length increment belonging to `id`.
    pub fn block_slice(&self, id: BlockId, full: &DVector<f64>) -> Vector3<f64> {
        full.fixed_rows::<3>(self.layout.offset(id)).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn layout() -> StateLayout {
        let mut layout = StateLayout::new();
        layout.add_block("orientation", BlockKind::Orientation).unwrap();
        layout.add_block("angular_velocity", BlockKind::AngularVelocity).unwrap();
        layout.add_block("com_position", BlockKind::CenterOfMassPosition).unwrap();
        layout.add_block("imu_bias", BlockKind::SensorBias).unwrap();
        layout
    }

    #[test]
    fn test_block_ranges_are_contiguous_and_disjoint() {
        let layout = layout();
        let total: usize = layout.iter().map(|(_, b)| b.range.len()).sum();
        assert_eq!(total, layout.dim());

        let mut next = 0;
        for (_, block) in layout.iter() {
            assert_eq!(block.range.start, next);
            next = block.range.end;
        }
        for (a, ba) in layout.iter() {
            for (b, bb) in layout.iter() {
                if a != b {
                    assert!(ba.range.end <= bb.range.start || bb.range.end <= ba.range.start);
                }
            }
        }
    }

    #[test]
    fn test_duplicate_block_is_rejected() {
        let mut layout = layout();
        assert!(matches!(
            layout.add_block("imu_bias", BlockKind::SensorBias),
            Err(ConfigError::DuplicateBlock(_))
        ));
    }

    #[test]
    fn test_perturb_orientation_is_multiplicative() {
        let layout = layout();
        let orientation = layout.find("orientation").unwrap();
        let mut state = GlobalState::new(layout);

        let q0 = UnitQuaternion::from_euler_angles(0.3, 0.1, -0.5);
        state.set_orientation(orientation, &q0);
        let delta = Vector3::new(0.02, 0.0, -0.01);
        state.perturb(orientation, &delta);

        let expected = q0 * UnitQuaternion::from_scaled_axis(delta);
        assert_relative_eq!(state.orientation(orientation).angle_to(&expected), 0.0, epsilon = 1e-12);
        assert_relative_eq!(state.orientation(orientation).quaternion().norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_perturb_vector_is_additive() {
        let layout = layout();
        let bias = layout.find("imu_bias").unwrap();
        let mut state = GlobalState::new(layout);
        state.set_vector3(bias, &Vector3::new(1.0, 2.0, 3.0));
        state.perturb(bias, &Vector3::new(0.5, 0.5, 0.5));
        assert_relative_eq!(state.vector3(bias), Vector3::new(1.5, 2.5, 3.5));
    }
}
