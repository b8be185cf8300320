// stance_core/src/messages.rs

use nalgebra::{UnitQuaternion, Vector3};
use std::collections::HashMap;

use crate::types::{BodyId, JointId, JointState, SensorId};

// =========================================================================
// == Per-Tick Inputs ==
// =========================================================================

/// One raw sample, in the sensor's own measurement frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorSample {
    Orientation(UnitQuaternion<f64>),
    AngularVelocity(Vector3<f64>),
    LinearAcceleration(Vector3<f64>),
    /// World-frame velocity of a point fixed on `body`.
    PointVelocity {
        body: BodyId,
        point: Vector3<f64>,
        velocity: Vector3<f64>,
    },
    /// World-frame position of a point fixed on `body`.
    PointPosition {
        body: BodyId,
        point: Vector3<f64>,
        position: Vector3<f64>,
    },
}

impl SensorSample {
    pub fn kind_str(&self) -> &'static str {
        match self {
            SensorSample::Orientation(_) => "Orientation",
            SensorSample::AngularVelocity(_) => "AngularVelocity",
            SensorSample::LinearAcceleration(_) => "LinearAcceleration",
            SensorSample::PointVelocity { .. } => "PointVelocity",
            SensorSample::PointPosition { .. } => "PointPosition",
        }
    }
}

/// The samples available this tick. A sensor without an entry is excluded
/// from the correction for this tick.
#[derive(Debug, Clone, Default)]
pub struct SensorReadings {
    samples: HashMap<SensorId, SensorSample>,
}

impl SensorReadings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sensor: SensorId, sample: SensorSample) {
        self.samples.insert(sensor, sample);
    }

    pub fn with(mut self, sensor: SensorId, sample: SensorSample) -> Self {
        self.insert(sensor, sample);
        self
    }

    pub fn get(&self, sensor: SensorId) -> Option<&SensorSample> {
        self.samples.get(&sensor)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A joint encoder sample with the desired acceleration from the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointReading {
    pub joint: JointId,
    pub state: JointState,
}

/// Commanded accelerations feeding the process model.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProcessInputs {
    /// Desired angular acceleration of the estimation frame, in that frame.
    pub desired_angular_acceleration: Vector3<f64>,
    /// Desired center of mass acceleration, in world.
    pub desired_com_acceleration: Vector3<f64>,
}
