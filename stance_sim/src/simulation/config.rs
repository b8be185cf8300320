// stance_sim/src/simulation/config.rs

use std::path::Path;

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use stance_core::config::{
    serde_helpers, AngularVelocitySensorConfiguration, EstimatorParameters, LinearAccelerationSensorConfiguration,
    NoiseSpec, OrientationSensorConfiguration, PointSensorConfiguration, Pose, SensorConfiguration,
};

use super::SimulationError;

// =========================================================================
// == Top-Level Scenario ==
// =========================================================================

/// Everything one evaluation run needs. Parsed from a scenario TOML file laid
/// over `ScenarioConfig::default()`, so a file only lists what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub simulation: SimulationSection,
    #[serde(default)]
    pub trajectory: TrajectoryConfig,
    #[serde(default)]
    pub noise: SensorNoiseConfig,
    #[serde(default)]
    pub estimator: EstimatorParameters,
    /// The estimator's sensor list. Samples are synthesized for every entry.
    #[serde(default)]
    pub sensors: Vec<SensorConfiguration>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationSection::default(),
            trajectory: TrajectoryConfig::default(),
            noise: SensorNoiseConfig::default(),
            estimator: EstimatorParameters {
                estimation_body: Some("torso".to_string()),
                angular_acceleration_noise: NoiseSpec::StdDev(0.5),
                com_acceleration_noise: NoiseSpec::StdDev(0.5),
                ..Default::default()
            },
            sensors: default_sensors(),
        }
    }
}

impl ScenarioConfig {
    /// Loads `path` on top of the built-in defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimulationError> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(self.simulation.duration_seconds.is_finite() && self.simulation.duration_seconds > 0.0) {
            return Err(SimulationError::InvalidScenario(format!(
                "duration_seconds must be positive, got {}",
                self.simulation.duration_seconds
            )));
        }
        if !(0.0..=1.0).contains(&self.noise.point_dropout) {
            return Err(SimulationError::InvalidScenario(format!(
                "point_dropout must be a probability, got {}",
                self.noise.point_dropout
            )));
        }
        self.estimator.validate()?;
        Ok(())
    }

    pub fn tick_count(&self) -> usize {
        (self.simulation.duration_seconds / self.estimator.control_dt).round() as usize
    }
}

// =========================================================================
// == Sections ==
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SimulationSection {
    /// Seed for the noise generator. A fresh seed is drawn when absent.
    pub seed: Option<u64>,
    pub duration_seconds: f64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            seed: Some(7),
            duration_seconds: 10.0,
        }
    }
}

/// Analytic ground-truth motion of the demo biped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TrajectoryConfig {
    /// Fixed axis the pelvis rotates about, in world. Normalized on use.
    #[serde(with = "serde_helpers::vec3_from_array")]
    pub rotation_axis: Vector3<f64>,
    /// Constant part of the rotation rate, rad/s.
    pub rotation_rate: f64,
    /// Amplitude of the oscillating part of the rotation angle, rad.
    pub rotation_amplitude: f64,
    /// Frequency of the oscillating part, rad/s.
    pub rotation_frequency: f64,
    /// Pelvis position at rest, world.
    #[serde(with = "serde_helpers::vec3_from_array")]
    pub base_position: Vector3<f64>,
    /// Per-axis amplitude of the sinusoidal pelvis translation, m.
    #[serde(with = "serde_helpers::vec3_from_array")]
    pub translation_amplitude: Vector3<f64>,
    /// Frequency of the pelvis translation, rad/s.
    pub translation_frequency: f64,
    /// Amplitude of every joint's oscillation, rad.
    pub joint_amplitude: f64,
    /// Frequency of every joint's oscillation, rad/s.
    pub joint_frequency: f64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            rotation_axis: Vector3::new(0.2, 0.1, 1.0),
            rotation_rate: 0.3,
            rotation_amplitude: 0.2,
            rotation_frequency: 2.0,
            base_position: Vector3::new(0.0, 0.0, 0.9),
            translation_amplitude: Vector3::new(0.1, 0.05, 0.02),
            translation_frequency: 1.5,
            joint_amplitude: 0.3,
            joint_frequency: 3.0,
        }
    }
}

/// Noise applied while synthesizing samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SensorNoiseConfig {
    /// Rotation-vector standard deviation of orientation samples, rad.
    pub orientation_std: f64,
    pub gyro_std: f64,
    /// Constant gyro bias in the measurement frame, rad/s.
    #[serde(with = "serde_helpers::vec3_from_array")]
    pub gyro_bias: Vector3<f64>,
    pub accel_std: f64,
    #[serde(with = "serde_helpers::vec3_from_array")]
    pub accel_bias: Vector3<f64>,
    pub point_velocity_std: f64,
    pub point_position_std: f64,
    /// Probability that a point sample is missing on a given tick.
    pub point_dropout: f64,
    /// Body carrying the point that point sensors observe.
    pub contact_body: String,
    /// The observed point in `contact_body` coordinates.
    #[serde(with = "serde_helpers::vec3_from_array")]
    pub contact_point: Vector3<f64>,
    pub encoder_position_std: f64,
    pub encoder_velocity_std: f64,
    /// Noise on the commanded accelerations fed to the process model.
    pub input_std: f64,
}

impl Default for SensorNoiseConfig {
    fn default() -> Self {
        Self {
            orientation_std: 0.005,
            gyro_std: 0.01,
            gyro_bias: Vector3::new(0.01, -0.02, 0.005),
            accel_std: 0.05,
            accel_bias: Vector3::zeros(),
            point_velocity_std: 0.02,
            point_position_std: 0.01,
            point_dropout: 0.2,
            contact_body: "left_foot".to_string(),
            contact_point: Vector3::new(0.05, 0.0, -0.05),
            encoder_position_std: 1e-4,
            encoder_velocity_std: 1e-3,
            input_std: 0.05,
        }
    }
}

/// A pelvis IMU plus point velocity and position on the contact foot.
fn default_sensors() -> Vec<SensorConfiguration> {
    vec![
        SensorConfiguration::Orientation(OrientationSensorConfiguration {
            name: "pelvis_imu_orientation".to_string(),
            body: "pelvis".to_string(),
            mounting: Pose::default(),
            noise: NoiseSpec::StdDev(0.005),
        }),
        SensorConfiguration::AngularVelocity(AngularVelocitySensorConfiguration {
            name: "pelvis_imu_gyro".to_string(),
            body: "pelvis".to_string(),
            mounting: Pose::default(),
            noise: NoiseSpec::StdDev(0.01),
            bias_noise: Some(NoiseSpec::StdDev(1e-3)),
        }),
        SensorConfiguration::LinearAcceleration(LinearAccelerationSensorConfiguration {
            name: "pelvis_imu_accel".to_string(),
            body: "pelvis".to_string(),
            mounting: Pose::default(),
            noise: NoiseSpec::StdDev(0.05),
            bias_noise: None,
            gravity_z: 9.81,
        }),
        SensorConfiguration::PointVelocity(PointSensorConfiguration {
            name: "left_foot_velocity".to_string(),
            noise: NoiseSpec::StdDev(0.02),
        }),
        SensorConfiguration::PointPosition(PointSensorConfiguration {
            name: "left_foot_position".to_string(),
            noise: NoiseSpec::StdDev(0.01),
        }),
    ]
}
