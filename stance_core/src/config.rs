// stance_core/src/config.rs

//! Serde-deserializable estimator configuration.

use nalgebra::{Isometry3, Matrix3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::utils::matrix::is_positive_definite3;

// =========================================================================
// == Noise ==
// =========================================================================

/// A validated 3x3 noise covariance: finite, symmetric and positive definite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseCovariance(Matrix3<f64>);

impl NoiseCovariance {
    /// Validates a dense covariance. `name` is only used in the error.
    pub fn new(name: &str, covariance: Matrix3<f64>) -> Result<Self, ConfigError> {
        if !is_positive_definite3(&covariance) {
            return Err(ConfigError::NoiseNotPositiveDefinite {
                name: name.to_string(),
            });
        }
        Ok(Self(covariance))
    }

    /// Isotropic noise with standard deviation `std_dev` on every axis.
    pub fn from_std_dev(name: &str, std_dev: f64) -> Result<Self, ConfigError> {
        Self::from_std_devs(name, [std_dev; 3])
    }

    /// Diagonal noise from per-axis standard deviations.
    pub fn from_std_devs(name: &str, std_devs: [f64; 3]) -> Result<Self, ConfigError> {
        let variances = Vector3::from(std_devs).map(|s| s * s);
        Self::new(name, Matrix3::from_diagonal(&variances))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }
}

/// Noise as written in configuration files.
///
/// ```toml
/// noise = 0.01                       # isotropic standard deviation
/// noise = [0.01, 0.01, 0.02]         # per-axis standard deviations
/// noise = [[1e-4, 0, 0], [0, 1e-4, 0], [0, 0, 4e-4]]  # full covariance
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NoiseSpec {
    StdDev(f64),
    StdDevs([f64; 3]),
    /// Row-major covariance matrix.
    Covariance([[f64; 3]; 3]),
}

impl NoiseSpec {
    pub fn to_covariance(&self, name: &str) -> Result<NoiseCovariance, ConfigError> {
        match self {
            NoiseSpec::StdDev(s) => NoiseCovariance::from_std_dev(name, *s),
            NoiseSpec::StdDevs(s) => NoiseCovariance::from_std_devs(name, *s),
            NoiseSpec::Covariance(rows) => {
                let flat: Vec<f64> = rows.iter().flatten().copied().collect();
                NoiseCovariance::new(name, Matrix3::from_row_slice(&flat))
            }
        }
    }
}

// =========================================================================
// == Estimator Parameters ==
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EstimatorParameters {
    /// Control period in seconds.
    pub control_dt: f64,
    /// Body whose pose the filter estimates directly. Defaults to the root.
    pub estimation_body: Option<String>,
    /// Drives both the angular velocity and angular acceleration blocks.
    pub angular_acceleration_noise: NoiseSpec,
    /// Drives both the CoM velocity and CoM acceleration blocks.
    pub com_acceleration_noise: NoiseSpec,
    /// Steady-state Riccati iterations run before the first tick.
    pub riccati_iterations: usize,
    /// Scale applied to the steady-state covariance before first use.
    pub covariance_inflation: f64,
}

impl Default for EstimatorParameters {
    fn default() -> Self {
        Self {
            control_dt: 0.005,
            estimation_body: None,
            angular_acceleration_noise: NoiseSpec::StdDev(1.0),
            com_acceleration_noise: NoiseSpec::StdDev(1.0),
            riccati_iterations: 50,
            covariance_inflation: 100.0,
        }
    }
}

impl EstimatorParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.control_dt.is_finite() && self.control_dt > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "control_dt",
                reason: format!("must be positive, got {}", self.control_dt),
            });
        }
        if self.riccati_iterations == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "riccati_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.covariance_inflation.is_finite() && self.covariance_inflation >= 1.0) {
            return Err(ConfigError::InvalidParameter {
                name: "covariance_inflation",
                reason: format!("must be >= 1, got {}", self.covariance_inflation),
            });
        }
        Ok(())
    }
}

// =========================================================================
// == Sensors ==
// =========================================================================

fn default_gravity() -> f64 {
    9.81
}

/// Every configured sensor. `kind = "..."` selects the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
#[serde(rename_all = "PascalCase")]
pub enum SensorConfiguration {
    Orientation(OrientationSensorConfiguration),
    AngularVelocity(AngularVelocitySensorConfiguration),
    LinearAcceleration(LinearAccelerationSensorConfiguration),
    PointVelocity(PointSensorConfiguration),
    PointPosition(PointSensorConfiguration),
}

impl SensorConfiguration {
    pub fn name(&self) -> &str {
        match self {
            SensorConfiguration::Orientation(c) => &c.name,
            SensorConfiguration::AngularVelocity(c) => &c.name,
            SensorConfiguration::LinearAcceleration(c) => &c.name,
            SensorConfiguration::PointVelocity(c) | SensorConfiguration::PointPosition(c) => &c.name,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            SensorConfiguration::Orientation(_) => "Orientation",
            SensorConfiguration::AngularVelocity(_) => "AngularVelocity",
            SensorConfiguration::LinearAcceleration(_) => "LinearAcceleration",
            SensorConfiguration::PointVelocity(_) => "PointVelocity",
            SensorConfiguration::PointPosition(_) => "PointPosition",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrientationSensorConfiguration {
    pub name: String,
    /// Name of the body the sensor is rigidly attached to.
    pub body: String,
    /// Measurement frame relative to the body frame.
    #[serde(default)]
    pub mounting: Pose,
    pub noise: NoiseSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AngularVelocitySensorConfiguration {
    pub name: String,
    pub body: String,
    #[serde(default)]
    pub mounting: Pose,
    pub noise: NoiseSpec,
    /// When present, a bias block with this random-walk noise is estimated.
    #[serde(default)]
    pub bias_noise: Option<NoiseSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearAccelerationSensorConfiguration {
    pub name: String,
    pub body: String,
    #[serde(default)]
    pub mounting: Pose,
    pub noise: NoiseSpec,
    #[serde(default)]
    pub bias_noise: Option<NoiseSpec>,
    /// Magnitude of gravity along world +z; must be non-negative.
    #[serde(default = "default_gravity")]
    pub gravity_z: f64,
}

/// Point sensors carry their body and point with every sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PointSensorConfiguration {
    pub name: String,
    pub noise: NoiseSpec,
}

// =========================================================================
// == Helper Structs for Nested Configuration ==
// =========================================================================

/// A rigid transform written as a translation plus roll/pitch/yaw in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pose {
    #[serde(with = "serde_helpers::vec3_from_array", default)]
    pub translation: Vector3<f64>,
    #[serde(with = "serde_helpers::quat_from_euler_deg", default)]
    pub rotation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.translation), self.rotation)
    }
}

pub mod serde_helpers {
    pub mod vec3_from_array {
        use nalgebra::Vector3;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(vec: &Vector3<f64>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.collect_seq([vec.x, vec.y, vec.z].iter())
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Vector3<f64>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let arr: [f64; 3] = Deserialize::deserialize(deserializer)?;
            Ok(Vector3::from(arr))
        }
    }

    pub mod quat_from_euler_deg {
        use nalgebra::UnitQuaternion;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(quat: &UnitQuaternion<f64>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let (roll, pitch, yaw) = quat.euler_angles();
            let arr = [roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()];
            serializer.collect_seq(arr.iter())
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<UnitQuaternion<f64>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let arr: [f64; 3] = Deserialize::deserialize(deserializer)?;
            Ok(UnitQuaternion::from_euler_angles(
                arr[0].to_radians(), // Roll
                arr[1].to_radians(), // Pitch
                arr[2].to_radians(), // Yaw
            ))
        }
    }
}
