// stance_sim/src/simulation/sensors.rs

use nalgebra::{UnitQuaternion, Vector3};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use stance_core::config::SensorConfiguration;
use stance_core::kinematics::{KinematicTree, RigidBodyTree};
use stance_core::messages::{JointReading, ProcessInputs, SensorReadings, SensorSample};
use stance_core::types::{BodyId, JointState, SensorId};

use super::config::SensorNoiseConfig;
use super::prng::SimulationRng;
use super::trajectory::GroundTruth;
use super::SimulationError;

/// Isotropic zero-mean Gaussian noise on a 3-vector.
#[derive(Debug, Clone, Copy)]
struct VectorNoise([Normal<f64>; 3]);

impl VectorNoise {
    fn new(std_dev: f64, what: &str) -> Result<Self, SimulationError> {
        let normal = Normal::new(0.0, std_dev)
            .map_err(|e| SimulationError::InvalidScenario(format!("{what} noise: {e}")))?;
        Ok(Self([normal; 3]))
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> Vector3<f64> {
        Vector3::new(self.0[0].sample(rng), self.0[1].sample(rng), self.0[2].sample(rng))
    }
}

/// One configured sensor with everything needed to fake its output.
#[derive(Debug, Clone)]
enum SyntheticSensor {
    Orientation { id: SensorId, body: BodyId, mounting: UnitQuaternion<f64> },
    AngularVelocity { id: SensorId, body: BodyId, mounting: UnitQuaternion<f64> },
    LinearAcceleration {
        id: SensorId,
        body: BodyId,
        mounting: UnitQuaternion<f64>,
        offset: Vector3<f64>,
        gravity_z: f64,
    },
    PointVelocity { id: SensorId },
    PointPosition { id: SensorId },
}

/// Turns ground truth into noisy sensor readings, joint readings and process
/// inputs, all drawn from one seeded generator.
pub struct SensorSynthesizer {
    sensors: Vec<SyntheticSensor>,
    contact_body: BodyId,
    contact_point: Vector3<f64>,
    gyro_bias: Vector3<f64>,
    accel_bias: Vector3<f64>,
    point_dropout: f64,
    orientation_noise: VectorNoise,
    gyro_noise: VectorNoise,
    accel_noise: VectorNoise,
    point_velocity_noise: VectorNoise,
    point_position_noise: VectorNoise,
    input_noise: VectorNoise,
    encoder_position_noise: Normal<f64>,
    encoder_velocity_noise: Normal<f64>,
    rng: SimulationRng,
}

impl SensorSynthesizer {
    /// `sensors` must be in the order they were registered with the estimator,
    /// so that list position equals `SensorId`.
    pub fn new(
        sensors: &[SensorConfiguration],
        noise: &SensorNoiseConfig,
        tree: &RigidBodyTree,
        rng: SimulationRng,
    ) -> Result<Self, SimulationError> {
        let resolve = |name: &str| {
            tree.find_body(name)
                .ok_or_else(|| SimulationError::InvalidScenario(format!("unknown body '{name}'")))
        };

        let mut synthetic = Vec::with_capacity(sensors.len());
        for (index, sensor) in sensors.iter().enumerate() {
            let id = SensorId(index);
            synthetic.push(match sensor {
                SensorConfiguration::Orientation(c) => SyntheticSensor::Orientation {
                    id,
                    body: resolve(&c.body)?,
                    mounting: c.mounting.rotation,
                },
                SensorConfiguration::AngularVelocity(c) => SyntheticSensor::AngularVelocity {
                    id,
                    body: resolve(&c.body)?,
                    mounting: c.mounting.rotation,
                },
                SensorConfiguration::LinearAcceleration(c) => SyntheticSensor::LinearAcceleration {
                    id,
                    body: resolve(&c.body)?,
                    mounting: c.mounting.rotation,
                    offset: c.mounting.translation,
                    gravity_z: c.gravity_z,
                },
                SensorConfiguration::PointVelocity(_) => SyntheticSensor::PointVelocity { id },
                SensorConfiguration::PointPosition(_) => SyntheticSensor::PointPosition { id },
            });
        }

        let scalar = |std_dev: f64, what: &str| {
            Normal::new(0.0, std_dev).map_err(|e| SimulationError::InvalidScenario(format!("{what} noise: {e}")))
        };

        Ok(Self {
            sensors: synthetic,
            contact_body: resolve(&noise.contact_body)?,
            contact_point: noise.contact_point,
            gyro_bias: noise.gyro_bias,
            accel_bias: noise.accel_bias,
            point_dropout: noise.point_dropout,
            orientation_noise: VectorNoise::new(noise.orientation_std, "orientation")?,
            gyro_noise: VectorNoise::new(noise.gyro_std, "gyro")?,
            accel_noise: VectorNoise::new(noise.accel_std, "accelerometer")?,
            point_velocity_noise: VectorNoise::new(noise.point_velocity_std, "point velocity")?,
            point_position_noise: VectorNoise::new(noise.point_position_std, "point position")?,
            input_noise: VectorNoise::new(noise.input_std, "input")?,
            encoder_position_noise: scalar(noise.encoder_position_std, "encoder position")?,
            encoder_velocity_noise: scalar(noise.encoder_velocity_std, "encoder velocity")?,
            rng,
        })
    }

    /// Samples every sensor from `tree`, which must already be posed at the
    /// ground truth of this tick.
    pub fn readings(&mut self, tree: &RigidBodyTree) -> Result<SensorReadings, SimulationError> {
        let mut readings = SensorReadings::new();
        let rng = &mut self.rng.0;

        for sensor in &self.sensors {
            match *sensor {
                SyntheticSensor::Orientation { id, body, mounting } => {
                    let truth = tree.body_motion(body)?.pose.rotation * mounting;
                    let error = UnitQuaternion::from_scaled_axis(self.orientation_noise.sample(rng));
                    readings.insert(id, SensorSample::Orientation(truth * error));
                }
                SyntheticSensor::AngularVelocity { id, body, mounting } => {
                    let motion = tree.body_motion(body)?;
                    let world_to_sensor = (motion.pose.rotation * mounting).inverse();
                    let measured =
                        world_to_sensor * motion.angular_velocity + self.gyro_bias + self.gyro_noise.sample(rng);
                    readings.insert(id, SensorSample::AngularVelocity(measured));
                }
                SyntheticSensor::LinearAcceleration {
                    id,
                    body,
                    mounting,
                    offset,
                    gravity_z,
                } => {
                    let motion = tree.body_motion(body)?;
                    let point = motion.point_motion(&offset);
                    let world_to_sensor = (motion.pose.rotation * mounting).inverse();
                    let specific_force = world_to_sensor * (point.acceleration + Vector3::z() * gravity_z);
                    let measured = specific_force + self.accel_bias + self.accel_noise.sample(rng);
                    readings.insert(id, SensorSample::LinearAcceleration(measured));
                }
                SyntheticSensor::PointVelocity { id } => {
                    if rng.gen::<f64>() < self.point_dropout {
                        continue;
                    }
                    let point = tree.body_motion(self.contact_body)?.point_motion(&self.contact_point);
                    readings.insert(
                        id,
                        SensorSample::PointVelocity {
                            body: self.contact_body,
                            point: self.contact_point,
                            velocity: point.velocity + self.point_velocity_noise.sample(rng),
                        },
                    );
                }
                SyntheticSensor::PointPosition { id } => {
                    if rng.gen::<f64>() < self.point_dropout {
                        continue;
                    }
                    let point = tree.body_motion(self.contact_body)?.point_motion(&self.contact_point);
                    readings.insert(
                        id,
                        SensorSample::PointPosition {
                            body: self.contact_body,
                            point: self.contact_point,
                            position: point.position + self.point_position_noise.sample(rng),
                        },
                    );
                }
            }
        }
        Ok(readings)
    }

    /// Encoder samples. The desired acceleration is passed through exactly.
    pub fn joint_readings(&mut self, truth: &GroundTruth) -> Vec<JointReading> {
        let rng = &mut self.rng.0;
        truth
            .joints
            .iter()
            .map(|&(joint, state)| JointReading {
                joint,
                state: JointState::new(
                    state.position + self.encoder_position_noise.sample(rng),
                    state.velocity + self.encoder_velocity_noise.sample(rng),
                    state.acceleration,
                ),
            })
            .collect()
    }

    /// Commanded accelerations: the true ones plus noise.
    pub fn process_inputs(&mut self, truth: &GroundTruth) -> ProcessInputs {
        let rng = &mut self.rng.0;
        ProcessInputs {
            desired_angular_acceleration: truth.angular_acceleration + self.input_noise.sample(rng),
            desired_com_acceleration: truth.com.acceleration + self.input_noise.sample(rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::config::ScenarioConfig;
    use crate::simulation::robot::DemoBiped;
    use approx::assert_relative_eq;

    #[test]
    fn test_noiseless_static_imu_reads_gravity() {
        let config = ScenarioConfig::default();
        let noise = SensorNoiseConfig {
            orientation_std: 0.0,
            gyro_std: 0.0,
            gyro_bias: Vector3::zeros(),
            accel_std: 0.0,
            point_dropout: 0.0,
            point_velocity_std: 0.0,
            point_position_std: 0.0,
            ..Default::default()
        };
        let robot = DemoBiped::new().unwrap();
        let mut synthesizer =
            SensorSynthesizer::new(&config.sensors, &noise, &robot.tree, SimulationRng::new(Some(1))).unwrap();

        let readings = synthesizer.readings(&robot.tree).unwrap();
        assert_eq!(readings.len(), config.sensors.len());
        match readings.get(SensorId(2)) {
            Some(SensorSample::LinearAcceleration(f)) => {
                assert_relative_eq!(*f, Vector3::new(0.0, 0.0, 9.81), epsilon = 1e-12)
            }
            other => panic!("unexpected sample {other:?}"),
        }
        match readings.get(SensorId(1)) {
            Some(SensorSample::AngularVelocity(w)) => assert_relative_eq!(*w, Vector3::zeros(), epsilon = 1e-12),
            other => panic!("unexpected sample {other:?}"),
        }
    }

    #[test]
    fn test_full_dropout_removes_point_samples() {
        let config = ScenarioConfig::default();
        let noise = SensorNoiseConfig {
            point_dropout: 1.0,
            ..Default::default()
        };
        let robot = DemoBiped::new().unwrap();
        let mut synthesizer =
            SensorSynthesizer::new(&config.sensors, &noise, &robot.tree, SimulationRng::new(Some(1))).unwrap();
        let readings = synthesizer.readings(&robot.tree).unwrap();
        assert!(readings.get(SensorId(3)).is_none());
        assert!(readings.get(SensorId(4)).is_none());
        assert_eq!(readings.len(), 3);
    }
}
