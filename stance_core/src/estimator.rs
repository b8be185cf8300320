// stance_core/src/estimator.rs

use nalgebra::{DMatrix, DVector, UnitQuaternion, Vector3};
use serde::Serialize;
use tracing::info;

use crate::config::{EstimatorParameters, NoiseSpec, SensorConfiguration};
use crate::error::{ConfigError, EstimationError};
use crate::estimation::{EngineParameters, EstimationEngine, MeasurementModel, ProcessModel, TickReport};
use crate::kinematics::{joint_pass, EstimateBlocks, KinematicReconciler, KinematicTree};
use crate::messages::{JointReading, ProcessInputs, SensorReadings};
use crate::models::measurement::linear_acceleration::AccelerometerBlocks;
use crate::models::measurement::{
    AngularVelocitySensorElement, LinearAccelerationSensorElement, MeasurementElement, OrientationSensorElement,
    PointPositionSensorElement, PointVelocitySensorElement, SensorMount,
};
use crate::models::process::{
    AngularAccelerationElement, AngularVelocityElement, ComAccelerationElement, ComPositionElement,
    ComVelocityElement, OrientationElement, ProcessElement, SensorBiasElement,
};
use crate::state::{BlockKind, GlobalState, StateLayout};
use crate::types::{BlockId, BodyId, SensorId};

/// A read-only view of what the estimator did last tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EstimatorTelemetry {
    pub tick_count: u64,
    /// Names of the sensors used in the last correction.
    pub active_sensors: Vec<String>,
    pub innovation_norm: f64,
    pub covariance_trace: f64,
    pub initialized: bool,
    pub faulted: bool,
}

// =========================================================================
// == Builder ==
// =========================================================================

/// Collects the sensor list, then wires state, process model, measurement
/// model and kinematic reconciliation in one pass.
pub struct EstimatorBuilder<T: KinematicTree> {
    tree: T,
    parameters: EstimatorParameters,
    sensors: Vec<SensorConfiguration>,
}

impl<T: KinematicTree> EstimatorBuilder<T> {
    pub fn new(tree: T, parameters: EstimatorParameters) -> Self {
        Self {
            tree,
            parameters,
            sensors: Vec::new(),
        }
    }

    /// Registers a sensor. Sensor ids are handed out in insertion order.
    pub fn add_sensor(&mut self, sensor: SensorConfiguration) -> Result<SensorId, ConfigError> {
        if self.sensors.iter().any(|s| s.name() == sensor.name()) {
            return Err(ConfigError::DuplicateSensor(sensor.name().to_string()));
        }
        self.sensors.push(sensor);
        Ok(SensorId(self.sensors.len() - 1))
    }

    pub fn with_sensor(mut self, sensor: SensorConfiguration) -> Result<Self, ConfigError> {
        self.add_sensor(sensor)?;
        Ok(self)
    }

    pub fn build(self) -> Result<OrientationAndComEstimator<T>, ConfigError> {
        let Self {
            tree,
            parameters,
            sensors,
        } = self;
        parameters.validate()?;
        check_orientation_sources(&sensors)?;
        let estimation_body = resolve_estimation_body(&tree, &parameters)?;

        // --- State blocks, in a fixed order ---
        let mut layout = StateLayout::new();
        let orientation = layout.add_block("orientation", BlockKind::Orientation)?;
        let angular_velocity = layout.add_block("angular_velocity", BlockKind::AngularVelocity)?;
        let angular_acceleration = layout.add_block("angular_acceleration", BlockKind::AngularAcceleration)?;
        let com_position = layout.add_block("com_position", BlockKind::CenterOfMassPosition)?;
        let com_velocity = layout.add_block("com_velocity", BlockKind::CenterOfMassVelocity)?;
        let com_acceleration = layout.add_block("com_acceleration", BlockKind::CenterOfMassAcceleration)?;

        let angular_noise = parameters
            .angular_acceleration_noise
            .to_covariance("angular_acceleration_noise")?;
        let com_noise = parameters.com_acceleration_noise.to_covariance("com_acceleration_noise")?;

        let mut process_elements: Vec<ProcessElement> = vec![
            OrientationElement::new(orientation, angular_velocity).into(),
            AngularVelocityElement::new(angular_velocity, angular_noise).into(),
            AngularAccelerationElement::new(angular_acceleration, angular_noise).into(),
            ComPositionElement::new(com_position, com_velocity).into(),
            ComVelocityElement::new(com_velocity, com_noise).into(),
            ComAccelerationElement::new(com_acceleration, com_noise).into(),
        ];

        let blocks = EstimateBlocks {
            orientation,
            angular_velocity,
            angular_acceleration: Some(angular_acceleration),
            com_position,
            com_velocity,
            com_acceleration: Some(com_acceleration),
        };
        let wiring = SensorWiring {
            orientation,
            angular_velocity,
            com: Some(ComWiring {
                angular_acceleration,
                position: com_position,
                velocity: com_velocity,
                acceleration: com_acceleration,
            }),
        };
        let measurement_elements = sensors
            .iter()
            .map(|sensor| wiring.element(sensor, &tree, &mut layout, &mut process_elements))
            .collect::<Result<Vec<_>, _>>()?;

        let mut engine = assemble_engine(layout, process_elements, measurement_elements, estimation_body, &parameters)?;
        let reconciler = KinematicReconciler::new(estimation_body, blocks);
        engine.add_hook(Box::new(reconciler.clone()));

        info!(
            blocks = engine.state().layout.len(),
            dim = engine.state().dim(),
            sensors = sensors.len(),
            dt = parameters.control_dt,
            "built orientation and center-of-mass estimator"
        );

        Ok(OrientationAndComEstimator {
            engine,
            tree,
            reconciler,
            blocks,
            sensor_names: sensors.iter().map(|s| s.name().to_string()).collect(),
            telemetry: EstimatorTelemetry::default(),
        })
    }

    /// Builds an estimator of orientation and angular velocity only. Accepts
    /// orientation and angular velocity sensors; the tree's root is never
    /// moved, only its joints.
    pub fn build_orientation(self) -> Result<OrientationEstimator<T>, ConfigError> {
        let Self {
            tree,
            parameters,
            sensors,
        } = self;
        parameters.validate()?;
        check_orientation_sources(&sensors)?;
        let estimation_body = resolve_estimation_body(&tree, &parameters)?;

        let mut layout = StateLayout::new();
        let orientation = layout.add_block("orientation", BlockKind::Orientation)?;
        let angular_velocity = layout.add_block("angular_velocity", BlockKind::AngularVelocity)?;
        let angular_noise = parameters
            .angular_acceleration_noise
            .to_covariance("angular_acceleration_noise")?;

        let mut process_elements: Vec<ProcessElement> = vec![
            OrientationElement::new(orientation, angular_velocity).into(),
            AngularVelocityElement::new(angular_velocity, angular_noise).into(),
        ];

        let wiring = SensorWiring {
            orientation,
            angular_velocity,
            com: None,
        };
        let measurement_elements = sensors
            .iter()
            .map(|sensor| wiring.element(sensor, &tree, &mut layout, &mut process_elements))
            .collect::<Result<Vec<_>, _>>()?;

        let engine = assemble_engine(layout, process_elements, measurement_elements, estimation_body, &parameters)?;

        info!(
            blocks = engine.state().layout.len(),
            dim = engine.state().dim(),
            sensors = sensors.len(),
            dt = parameters.control_dt,
            "built orientation estimator"
        );

        Ok(OrientationEstimator {
            engine,
            tree,
            estimation_body,
            orientation,
            angular_velocity,
            sensor_names: sensors.iter().map(|s| s.name().to_string()).collect(),
            telemetry: EstimatorTelemetry::default(),
        })
    }
}

fn check_orientation_sources(sensors: &[SensorConfiguration]) -> Result<(), ConfigError> {
    let orientation_sources = sensors
        .iter()
        .filter(|s| matches!(s, SensorConfiguration::Orientation(_)))
        .count();
    if orientation_sources != 1 {
        return Err(ConfigError::OrientationSourceCount(orientation_sources));
    }
    Ok(())
}

fn resolve_estimation_body<T: KinematicTree>(tree: &T, parameters: &EstimatorParameters) -> Result<BodyId, ConfigError> {
    match parameters.estimation_body.as_deref() {
        Some(name) => resolve_body(tree, name),
        None => Ok(tree.root_body()),
    }
}

fn resolve_body<T: KinematicTree>(tree: &T, name: &str) -> Result<BodyId, ConfigError> {
    tree.find_body(name)
        .ok_or_else(|| ConfigError::UnknownBody(name.to_string()))
}

fn assemble_engine(
    layout: StateLayout,
    process_elements: Vec<ProcessElement>,
    measurement_elements: Vec<MeasurementElement>,
    estimation_body: BodyId,
    parameters: &EstimatorParameters,
) -> Result<EstimationEngine, ConfigError> {
    let process = ProcessModel::new(&layout, process_elements)?;
    let mut measurement = MeasurementModel::new(estimation_body);
    for (index, element) in measurement_elements.into_iter().enumerate() {
        measurement.add_element(&layout, SensorId(index), element)?;
    }
    EstimationEngine::new(
        GlobalState::new(layout),
        process,
        measurement,
        EngineParameters {
            dt: parameters.control_dt,
            riccati_iterations: parameters.riccati_iterations,
            covariance_inflation: parameters.covariance_inflation,
        },
    )
}

/// Center-of-mass blocks, absent for the orientation-only estimator.
struct ComWiring {
    angular_acceleration: BlockId,
    position: BlockId,
    velocity: BlockId,
    acceleration: BlockId,
}

/// The blocks a sensor configuration can be wired to.
struct SensorWiring {
    orientation: BlockId,
    angular_velocity: BlockId,
    com: Option<ComWiring>,
}

impl SensorWiring {
    /// Creates the measurement element for `sensor`, plus its bias block where
    /// requested.
    fn element<T: KinematicTree>(
        &self,
        sensor: &SensorConfiguration,
        tree: &T,
        layout: &mut StateLayout,
        process_elements: &mut Vec<ProcessElement>,
    ) -> Result<MeasurementElement, ConfigError> {
        let noise_name = format!("{}.noise", sensor.name());
        let element: MeasurementElement = match sensor {
            SensorConfiguration::Orientation(c) => OrientationSensorElement::new(
                c.name.clone(),
                SensorMount::new(resolve_body(tree, &c.body)?, c.mounting.to_isometry()),
                self.orientation,
                c.noise.to_covariance(&noise_name)?,
            )
            .into(),
            SensorConfiguration::AngularVelocity(c) => {
                let bias = match &c.bias_noise {
                    Some(spec) => Some(add_bias_block(layout, process_elements, &c.name, spec)?),
                    None => None,
                };
                AngularVelocitySensorElement::new(
                    c.name.clone(),
                    SensorMount::new(resolve_body(tree, &c.body)?, c.mounting.to_isometry()),
                    self.angular_velocity,
                    bias,
                    c.noise.to_covariance(&noise_name)?,
                )
                .into()
            }
            SensorConfiguration::LinearAcceleration(c) => {
                let com = self.com_wiring(sensor)?;
                let bias = match &c.bias_noise {
                    Some(spec) => Some(add_bias_block(layout, process_elements, &c.name, spec)?),
                    None => None,
                };
                LinearAccelerationSensorElement::new(
                    c.name.clone(),
                    SensorMount::new(resolve_body(tree, &c.body)?, c.mounting.to_isometry()),
                    AccelerometerBlocks {
                        orientation: self.orientation,
                        angular_velocity: self.angular_velocity,
                        angular_acceleration: com.angular_acceleration,
                        com_acceleration: com.acceleration,
                        bias,
                    },
                    c.gravity_z,
                    c.noise.to_covariance(&noise_name)?,
                )?
                .into()
            }
            SensorConfiguration::PointVelocity(c) => PointVelocitySensorElement::new(
                c.name.clone(),
                self.orientation,
                self.angular_velocity,
                self.com_wiring(sensor)?.velocity,
                c.noise.to_covariance(&noise_name)?,
            )
            .into(),
            SensorConfiguration::PointPosition(c) => PointPositionSensorElement::new(
                c.name.clone(),
                self.orientation,
                self.com_wiring(sensor)?.position,
                c.noise.to_covariance(&noise_name)?,
            )
            .into(),
        };
        Ok(element)
    }

    fn com_wiring(&self, sensor: &SensorConfiguration) -> Result<&ComWiring, ConfigError> {
        self.com.as_ref().ok_or_else(|| ConfigError::UnsupportedSensor {
            sensor: sensor.name().to_string(),
            kind: sensor.kind_str(),
        })
    }
}

fn add_bias_block(
    layout: &mut StateLayout,
    process_elements: &mut Vec<ProcessElement>,
    sensor: &str,
    noise: &NoiseSpec,
) -> Result<BlockId, ConfigError> {
    let name = format!("{sensor}.bias");
    let noise = noise.to_covariance(&name)?;
    let block = layout.add_block(name, BlockKind::SensorBias)?;
    process_elements.push(SensorBiasElement::new(block, noise).into());
    Ok(block)
}

// =========================================================================
// == Estimator ==
// =========================================================================

/// Estimates the orientation and center-of-mass motion of a floating-base
/// robot and keeps `tree` consistent with that estimate.
///
/// Each `tick` runs the joint pass, then configure, predict and correct. The
/// root pass runs after both predict and correct, so measurement models always
/// see a tree that matches the current state.
#[derive(Debug, Clone)]
pub struct OrientationAndComEstimator<T: KinematicTree> {
    engine: EstimationEngine,
    tree: T,
    reconciler: KinematicReconciler,
    blocks: EstimateBlocks,
    sensor_names: Vec<String>,
    telemetry: EstimatorTelemetry,
}

impl<T: KinematicTree> OrientationAndComEstimator<T> {
    pub fn builder(tree: T, parameters: EstimatorParameters) -> EstimatorBuilder<T> {
        EstimatorBuilder::new(tree, parameters)
    }

    pub fn tick(
        &mut self,
        joints: &[JointReading],
        inputs: &ProcessInputs,
        readings: &SensorReadings,
    ) -> Result<TickReport, EstimationError> {
        if !self.engine.is_faulted() {
            if let Err(e) = self.reconciler.joint_pass(&mut self.tree, joints) {
                let e = EstimationError::from(e);
                self.engine.fault(&e);
                self.refresh_telemetry();
                return Err(e);
            }
        }

        let result = self.engine.tick(inputs, readings, &mut self.tree);
        if let Ok(report) = &result {
            self.telemetry.record(report, &self.sensor_names);
        }
        self.refresh_telemetry();
        result
    }

    /// Runs the steady-state covariance initialization now instead of on the
    /// first tick. `readings` selects the contributing sensors.
    pub fn initialize(&mut self, readings: &SensorReadings) -> Result<(), ConfigError> {
        self.engine.initialize(readings, &self.tree)?;
        self.refresh_telemetry();
        Ok(())
    }

    // --- Queries ---

    pub fn orientation(&self) -> UnitQuaternion<f64> {
        self.engine.state().orientation(self.blocks.orientation)
    }

    pub fn angular_velocity(&self) -> Vector3<f64> {
        self.engine.state().vector3(self.blocks.angular_velocity)
    }

    pub fn com_position(&self) -> Vector3<f64> {
        self.engine.state().vector3(self.blocks.com_position)
    }

    pub fn com_velocity(&self) -> Vector3<f64> {
        self.engine.state().vector3(self.blocks.com_velocity)
    }

    pub fn state(&self) -> &GlobalState {
        self.engine.state()
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        self.engine.covariance()
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    pub fn estimation_body(&self) -> BodyId {
        self.reconciler.estimation_body()
    }

    pub fn sensor_id(&self, name: &str) -> Option<SensorId> {
        self.sensor_names.iter().position(|n| n == name).map(SensorId)
    }

    pub fn telemetry(&self) -> &EstimatorTelemetry {
        &self.telemetry
    }

    pub fn is_faulted(&self) -> bool {
        self.engine.is_faulted()
    }

    // --- Re-initialization ---

    pub fn set_orientation(&mut self, orientation: UnitQuaternion<f64>) -> Result<(), EstimationError> {
        let block = self.blocks.orientation;
        self.engine
            .update_state(&mut self.tree, |state| state.set_orientation(block, &orientation))
    }

    pub fn set_angular_velocity(&mut self, angular_velocity: Vector3<f64>) -> Result<(), EstimationError> {
        let block = self.blocks.angular_velocity;
        self.engine
            .update_state(&mut self.tree, |state| state.set_vector3(block, &angular_velocity))
    }

    pub fn set_com_position(&mut self, position: Vector3<f64>) -> Result<(), EstimationError> {
        let block = self.blocks.com_position;
        self.engine
            .update_state(&mut self.tree, |state| state.set_vector3(block, &position))
    }

    pub fn set_com_velocity(&mut self, velocity: Vector3<f64>) -> Result<(), EstimationError> {
        let block = self.blocks.com_velocity;
        self.engine
            .update_state(&mut self.tree, |state| state.set_vector3(block, &velocity))
    }

    /// Restores a full snapshot and clears any fault.
    pub fn set_state(&mut self, vector: DVector<f64>, covariance: DMatrix<f64>) -> Result<(), EstimationError> {
        self.engine.set_state(vector, covariance)?;
        self.engine.update_state(&mut self.tree, |_| {})?;
        self.refresh_telemetry();
        Ok(())
    }

    fn refresh_telemetry(&mut self) {
        self.telemetry.refresh(&self.engine);
    }
}

// =========================================================================
// == Orientation-Only Estimator ==
// =========================================================================

/// Estimates orientation and angular velocity of the estimation body from
/// orientation and angular velocity sensors. Gyro bias blocks are added per
/// sensor as configured.
///
/// The tree is only used for sensor mounting: each tick copies the joint
/// samples into it, and nothing writes the root.
#[derive(Debug, Clone)]
pub struct OrientationEstimator<T: KinematicTree> {
    engine: EstimationEngine,
    tree: T,
    estimation_body: BodyId,
    orientation: BlockId,
    angular_velocity: BlockId,
    sensor_names: Vec<String>,
    telemetry: EstimatorTelemetry,
}

impl<T: KinematicTree> OrientationEstimator<T> {
    pub fn builder(tree: T, parameters: EstimatorParameters) -> EstimatorBuilder<T> {
        EstimatorBuilder::new(tree, parameters)
    }

    pub fn tick(
        &mut self,
        joints: &[JointReading],
        inputs: &ProcessInputs,
        readings: &SensorReadings,
    ) -> Result<TickReport, EstimationError> {
        if !self.engine.is_faulted() {
            if let Err(e) = joint_pass(&mut self.tree, joints) {
                let e = EstimationError::from(e);
                self.engine.fault(&e);
                self.telemetry.refresh(&self.engine);
                return Err(e);
            }
        }

        let result = self.engine.tick(inputs, readings, &mut self.tree);
        if let Ok(report) = &result {
            self.telemetry.record(report, &self.sensor_names);
        }
        self.telemetry.refresh(&self.engine);
        result
    }

    pub fn orientation(&self) -> UnitQuaternion<f64> {
        self.engine.state().orientation(self.orientation)
    }

    pub fn angular_velocity(&self) -> Vector3<f64> {
        self.engine.state().vector3(self.angular_velocity)
    }

    pub fn state(&self) -> &GlobalState {
        self.engine.state()
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        self.engine.covariance()
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    pub fn estimation_body(&self) -> BodyId {
        self.estimation_body
    }

    pub fn sensor_id(&self, name: &str) -> Option<SensorId> {
        self.sensor_names.iter().position(|n| n == name).map(SensorId)
    }

    pub fn telemetry(&self) -> &EstimatorTelemetry {
        &self.telemetry
    }

    pub fn is_faulted(&self) -> bool {
        self.engine.is_faulted()
    }

    pub fn set_orientation(&mut self, orientation: UnitQuaternion<f64>) -> Result<(), EstimationError> {
        let block = self.orientation;
        self.engine
            .update_state(&mut self.tree, |state| state.set_orientation(block, &orientation))
    }

    pub fn set_angular_velocity(&mut self, angular_velocity: Vector3<f64>) -> Result<(), EstimationError> {
        let block = self.angular_velocity;
        self.engine
            .update_state(&mut self.tree, |state| state.set_vector3(block, &angular_velocity))
    }

    /// Restores a full snapshot and clears any fault.
    pub fn set_state(&mut self, vector: DVector<f64>, covariance: DMatrix<f64>) -> Result<(), EstimationError> {
        self.engine.set_state(vector, covariance)?;
        self.telemetry.refresh(&self.engine);
        Ok(())
    }
}

impl EstimatorTelemetry {
    fn record(&mut self, report: &TickReport, sensor_names: &[String]) {
        self.tick_count += 1;
        self.active_sensors = report
            .active_sensors
            .iter()
            .filter_map(|id| sensor_names.get(id.0).cloned())
            .collect();
        self.innovation_norm = report.innovation_norm;
    }

    fn refresh(&mut self, engine: &EstimationEngine) {
        self.covariance_trace = engine.covariance().trace();
        self.initialized = engine.is_initialized();
        self.faulted = engine.is_faulted();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AngularVelocitySensorConfiguration, OrientationSensorConfiguration, PointSensorConfiguration, Pose};
    use crate::kinematics::{JointKind, RigidBodyTree};
    use crate::messages::SensorSample;
    use approx::assert_relative_eq;
    use nalgebra::Isometry3;

    fn tree() -> RigidBodyTree {
        let mut tree = RigidBodyTree::new("pelvis", 8.0, Vector3::zeros());
        tree.add_body(
            tree.root_body(),
            "torso",
            JointKind::Revolute(Vector3::y_axis()),
            Isometry3::translation(0.0, 0.0, 0.2),
            12.0,
            Vector3::new(0.0, 0.0, 0.2),
        )
        .unwrap();
        tree.update_frames();
        tree
    }

    fn orientation_sensor(name: &str, body: &str) -> SensorConfiguration {
        SensorConfiguration::Orientation(OrientationSensorConfiguration {
            name: name.to_string(),
            body: body.to_string(),
            mounting: Pose::default(),
            noise: NoiseSpec::StdDev(0.01),
        })
    }

    #[test]
    fn test_blocks_are_registered_in_fixed_order() {
        let estimator = OrientationAndComEstimator::builder(tree(), EstimatorParameters::default())
            .with_sensor(orientation_sensor("imu_orientation", "pelvis"))
            .unwrap()
            .build()
            .unwrap();
        let names: Vec<&str> = estimator.state().layout.iter().map(|(_, b)| b.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "orientation",
                "angular_velocity",
                "angular_acceleration",
                "com_position",
                "com_velocity",
                "com_acceleration"
            ]
        );
        assert_eq!(estimator.state().dim(), 18);
    }

    #[test]
    fn test_duplicate_sensor_names_are_rejected() {
        let mut builder = OrientationAndComEstimator::builder(tree(), EstimatorParameters::default());
        builder.add_sensor(orientation_sensor("imu", "pelvis")).unwrap();
        assert!(matches!(
            builder.add_sensor(orientation_sensor("imu", "torso")),
            Err(ConfigError::DuplicateSensor(_))
        ));
    }

    #[test]
    fn test_unknown_body_is_rejected() {
        let result = OrientationAndComEstimator::builder(tree(), EstimatorParameters::default())
            .with_sensor(orientation_sensor("imu", "head"))
            .unwrap()
            .build();
        assert!(matches!(result, Err(ConfigError::UnknownBody(name)) if name == "head"));
    }

    #[test]
    fn test_setters_move_the_tree() {
        let parameters = EstimatorParameters {
            estimation_body: Some("torso".to_string()),
            ..Default::default()
        };
        let mut estimator = OrientationAndComEstimator::builder(tree(), parameters)
            .with_sensor(orientation_sensor("imu", "pelvis"))
            .unwrap()
            .build()
            .unwrap();

        let q = UnitQuaternion::from_euler_angles(0.1, -0.2, 0.7);
        let p = Vector3::new(1.0, 2.0, 0.9);
        estimator.set_orientation(q).unwrap();
        estimator.set_com_position(p).unwrap();

        let torso = estimator.estimation_body();
        let torso_pose = estimator.tree().body_pose(torso).unwrap();
        assert_relative_eq!(torso_pose.rotation, q, epsilon = 1e-9);
        assert_relative_eq!(estimator.tree().center_of_mass_position().unwrap(), p, epsilon = 1e-9);
        assert_relative_eq!(estimator.orientation(), q, epsilon = 1e-9);
    }

    #[test]
    fn test_telemetry_tracks_ticks() {
        let mut estimator = OrientationAndComEstimator::builder(tree(), EstimatorParameters::default())
            .with_sensor(orientation_sensor("imu", "pelvis"))
            .unwrap()
            .build()
            .unwrap();
        let imu = estimator.sensor_id("imu").unwrap();
        let readings = SensorReadings::new().with(imu, SensorSample::Orientation(UnitQuaternion::identity()));

        for _ in 0..3 {
            estimator.tick(&[], &ProcessInputs::default(), &readings).unwrap();
        }
        let telemetry = estimator.telemetry();
        assert_eq!(telemetry.tick_count, 3);
        assert_eq!(telemetry.active_sensors, vec!["imu".to_string()]);
        assert!(telemetry.initialized);
        assert!(!telemetry.faulted);
        assert!(telemetry.covariance_trace > 0.0);
    }

    fn gyro_sensor(name: &str, bias_noise: Option<f64>) -> SensorConfiguration {
        SensorConfiguration::AngularVelocity(AngularVelocitySensorConfiguration {
            name: name.to_string(),
            body: "pelvis".to_string(),
            mounting: Pose::default(),
            noise: NoiseSpec::StdDev(0.01),
            bias_noise: bias_noise.map(NoiseSpec::StdDev),
        })
    }

    #[test]
    fn test_orientation_estimator_registers_only_angular_blocks() {
        let estimator = OrientationAndComEstimator::builder(tree(), EstimatorParameters::default())
            .with_sensor(orientation_sensor("imu_orientation", "pelvis"))
            .unwrap()
            .with_sensor(gyro_sensor("imu_gyro", Some(1e-4)))
            .unwrap()
            .build_orientation()
            .unwrap();
        let names: Vec<&str> = estimator.state().layout.iter().map(|(_, b)| b.name.as_str()).collect();
        assert_eq!(names, ["orientation", "angular_velocity", "imu_gyro.bias"]);
        assert_eq!(estimator.state().dim(), 9);
    }

    #[test]
    fn test_orientation_estimator_rejects_com_sensors() {
        let point = SensorConfiguration::PointVelocity(PointSensorConfiguration {
            name: "foot_velocity".to_string(),
            noise: NoiseSpec::StdDev(0.01),
        });
        let result = OrientationEstimator::builder(tree(), EstimatorParameters::default())
            .with_sensor(orientation_sensor("imu_orientation", "pelvis"))
            .unwrap()
            .with_sensor(point)
            .unwrap()
            .build_orientation();
        assert!(matches!(
            result,
            Err(ConfigError::UnsupportedSensor { sensor, kind: "PointVelocity" }) if sensor == "foot_velocity"
        ));
    }

    #[test]
    fn test_orientation_estimator_tracks_a_spinning_body() {
        let parameters = EstimatorParameters {
            angular_acceleration_noise: NoiseSpec::StdDev(0.1),
            ..Default::default()
        };
        let mut estimator = OrientationEstimator::builder(tree(), parameters)
            .with_sensor(orientation_sensor("imu_orientation", "pelvis"))
            .unwrap()
            .with_sensor(gyro_sensor("imu_gyro", None))
            .unwrap()
            .build_orientation()
            .unwrap();
        let imu = estimator.sensor_id("imu_orientation").unwrap();
        let gyro = estimator.sensor_id("imu_gyro").unwrap();
        let root_before = estimator.tree().body_pose(estimator.tree().root_body()).unwrap();

        let dt = EstimatorParameters::default().control_dt;
        let omega = Vector3::new(0.0, 0.0, 0.4);
        for k in 1..=400 {
            let truth = UnitQuaternion::from_scaled_axis(omega * (k as f64 * dt));
            let readings = SensorReadings::new()
                .with(imu, SensorSample::Orientation(truth))
                .with(gyro, SensorSample::AngularVelocity(omega));
            estimator.tick(&[], &ProcessInputs::default(), &readings).unwrap();
        }

        let truth = UnitQuaternion::from_scaled_axis(omega * (400.0 * dt));
        assert!(estimator.orientation().angle_to(&truth) < 1e-3);
        assert_relative_eq!(estimator.angular_velocity(), omega, epsilon = 1e-3);
        assert_eq!(estimator.telemetry().tick_count, 400);
        assert!(!estimator.is_faulted());

        let root_after = estimator.tree().body_pose(estimator.tree().root_body()).unwrap();
        assert_eq!(root_before, root_after);
    }
}
